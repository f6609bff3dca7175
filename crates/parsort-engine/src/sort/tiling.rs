//! Tiling constants shared by the host orchestration and the compute kernels.
//!
//! The WGSL kernels receive these values through a generated prelude
//! (`backend::gpu::shader_prelude`), so the two sides cannot drift.

/// Key bits consumed by one radix pass.
pub const SORT_BITS_PER_PASS: u32 = 4;

/// Number of digit values per pass (`2^SORT_BITS_PER_PASS`).
pub const SORT_BIN_COUNT: u32 = 1 << SORT_BITS_PER_PASS;

/// Width of a sort key in bits.
pub const KEY_BITS: u32 = 32;

/// Number of radix passes over a full key.
pub const NUM_PASSES: u32 = KEY_BITS.div_ceil(SORT_BITS_PER_PASS);

/// Keys loaded by every thread of a block.
pub const ELEMENTS_PER_THREAD: u32 = 4;

/// Threads per thread group for every kernel but the indirect setup.
pub const THREADGROUP_SIZE: u32 = 128;

/// Elements covered by one block (the unit of per-group work).
pub const BLOCK_SIZE: u32 = ELEMENTS_PER_THREAD * THREADGROUP_SIZE;

/// Values a single thread group can prefix-sum in the Scan step.
pub const SCAN_CAPACITY: u32 = ELEMENTS_PER_THREAD * THREADGROUP_SIZE;

/// Default cap on Count/Scatter thread groups.
///
/// Pure throughput tuning; sortedness does not depend on it.
pub const DEFAULT_MAX_THREAD_GROUPS: u32 = 800;

/// Host constant slots rotated per frame.
pub const CONSTANT_RING_SIZE: u32 = 3;

/// Byte stride between constant ring slots (uniform offset alignment).
pub const CONSTANT_RING_STRIDE: u64 = 256;

/// Bit shifts of every radix pass, lowest digit first.
pub fn pass_shifts() -> impl Iterator<Item = u32> {
    (0..NUM_PASSES).map(|pass| pass * SORT_BITS_PER_PASS)
}

/// Extracts the digit of `key` examined by the pass at `shift`.
#[inline]
pub fn digit(key: u32, shift: u32) -> u32 {
    (key >> shift) & (SORT_BIN_COUNT - 1)
}
