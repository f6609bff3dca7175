//! Dispatch parameters: the shared thread-group formula and the two ways of
//! delivering it to the kernels.

use bytemuck::{Pod, Zeroable};

use super::recorder::{
    Access, BufferBarrier, BufferId, CommandRecorder, ConstantsSource, Kernel, KernelArgs, Slot,
};
use super::tiling::{BLOCK_SIZE, CONSTANT_RING_STRIDE, SCAN_CAPACITY, SORT_BIN_COUNT};

/// Constants read by every sort kernel.
///
/// Layout is shared with the WGSL `SortConstants` struct.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct SortConstants {
    pub num_keys: u32,
    pub num_blocks_per_thread_group: u32,
    pub num_thread_groups: u32,
    pub num_thread_groups_with_additional_blocks: u32,
    pub num_reduce_threadgroup_per_bin: u32,
    pub num_scan_values: u32,
    pub _pad: [u32; 2],
}

impl SortConstants {
    /// First element and block count handled by thread group `group`.
    ///
    /// The trailing `num_thread_groups_with_additional_blocks` groups take one
    /// extra block each and shift their start past the extra blocks of the
    /// groups before them.
    pub fn blocks_for_group(&self, group: u32) -> (u32, u32) {
        let mut start = BLOCK_SIZE * self.num_blocks_per_thread_group * group;
        let mut blocks = self.num_blocks_per_thread_group;

        let first_extended =
            self.num_thread_groups - self.num_thread_groups_with_additional_blocks;
        if group >= first_extended {
            start += (group - first_extended) * BLOCK_SIZE;
            blocks += 1;
        }
        (start, blocks)
    }

    /// Whether the block partition reaches every key.
    pub fn covers_all_keys(&self) -> bool {
        let base = self.num_thread_groups as u64
            * self.num_blocks_per_thread_group as u64
            * BLOCK_SIZE as u64;
        let extra = self.num_thread_groups_with_additional_blocks as u64 * BLOCK_SIZE as u64;
        base + extra >= self.num_keys as u64
    }
}

/// Host record consumed by the indirect setup kernel.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct IndirectSetup {
    /// Index into the `KeyCounts` table.
    pub key_count_index: u32,
    pub max_thread_groups: u32,
    pub _pad: [u32; 2],
}

/// Indirect dispatch arguments, as laid out in the argument buffers.
#[repr(C)]
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Pod, Zeroable)]
pub struct DispatchArgs {
    pub x: u32,
    pub y: u32,
    pub z: u32,
}

impl DispatchArgs {
    #[inline]
    pub fn linear(x: u32) -> Self {
        Self { x, y: 1, z: 1 }
    }
}

/// Thread-group counts and constants for sorting `num_keys` keys.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DispatchPlan {
    pub constants: SortConstants,
    /// Groups dispatched for Count and Scatter.
    pub count_scatter_groups: u32,
    /// Groups dispatched for Reduce and ScanAdd.
    pub reduce_scan_groups: u32,
}

impl DispatchPlan {
    /// Evaluates the dispatch formula. Panics when `max_thread_groups` is zero.
    pub fn new(num_keys: u32, max_thread_groups: u32) -> Self {
        assert!(max_thread_groups > 0, "max_thread_groups must be non-zero");

        let num_blocks = num_keys.div_ceil(BLOCK_SIZE);

        let mut thread_groups = max_thread_groups;
        let mut blocks_per_group = num_blocks / thread_groups;
        let mut with_additional = num_blocks % thread_groups;

        if num_blocks < thread_groups {
            blocks_per_group = 1;
            thread_groups = num_blocks;
            with_additional = 0;
        }

        let reduce_blocks = if BLOCK_SIZE > thread_groups {
            1
        } else {
            thread_groups.div_ceil(BLOCK_SIZE)
        };
        let reduce_groups = SORT_BIN_COUNT * reduce_blocks;

        Self {
            constants: SortConstants {
                num_keys,
                num_blocks_per_thread_group: blocks_per_group,
                num_thread_groups: thread_groups,
                num_thread_groups_with_additional_blocks: with_additional,
                num_reduce_threadgroup_per_bin: reduce_groups / SORT_BIN_COUNT,
                num_scan_values: reduce_groups,
                _pad: [0; 2],
            },
            count_scatter_groups: thread_groups,
            reduce_scan_groups: reduce_groups,
        }
    }
}

// ── per-frame dispatch parameters ─────────────────────────────────────────

/// How dispatch parameters reach the kernels.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum DispatchMode {
    /// Host evaluates the plan and uploads constants.
    #[default]
    Direct,
    /// A setup kernel evaluates the plan on the device.
    Indirect,
}

/// Thread-group count source for one dispatch.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DispatchSize {
    Direct(u32),
    /// Arguments at offset 0 of the given buffer.
    Indirect(BufferId),
}

/// Dispatch parameters for every pass of one sort.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PassDispatch {
    pub constants: ConstantsSource,
    pub count_scatter: DispatchSize,
    pub reduce_scan: DispatchSize,
}

impl PassDispatch {
    /// Records `kernel` with the thread-group count of its dispatch class.
    pub fn record<R: CommandRecorder + ?Sized>(
        &self,
        recorder: &mut R,
        kernel: Kernel,
        shift: u32,
        input: Slot,
    ) {
        let args = KernelArgs {
            shift,
            input,
            constants: self.constants,
        };

        let size = match kernel {
            Kernel::Count | Kernel::Scatter | Kernel::ScatterPayload => self.count_scatter,
            Kernel::Reduce | Kernel::ScanAdd => self.reduce_scan,
            Kernel::Scan | Kernel::SetupIndirect => DispatchSize::Direct(1),
        };

        match size {
            DispatchSize::Direct(groups) => recorder.dispatch(kernel, &args, [groups, 1, 1]),
            DispatchSize::Indirect(buffer) => recorder.dispatch_indirect(kernel, &args, buffer, 0),
        }
    }
}

/// Produces [`PassDispatch`] values in either [`DispatchMode`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DispatchParameterProvider {
    mode: DispatchMode,
    max_thread_groups: u32,
}

impl DispatchParameterProvider {
    pub fn new(mode: DispatchMode, max_thread_groups: u32) -> Self {
        assert!(max_thread_groups > 0, "max_thread_groups must be non-zero");
        Self {
            mode,
            max_thread_groups,
        }
    }

    #[inline]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    #[inline]
    pub fn max_thread_groups(&self) -> u32 {
        self.max_thread_groups
    }

    /// Records whatever must happen before the first pass and returns the
    /// parameters the passes dispatch with.
    ///
    /// Direct mode uploads the plan into constant ring slot `ring_slot`.
    /// Indirect mode uploads a setup record there instead, runs the setup
    /// kernel and moves its outputs into their read states.
    pub fn prepare<R: CommandRecorder + ?Sized>(
        &self,
        recorder: &mut R,
        key_set: usize,
        num_keys: u32,
        ring_slot: u32,
    ) -> PassDispatch {
        let offset = ring_slot as u64 * CONSTANT_RING_STRIDE;

        match self.mode {
            DispatchMode::Direct => {
                let plan = DispatchPlan::new(num_keys, self.max_thread_groups);
                assert!(
                    plan.constants.num_scan_values < SCAN_CAPACITY,
                    "{} scan values exceed a single scan group",
                    plan.constants.num_scan_values
                );
                log::trace!("direct dispatch plan for {num_keys} keys: {plan:?}");

                recorder.write_buffer(
                    BufferId::Constants,
                    offset,
                    bytemuck::bytes_of(&plan.constants),
                );

                PassDispatch {
                    constants: ConstantsSource::Host { ring_slot },
                    count_scatter: DispatchSize::Direct(plan.count_scatter_groups),
                    reduce_scan: DispatchSize::Direct(plan.reduce_scan_groups),
                }
            }
            DispatchMode::Indirect => {
                let setup = IndirectSetup {
                    key_count_index: key_set as u32,
                    max_thread_groups: self.max_thread_groups,
                    _pad: [0; 2],
                };
                recorder.write_buffer(BufferId::IndirectSetup, offset, bytemuck::bytes_of(&setup));

                let args = KernelArgs {
                    shift: 0,
                    input: Slot::A,
                    constants: ConstantsSource::Host { ring_slot },
                };
                recorder.dispatch(Kernel::SetupIndirect, &args, [1, 1, 1]);
                recorder.barrier(&indirect_transitions(
                    (Access::Storage, Access::IndirectArgument),
                    (Access::Storage, Access::Uniform),
                ));

                PassDispatch {
                    constants: ConstantsSource::Device,
                    count_scatter: DispatchSize::Indirect(BufferId::CountScatterArgs),
                    reduce_scan: DispatchSize::Indirect(BufferId::ReduceScanArgs),
                }
            }
        }
    }

    /// Returns the indirect outputs to writable state once every pass is recorded.
    pub fn finish<R: CommandRecorder + ?Sized>(&self, recorder: &mut R) {
        if self.mode == DispatchMode::Indirect {
            recorder.barrier(&indirect_transitions(
                (Access::IndirectArgument, Access::Storage),
                (Access::Uniform, Access::Storage),
            ));
        }
    }
}

fn indirect_transitions(args: (Access, Access), constants: (Access, Access)) -> [BufferBarrier; 3] {
    [
        BufferBarrier::transition(BufferId::CountScatterArgs, args.0, args.1),
        BufferBarrier::transition(BufferId::ReduceScanArgs, args.0, args.1),
        BufferBarrier::transition(BufferId::IndirectConstants, constants.0, constants.1),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::tiling::DEFAULT_MAX_THREAD_GROUPS;

    // ── formula ───────────────────────────────────────────────────────────

    #[test]
    fn empty_input_dispatches_no_count_groups() {
        let plan = DispatchPlan::new(0, DEFAULT_MAX_THREAD_GROUPS);
        assert_eq!(plan.count_scatter_groups, 0);
        assert_eq!(plan.reduce_scan_groups, 16);
        assert!(plan.constants.covers_all_keys());
    }

    #[test]
    fn single_key_uses_one_group() {
        let c = DispatchPlan::new(1, DEFAULT_MAX_THREAD_GROUPS).constants;
        assert_eq!(c.num_thread_groups, 1);
        assert_eq!(c.num_blocks_per_thread_group, 1);
        assert_eq!(c.num_thread_groups_with_additional_blocks, 0);
        assert_eq!(c.num_reduce_threadgroup_per_bin, 1);
        assert_eq!(c.num_scan_values, 16);
    }

    #[test]
    fn plan_for_1080p() {
        let plan = DispatchPlan::new(1920 * 1080, 800);
        let c = plan.constants;
        assert_eq!(c.num_thread_groups, 800);
        assert_eq!(c.num_blocks_per_thread_group, 5);
        assert_eq!(c.num_thread_groups_with_additional_blocks, 50);
        assert_eq!(c.num_reduce_threadgroup_per_bin, 2);
        assert_eq!(plan.reduce_scan_groups, 32);
        assert!(c.covers_all_keys());
    }

    #[test]
    fn plan_covers_keys_for_assorted_sizes() {
        for n in [1, 511, 512, 513, 4095, 65_537, 2_073_600, 3_686_400, 8_294_400] {
            for groups in [1, 3, 100, 511, 512, 513, 800, 1024] {
                let c = DispatchPlan::new(n, groups).constants;
                assert!(c.covers_all_keys(), "n={n} groups={groups}");
                assert!(c.num_thread_groups <= groups);
            }
        }
    }

    #[test]
    #[should_panic(expected = "max_thread_groups")]
    fn zero_thread_groups_panics() {
        let _ = DispatchPlan::new(10, 0);
    }

    // ── block partition ───────────────────────────────────────────────────

    #[test]
    fn groups_tile_blocks_contiguously() {
        for (n, groups) in [(1920 * 1080, 800), (3840 * 2160, 800), (10_000, 3), (600, 7)] {
            let c = DispatchPlan::new(n, groups).constants;
            let mut next = 0;
            for g in 0..c.num_thread_groups {
                let (start, blocks) = c.blocks_for_group(g);
                assert_eq!(start, next, "n={n} g={g}");
                next = start + blocks * BLOCK_SIZE;
            }
            assert_eq!(next, n.div_ceil(BLOCK_SIZE) * BLOCK_SIZE);
        }
    }

    #[test]
    fn extended_groups_take_one_more_block() {
        let c = DispatchPlan::new(1920 * 1080, 800).constants;
        assert_eq!(c.blocks_for_group(749), (749 * 5 * BLOCK_SIZE, 5));
        assert_eq!(c.blocks_for_group(750), (750 * 5 * BLOCK_SIZE, 6));
        assert_eq!(c.blocks_for_group(751), (751 * 5 * BLOCK_SIZE + BLOCK_SIZE, 6));
    }

    #[test]
    fn constants_match_shader_layout() {
        assert_eq!(std::mem::size_of::<SortConstants>(), 32);
        assert_eq!(std::mem::size_of::<IndirectSetup>(), 16);
        assert_eq!(std::mem::size_of::<DispatchArgs>(), 12);
    }
}
