use super::dispatch::DispatchPlan;
use super::error::SortError;
use super::tiling::{BLOCK_SIZE, SCAN_CAPACITY, SORT_BIN_COUNT};

const WORD: u64 = std::mem::size_of::<u32>() as u64;

/// Scratch memory required to sort up to a given number of keys.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ScratchSizes {
    pub scratch_bytes: u64,
    pub reduced_scratch_bytes: u64,
    pub num_blocks: u32,
    pub num_reduced_blocks: u32,
}

/// Computes scratch sizes for `max_keys` keys.
pub fn calculate_scratch_sizes(max_keys: u32) -> ScratchSizes {
    let num_blocks = max_keys.div_ceil(BLOCK_SIZE);
    let num_reduced_blocks = num_blocks.div_ceil(BLOCK_SIZE);

    ScratchSizes {
        scratch_bytes: histogram_bytes(num_blocks),
        reduced_scratch_bytes: histogram_bytes(num_reduced_blocks),
        num_blocks,
        num_reduced_blocks,
    }
}

#[inline]
fn histogram_bytes(entries: u32) -> u64 {
    entries as u64 * SORT_BIN_COUNT as u64 * WORD
}

impl ScratchSizes {
    /// Verifies that every region `plan` touches lies inside these buffers.
    pub fn check(&self, plan: &DispatchPlan) -> Result<(), SortError> {
        let c = &plan.constants;

        let required = histogram_bytes(c.num_thread_groups);
        if required > self.scratch_bytes {
            return Err(SortError::ScratchTooSmall {
                num_keys: c.num_keys,
                required,
                available: self.scratch_bytes,
            });
        }

        let required = plan.reduce_scan_groups as u64 * WORD;
        if required > self.reduced_scratch_bytes {
            return Err(SortError::ReducedScratchTooSmall {
                num_keys: c.num_keys,
                required,
                available: self.reduced_scratch_bytes,
            });
        }

        if c.num_scan_values >= SCAN_CAPACITY {
            return Err(SortError::ScanCapacityExceeded {
                scan_values: c.num_scan_values,
                capacity: SCAN_CAPACITY,
            });
        }

        Ok(())
    }
}
