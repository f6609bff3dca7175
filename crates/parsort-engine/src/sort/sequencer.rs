use super::buffers::BufferSet;
use super::dispatch::PassDispatch;
use super::recorder::{BufferBarrier, BufferId, CommandRecorder, Kernel};
use super::tiling::{NUM_PASSES, SORT_BITS_PER_PASS};

/// One step of a radix pass, in recording order.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum PassStep {
    Count,
    Reduce,
    Scan,
    ScanAdd,
    Scatter,
}

impl PassStep {
    pub const ORDER: [PassStep; 5] = [
        PassStep::Count,
        PassStep::Reduce,
        PassStep::Scan,
        PassStep::ScanAdd,
        PassStep::Scatter,
    ];
}

/// Walks every `(shift, step)` of a full sort: 8 passes of 5 steps.
#[derive(Debug, Clone, Default)]
pub struct RadixPassSequencer {
    pass: u32,
    step: usize,
}

impl RadixPassSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records every pass of the sort.
    ///
    /// Each step is followed by a barrier on what it wrote, and the slots are
    /// swapped after every scatter. The final data lands in
    /// `buffers.read_slot()`.
    pub fn record<R: CommandRecorder + ?Sized>(
        recorder: &mut R,
        dispatch: &PassDispatch,
        buffers: &mut BufferSet,
        with_payload: bool,
    ) {
        assert!(
            !with_payload || buffers.has_payload(),
            "payload sort requested but payload buffers were not allocated"
        );

        for (shift, step) in Self::new() {
            let input = buffers.read_slot();

            match step {
                PassStep::Count => {
                    dispatch.record(recorder, Kernel::Count, shift, input);
                    recorder.barrier(&[BufferBarrier::storage(BufferId::Scratch)]);
                }
                PassStep::Reduce => {
                    dispatch.record(recorder, Kernel::Reduce, shift, input);
                    recorder.barrier(&[BufferBarrier::storage(BufferId::ReducedScratch)]);
                }
                PassStep::Scan => {
                    dispatch.record(recorder, Kernel::Scan, shift, input);
                    recorder.barrier(&[BufferBarrier::storage(BufferId::ReducedScratch)]);
                }
                PassStep::ScanAdd => {
                    dispatch.record(recorder, Kernel::ScanAdd, shift, input);
                    recorder.barrier(&[BufferBarrier::storage(BufferId::Scratch)]);
                }
                PassStep::Scatter => {
                    let output = buffers.write_slot();
                    if with_payload {
                        dispatch.record(recorder, Kernel::ScatterPayload, shift, input);
                        recorder.barrier(&[
                            BufferBarrier::storage(BufferId::Keys(output)),
                            BufferBarrier::storage(BufferId::Payload(output)),
                        ]);
                    } else {
                        dispatch.record(recorder, Kernel::Scatter, shift, input);
                        recorder.barrier(&[BufferBarrier::storage(BufferId::Keys(output))]);
                    }
                    buffers.swap();
                }
            }
        }
    }
}

impl Iterator for RadixPassSequencer {
    type Item = (u32, PassStep);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pass >= NUM_PASSES {
            return None;
        }

        let item = (self.pass * SORT_BITS_PER_PASS, PassStep::ORDER[self.step]);

        self.step += 1;
        if self.step == PassStep::ORDER.len() {
            self.step = 0;
            self.pass += 1;
        }
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forty_steps_in_order() {
        let steps: Vec<(u32, PassStep)> = RadixPassSequencer::new().collect();
        assert_eq!(steps.len(), 40);
        assert_eq!(steps[0], (0, PassStep::Count));
        assert_eq!(steps[4], (0, PassStep::Scatter));
        assert_eq!(steps[5], (4, PassStep::Count));
        assert_eq!(steps[39], (28, PassStep::Scatter));
    }

    #[test]
    fn every_pass_visits_each_step_once() {
        for pass in 0..NUM_PASSES {
            let shift = pass * SORT_BITS_PER_PASS;
            let steps: Vec<PassStep> = RadixPassSequencer::new()
                .filter(|&(s, _)| s == shift)
                .map(|(_, step)| step)
                .collect();
            assert_eq!(steps, PassStep::ORDER.to_vec());
        }
    }
}
