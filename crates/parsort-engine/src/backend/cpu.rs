//! Host reference backend.
//!
//! Executes every kernel on the CPU, group by group, with the same data layout
//! the compute kernels use. It doubles as a validation layer: every recorded
//! command is checked against the barrier and access-state discipline.

use std::collections::{HashMap, HashSet};

use crate::sort::tiling::{
    BLOCK_SIZE, CONSTANT_RING_STRIDE, SCAN_CAPACITY, SORT_BIN_COUNT, digit,
};
use crate::sort::{
    Access, BufferBarrier, BufferId, BufferLayout, CommandRecorder, ConstantsSource, DispatchArgs,
    DispatchPlan, IndirectSetup, Kernel, KernelArgs, SortConstants, SortedOutput, SourceData,
};

const RING_STRIDE_WORDS: usize = (CONSTANT_RING_STRIDE / 4) as usize;

/// A synchronization or state error in a recorded command stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Hazard {
    #[error("{command} touches {buffer:?}, which was written without a barrier since")]
    Unsynchronized { command: String, buffer: BufferId },

    #[error("{command} needs {buffer:?} in {expected:?} state but it is in {actual:?}")]
    WrongState {
        command: String,
        buffer: BufferId,
        expected: Access,
        actual: Access,
    },

    #[error("barrier on {buffer:?} expects {expected:?} state but it is in {actual:?}")]
    BarrierMismatch {
        buffer: BufferId,
        expected: Access,
        actual: Access,
    },
}

/// One recorded command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Write {
        dst: BufferId,
        offset: u64,
        len: usize,
    },
    Dispatch {
        kernel: Kernel,
        args: KernelArgs,
        groups: [u32; 3],
    },
    DispatchIndirect {
        kernel: Kernel,
        args: KernelArgs,
        buffer: BufferId,
        groups: [u32; 3],
    },
    Barrier(Vec<BufferBarrier>),
    Copy {
        src: BufferId,
        dst: BufferId,
        offset: u64,
        size: u64,
    },
}

#[derive(Debug)]
struct CpuBuffer {
    words: Vec<u32>,
    access: Access,
}

/// CPU implementation of [`CommandRecorder`]. Commands execute as they are recorded.
pub struct CpuSortDevice {
    buffers: HashMap<BufferId, CpuBuffer>,
    unsynced: HashSet<BufferId>,
    hazards: Vec<Hazard>,
    commands: Vec<Command>,
    strict: bool,
}

impl CpuSortDevice {
    /// Allocates every buffer of `layout`. Strict: the first hazard panics.
    pub fn new(layout: &BufferLayout, source: &SourceData) -> Self {
        let mut buffers = HashMap::new();

        for desc in layout.iter() {
            let mut words = vec![0u32; (desc.size / 4) as usize];
            if let Some(contents) = layout.initial_contents(desc.id, source) {
                words[..contents.len()].copy_from_slice(contents);
            }
            buffers.insert(
                desc.id,
                CpuBuffer {
                    words,
                    access: desc.role.initial_access(),
                },
            );
        }

        log::debug!("cpu sort device: {} buffers", buffers.len());

        Self {
            buffers,
            unsynced: HashSet::new(),
            hazards: Vec::new(),
            commands: Vec::new(),
            strict: true,
        }
    }

    /// Collects hazards instead of panicking.
    pub fn lenient(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn clear_commands(&mut self) {
        self.commands.clear();
    }

    /// Full contents of a buffer. Panics if the buffer does not exist.
    pub fn words(&self, id: BufferId) -> &[u32] {
        &self.buffer(id).words
    }

    /// The sorted keys and payload named by `output`.
    pub fn read_output(&self, output: &SortedOutput) -> (Vec<u32>, Option<Vec<u32>>) {
        let n = output.num_keys as usize;
        let keys = self.words(output.keys)[..n].to_vec();
        let payload = output.payload.map(|id| self.words(id)[..n].to_vec());
        (keys, payload)
    }

    // ── validation ─────────────────────────────────────────────────────────

    fn report(&mut self, hazard: Hazard) {
        if self.strict {
            panic!("{hazard}");
        }
        log::warn!("{hazard}");
        self.hazards.push(hazard);
    }

    fn require(&mut self, command: &str, buffer: BufferId, expected: Access) {
        let actual = self.buffer(buffer).access;
        if actual != expected {
            self.report(Hazard::WrongState {
                command: command.to_string(),
                buffer,
                expected,
                actual,
            });
        }
        if self.unsynced.contains(&buffer) {
            self.report(Hazard::Unsynchronized {
                command: command.to_string(),
                buffer,
            });
        }
    }

    fn buffer(&self, id: BufferId) -> &CpuBuffer {
        match self.buffers.get(&id) {
            Some(buffer) => buffer,
            None => panic!("buffer {id:?} was not allocated"),
        }
    }

    fn buffer_mut(&mut self, id: BufferId) -> &mut CpuBuffer {
        match self.buffers.get_mut(&id) {
            Some(buffer) => buffer,
            None => panic!("buffer {id:?} was not allocated"),
        }
    }

    // ── kernels ────────────────────────────────────────────────────────────

    fn constants(&self, source: ConstantsSource) -> SortConstants {
        let base = match source {
            ConstantsSource::Host { ring_slot } => ring_slot as usize * RING_STRIDE_WORDS,
            ConstantsSource::Device => 0,
        };
        let words = &self.words(source.buffer())[base..base + 8];
        bytemuck::pod_read_unaligned(bytemuck::cast_slice(words))
    }

    fn execute(&mut self, kernel: Kernel, args: &KernelArgs, groups: [u32; 3]) {
        let command = kernel.label();
        for use_ in kernel.resources(args) {
            self.require(command, use_.buffer, use_.access);
        }

        let group_count = groups[0] * groups[1] * groups[2];
        match kernel {
            Kernel::SetupIndirect => self.setup_indirect(args),
            Kernel::Count => self.count(args, group_count),
            Kernel::Reduce => self.reduce(args, group_count),
            Kernel::Scan => self.scan(args),
            Kernel::ScanAdd => self.scan_add(args, group_count),
            Kernel::Scatter => self.scatter(args, group_count, false),
            Kernel::ScatterPayload => self.scatter(args, group_count, true),
        }

        for use_ in kernel.resources(args) {
            if use_.writes {
                self.unsynced.insert(use_.buffer);
            }
        }
    }

    fn setup_indirect(&mut self, args: &KernelArgs) {
        let ConstantsSource::Host { ring_slot } = args.constants else {
            panic!("indirect setup reads its record from the host ring");
        };
        let base = ring_slot as usize * RING_STRIDE_WORDS;
        let record = &self.words(BufferId::IndirectSetup)[base..base + 4];
        let setup: IndirectSetup = bytemuck::pod_read_unaligned(bytemuck::cast_slice(record));

        let num_keys = self.words(BufferId::KeyCounts)[setup.key_count_index as usize];
        let plan = DispatchPlan::new(num_keys, setup.max_thread_groups);

        store(
            self.buffer_mut(BufferId::IndirectConstants),
            0,
            bytemuck::cast_slice(&[plan.constants]),
        );
        store(
            self.buffer_mut(BufferId::CountScatterArgs),
            0,
            bytemuck::cast_slice(&[DispatchArgs::linear(plan.count_scatter_groups)]),
        );
        store(
            self.buffer_mut(BufferId::ReduceScanArgs),
            0,
            bytemuck::cast_slice(&[DispatchArgs::linear(plan.reduce_scan_groups)]),
        );
    }

    fn count(&mut self, args: &KernelArgs, groups: u32) {
        let c = self.constants(args.constants);
        let keys = self.words(BufferId::Keys(args.input)).to_vec();
        let t = c.num_thread_groups as usize;

        let mut histograms = Vec::with_capacity(groups as usize);
        for group in 0..groups {
            let mut histogram = [0u32; SORT_BIN_COUNT as usize];
            for index in block_elements(&c, group) {
                histogram[digit(keys[index], args.shift) as usize] += 1;
            }
            histograms.push(histogram);
        }

        let scratch = self.buffer_mut(BufferId::Scratch);
        for (group, histogram) in histograms.iter().enumerate() {
            for (bin, &count) in histogram.iter().enumerate() {
                write_checked(&mut scratch.words, bin * t + group, count, "scratch");
            }
        }
    }

    fn reduce(&mut self, args: &KernelArgs, groups: u32) {
        let c = self.constants(args.constants);
        let t = c.num_thread_groups as usize;
        let scratch = self.words(BufferId::Scratch).to_vec();

        let mut sums = Vec::with_capacity(groups as usize);
        for group in 0..groups {
            let (bin, range) = reduce_range(&c, group);
            let sum = range
                .map(|i| read_checked(&scratch, bin * t + i, "scratch"))
                .fold(0u32, u32::wrapping_add);
            sums.push(sum);
        }

        let reduced = self.buffer_mut(BufferId::ReducedScratch);
        for (group, sum) in sums.into_iter().enumerate() {
            write_checked(&mut reduced.words, group, sum, "reduced scratch");
        }
    }

    fn scan(&mut self, args: &KernelArgs) {
        let c = self.constants(args.constants);
        let count = c.num_scan_values as usize;
        assert!(
            count <= SCAN_CAPACITY as usize,
            "{count} scan values exceed a single scan group"
        );

        let reduced = self.buffer_mut(BufferId::ReducedScratch);
        let mut running = 0u32;
        for i in 0..count {
            let value = read_checked(&reduced.words, i, "reduced scratch");
            reduced.words[i] = running;
            running = running.wrapping_add(value);
        }
    }

    fn scan_add(&mut self, args: &KernelArgs, groups: u32) {
        let c = self.constants(args.constants);
        let t = c.num_thread_groups as usize;
        let reduced = self.words(BufferId::ReducedScratch).to_vec();

        let scratch = self.buffer_mut(BufferId::Scratch);
        for group in 0..groups {
            let (bin, range) = reduce_range(&c, group);
            let mut running = read_checked(&reduced, group as usize, "reduced scratch");
            for i in range {
                let index = bin * t + i;
                let value = read_checked(&scratch.words, index, "scratch");
                scratch.words[index] = running;
                running = running.wrapping_add(value);
            }
        }
    }

    fn scatter(&mut self, args: &KernelArgs, groups: u32, with_payload: bool) {
        let c = self.constants(args.constants);
        let t = c.num_thread_groups as usize;
        let input = args.input;
        let output = input.other();

        let keys = self.words(BufferId::Keys(input)).to_vec();
        let payload = with_payload.then(|| self.words(BufferId::Payload(input)).to_vec());
        let scratch = self.words(BufferId::Scratch).to_vec();

        let mut moves = Vec::with_capacity(c.num_keys as usize);
        for group in 0..groups {
            let mut offsets = [0u32; SORT_BIN_COUNT as usize];
            for (bin, offset) in offsets.iter_mut().enumerate() {
                *offset = read_checked(&scratch, bin * t + group as usize, "scratch");
            }
            for index in block_elements(&c, group) {
                let bin = digit(keys[index], args.shift) as usize;
                moves.push((index, offsets[bin] as usize));
                offsets[bin] += 1;
            }
        }

        let dst = self.buffer_mut(BufferId::Keys(output));
        for &(src, to) in &moves {
            write_checked(&mut dst.words, to, keys[src], "key output");
        }
        if let Some(payload) = payload {
            let dst = self.buffer_mut(BufferId::Payload(output));
            for &(src, to) in &moves {
                write_checked(&mut dst.words, to, payload[src], "payload output");
            }
        }
    }
}

impl CommandRecorder for CpuSortDevice {
    fn write_buffer(&mut self, dst: BufferId, offset: u64, data: &[u8]) {
        assert!(offset % 4 == 0 && data.len() % 4 == 0, "unaligned buffer write");
        let words: Vec<u32> = data
            .chunks_exact(4)
            .map(bytemuck::pod_read_unaligned::<u32>)
            .collect();
        store(self.buffer_mut(dst), (offset / 4) as usize, &words);

        self.commands.push(Command::Write {
            dst,
            offset,
            len: data.len(),
        });
    }

    fn dispatch(&mut self, kernel: Kernel, args: &KernelArgs, groups: [u32; 3]) {
        log::trace!("cpu dispatch {} {:?} {:?}", kernel.label(), args, groups);
        self.execute(kernel, args, groups);
        self.commands.push(Command::Dispatch {
            kernel,
            args: *args,
            groups,
        });
    }

    fn dispatch_indirect(
        &mut self,
        kernel: Kernel,
        args: &KernelArgs,
        indirect: BufferId,
        offset: u64,
    ) {
        self.require(kernel.label(), indirect, Access::IndirectArgument);

        let base = (offset / 4) as usize;
        let words = &self.words(indirect)[base..base + 3];
        let groups = [words[0], words[1], words[2]];
        log::trace!("cpu indirect dispatch {} {:?} {:?}", kernel.label(), args, groups);

        self.execute(kernel, args, groups);
        self.commands.push(Command::DispatchIndirect {
            kernel,
            args: *args,
            buffer: indirect,
            groups,
        });
    }

    fn barrier(&mut self, barriers: &[BufferBarrier]) {
        for b in barriers {
            let actual = self.buffer(b.buffer).access;
            if actual != b.before {
                self.report(Hazard::BarrierMismatch {
                    buffer: b.buffer,
                    expected: b.before,
                    actual,
                });
            }
            self.buffer_mut(b.buffer).access = b.after;
            self.unsynced.remove(&b.buffer);
        }
        self.commands.push(Command::Barrier(barriers.to_vec()));
    }

    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, offset: u64, size: u64) {
        assert!(offset % 4 == 0 && size % 4 == 0, "unaligned buffer copy");
        self.require("copy", src, Access::CopySrc);
        self.require("copy", dst, Access::CopyDst);

        let (start, end) = ((offset / 4) as usize, ((offset + size) / 4) as usize);
        let data = self.words(src)[start..end].to_vec();
        store(self.buffer_mut(dst), start, &data);
        self.unsynced.insert(dst);

        self.commands.push(Command::Copy {
            src,
            dst,
            offset,
            size,
        });
    }
}

// ── helpers ───────────────────────────────────────────────────────────────

/// Element indices group `group` processes, in order, clipped to `num_keys`.
fn block_elements(c: &SortConstants, group: u32) -> std::ops::Range<usize> {
    let (start, blocks) = c.blocks_for_group(group);
    let end = (start as u64 + blocks as u64 * BLOCK_SIZE as u64).min(c.num_keys as u64);
    start as usize..(end as usize).max(start as usize)
}

/// Bin and chunk of the digit-major histogram one reduce group covers.
fn reduce_range(c: &SortConstants, group: u32) -> (usize, std::ops::Range<usize>) {
    let per_bin = c.num_reduce_threadgroup_per_bin;
    let bin = (group / per_bin) as usize;
    let base = ((group % per_bin) * BLOCK_SIZE) as usize;
    let end = (base + BLOCK_SIZE as usize).min(c.num_thread_groups as usize);
    (bin, base..end.max(base))
}

fn store(buffer: &mut CpuBuffer, start: usize, data: &[u32]) {
    let end = start + data.len();
    assert!(
        end <= buffer.words.len(),
        "write of {} words at {} overruns a {}-word buffer",
        data.len(),
        start,
        buffer.words.len()
    );
    buffer.words[start..end].copy_from_slice(data);
}

fn read_checked(words: &[u32], index: usize, what: &str) -> u32 {
    match words.get(index) {
        Some(&value) => value,
        None => panic!("{what} overrun: read at {index} of {}", words.len()),
    }
}

fn write_checked(words: &mut [u32], index: usize, value: u32, what: &str) {
    let len = words.len();
    match words.get_mut(index) {
        Some(slot) => *slot = value,
        None => panic!("{what} overrun: write at {index} of {len}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sort::{DispatchMode, SortConfig, SortEngine, SortRequest};

    fn device_for(keys: Vec<u32>) -> (SortEngine, CpuSortDevice, SourceData) {
        let source = SourceData::from_key_sets(vec![keys]);
        let engine = SortEngine::new(SortConfig::default(), &source).expect("valid config");
        let device = CpuSortDevice::new(engine.layout(), &source);
        (engine, device, source)
    }

    #[test]
    fn buffers_start_in_role_state() {
        let (_, device, source) = device_for(vec![3, 2, 1]);
        assert_eq!(device.buffer(BufferId::SourceKeys(0)).access, Access::CopySrc);
        assert_eq!(device.buffer(BufferId::Constants).access, Access::Uniform);
        assert_eq!(device.words(BufferId::SourceKeys(0)), source.keys(0));
    }

    #[test]
    fn missing_barrier_is_reported() {
        let (_, device, _) = device_for(vec![1; 10]);
        let mut device = device.lenient();
        let args = KernelArgs {
            shift: 0,
            input: crate::sort::Slot::A,
            constants: ConstantsSource::Host { ring_slot: 0 },
        };
        device.write_buffer(
            BufferId::Constants,
            0,
            bytemuck::bytes_of(&DispatchPlan::new(10, 1).constants),
        );
        device.dispatch(Kernel::Count, &args, [1, 1, 1]);
        device.dispatch(Kernel::Reduce, &args, [16, 1, 1]);

        assert_eq!(
            device.hazards(),
            &[Hazard::Unsynchronized {
                command: "reduce".to_string(),
                buffer: BufferId::Scratch
            }]
        );
    }

    #[test]
    fn barrier_from_wrong_state_is_reported() {
        let (_, device, _) = device_for(vec![1]);
        let mut device = device.lenient();
        device.barrier(&[BufferBarrier::transition(
            BufferId::CountScatterArgs,
            Access::IndirectArgument,
            Access::Storage,
        )]);
        assert!(matches!(device.hazards(), [Hazard::BarrierMismatch { .. }]));
    }

    #[test]
    fn indirect_setup_mirrors_host_plan() {
        let (mut engine, mut device, _) = device_for((0..5000).rev().collect());
        let request = SortRequest {
            key_set: 0,
            payload: false,
            mode: DispatchMode::Indirect,
        };
        engine.copy_source_data(&mut device, &request);
        engine.sort(&mut device, request);

        let plan = DispatchPlan::new(5000, engine.config().max_thread_groups);
        let words = device.words(BufferId::IndirectConstants);
        let constants: SortConstants = bytemuck::pod_read_unaligned(bytemuck::cast_slice(words));
        assert_eq!(constants, plan.constants);
        assert_eq!(device.words(BufferId::CountScatterArgs), &[plan.count_scatter_groups, 1, 1]);
        assert_eq!(device.words(BufferId::ReduceScanArgs), &[plan.reduce_scan_groups, 1, 1]);
    }

    #[test]
    #[should_panic(expected = "scratch overrun")]
    fn scratch_overrun_panics() {
        let (_, mut device, _) = device_for(vec![1; 600]);
        let args = KernelArgs {
            shift: 0,
            input: crate::sort::Slot::A,
            constants: ConstantsSource::Host { ring_slot: 1 },
        };
        // Claims more thread groups than the scratch was sized for.
        let mut constants = DispatchPlan::new(600, 800).constants;
        constants.num_thread_groups = 4;
        device.write_buffer(
            BufferId::Constants,
            CONSTANT_RING_STRIDE,
            bytemuck::bytes_of(&constants),
        );
        device.dispatch(Kernel::Count, &args, [4, 1, 1]);
    }
}
