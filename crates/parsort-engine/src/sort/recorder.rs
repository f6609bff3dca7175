//! The narrow command-recording interface consumed by the sort core.
//!
//! The core never touches a graphics API. It names buffers through [`BufferId`],
//! kernels through [`Kernel`], and records work through [`CommandRecorder`].
//! Backends map those logical names onto physical resources.

/// One of the two physical buffers of a ping-ponged stream.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    /// The opposite slot.
    #[inline]
    pub fn other(self) -> Self {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }

    /// Array index of the slot (`A = 0`, `B = 1`).
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
        }
    }
}

/// Logical buffers owned by a sort engine instance.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferId {
    /// Canonical unsorted keys of one key set.
    SourceKeys(usize),
    /// Canonical payload, sized for the largest key set.
    SourcePayload,
    /// Ping-ponged key storage.
    Keys(Slot),
    /// Ping-ponged payload storage.
    Payload(Slot),
    /// Per-thread-group digit histograms (digit-major).
    Scratch,
    /// One partial sum per reduce thread group.
    ReducedScratch,
    /// Host-written `SortConstants` ring.
    Constants,
    /// Host-written `IndirectSetup` ring.
    IndirectSetup,
    /// Table of every configured key set size.
    KeyCounts,
    /// Device-written `SortConstants`.
    IndirectConstants,
    /// Device-written dispatch arguments for Count and Scatter.
    CountScatterArgs,
    /// Device-written dispatch arguments for Reduce and ScanAdd.
    ReduceScanArgs,
    /// Host-readable copy of the sorted keys.
    ReadbackKeys,
    /// Host-readable copy of the sorted payload.
    ReadbackPayload,
}

/// The compute kernels of the sort.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Kernel {
    SetupIndirect,
    Count,
    Reduce,
    Scan,
    ScanAdd,
    Scatter,
    ScatterPayload,
}

impl Kernel {
    pub const ALL: [Kernel; 7] = [
        Kernel::SetupIndirect,
        Kernel::Count,
        Kernel::Reduce,
        Kernel::Scan,
        Kernel::ScanAdd,
        Kernel::Scatter,
        Kernel::ScatterPayload,
    ];

    /// Short name used in labels and logs.
    pub fn label(self) -> &'static str {
        match self {
            Kernel::SetupIndirect => "setup_indirect",
            Kernel::Count => "count",
            Kernel::Reduce => "reduce",
            Kernel::Scan => "scan",
            Kernel::ScanAdd => "scan_add",
            Kernel::Scatter => "scatter",
            Kernel::ScatterPayload => "scatter_payload",
        }
    }

    /// Buffers the kernel binds, with the access state each must be in.
    pub fn resources(self, args: &KernelArgs) -> Vec<BufferUse> {
        let constants = BufferUse::read(args.constants.buffer(), Access::Uniform);
        let input = args.input;
        let output = input.other();

        match self {
            Kernel::SetupIndirect => vec![
                BufferUse::read(BufferId::IndirectSetup, Access::Uniform),
                BufferUse::read(BufferId::KeyCounts, Access::Storage),
                BufferUse::write(BufferId::IndirectConstants),
                BufferUse::write(BufferId::CountScatterArgs),
                BufferUse::write(BufferId::ReduceScanArgs),
            ],
            Kernel::Count => vec![
                constants,
                BufferUse::read(BufferId::Keys(input), Access::Storage),
                BufferUse::write(BufferId::Scratch),
            ],
            Kernel::Reduce => vec![
                constants,
                BufferUse::read(BufferId::Scratch, Access::Storage),
                BufferUse::write(BufferId::ReducedScratch),
            ],
            Kernel::Scan => vec![constants, BufferUse::write(BufferId::ReducedScratch)],
            Kernel::ScanAdd => vec![
                constants,
                BufferUse::read(BufferId::ReducedScratch, Access::Storage),
                BufferUse::write(BufferId::Scratch),
            ],
            Kernel::Scatter => vec![
                constants,
                BufferUse::read(BufferId::Keys(input), Access::Storage),
                BufferUse::read(BufferId::Scratch, Access::Storage),
                BufferUse::write(BufferId::Keys(output)),
            ],
            Kernel::ScatterPayload => vec![
                constants,
                BufferUse::read(BufferId::Keys(input), Access::Storage),
                BufferUse::read(BufferId::Payload(input), Access::Storage),
                BufferUse::read(BufferId::Scratch, Access::Storage),
                BufferUse::write(BufferId::Keys(output)),
                BufferUse::write(BufferId::Payload(output)),
            ],
        }
    }
}

/// Access state of a buffer, as tracked by barriers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Access {
    /// Shader read/write storage (UAV).
    Storage,
    /// Shader read-only constants.
    Uniform,
    /// Source of a buffer copy.
    CopySrc,
    /// Destination of a buffer copy.
    CopyDst,
    /// Indirect dispatch arguments.
    IndirectArgument,
}

/// A buffer bound by a kernel.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferUse {
    pub buffer: BufferId,
    pub access: Access,
    pub writes: bool,
}

impl BufferUse {
    #[inline]
    pub fn read(buffer: BufferId, access: Access) -> Self {
        Self { buffer, access, writes: false }
    }

    #[inline]
    pub fn write(buffer: BufferId) -> Self {
        Self { buffer, access: Access::Storage, writes: true }
    }
}

/// A memory barrier on one buffer, optionally changing its access state.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferBarrier {
    pub buffer: BufferId,
    pub before: Access,
    pub after: Access,
}

impl BufferBarrier {
    #[inline]
    pub fn transition(buffer: BufferId, before: Access, after: Access) -> Self {
        Self { buffer, before, after }
    }

    /// Storage-to-storage barrier: makes prior shader writes visible.
    #[inline]
    pub fn storage(buffer: BufferId) -> Self {
        Self::transition(buffer, Access::Storage, Access::Storage)
    }
}

/// Where a dispatch reads its `SortConstants` from.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConstantsSource {
    /// Host-uploaded ring slot. For `SetupIndirect` the same slot selects the
    /// `IndirectSetup` record.
    Host { ring_slot: u32 },
    /// Written on the device by `SetupIndirect`.
    Device,
}

impl ConstantsSource {
    pub fn buffer(self) -> BufferId {
        match self {
            ConstantsSource::Host { .. } => BufferId::Constants,
            ConstantsSource::Device => BufferId::IndirectConstants,
        }
    }
}

/// Per-dispatch parameters.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct KernelArgs {
    /// Bit shift of the current radix pass.
    pub shift: u32,
    /// Slot the kernel reads keys (and payload) from; writes go to the other slot.
    pub input: Slot,
    pub constants: ConstantsSource,
}

/// Command-recording context supplied by a backend.
///
/// Recording never submits or waits. Ordering between dispatches is only
/// guaranteed across an explicit [`CommandRecorder::barrier`].
pub trait CommandRecorder {
    /// Uploads host data into `dst` ahead of the recorded commands.
    fn write_buffer(&mut self, dst: BufferId, offset: u64, data: &[u8]);

    /// Dispatches `kernel` over `groups` thread groups.
    fn dispatch(&mut self, kernel: Kernel, args: &KernelArgs, groups: [u32; 3]);

    /// Dispatches `kernel` with thread-group counts read from `indirect` at `offset`.
    fn dispatch_indirect(
        &mut self,
        kernel: Kernel,
        args: &KernelArgs,
        indirect: BufferId,
        offset: u64,
    );

    /// Inserts memory barriers (and access transitions) on the given buffers.
    fn barrier(&mut self, barriers: &[BufferBarrier]);

    /// Copies `size` bytes at `offset` from `src` to the same offset in `dst`.
    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, offset: u64, size: u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_flip_is_an_involution() {
        assert_eq!(Slot::A.other(), Slot::B);
        assert_eq!(Slot::A.other().other(), Slot::A);
        assert_eq!(Slot::B.index(), 1);
    }

    #[test]
    fn scatter_writes_the_opposite_slot() {
        let args = KernelArgs {
            shift: 0,
            input: Slot::B,
            constants: ConstantsSource::Host { ring_slot: 0 },
        };
        let writes: Vec<BufferId> = Kernel::ScatterPayload
            .resources(&args)
            .into_iter()
            .filter(|u| u.writes)
            .map(|u| u.buffer)
            .collect();
        assert_eq!(writes, vec![BufferId::Keys(Slot::A), BufferId::Payload(Slot::A)]);
    }

    #[test]
    fn device_constants_bind_the_indirect_buffer() {
        let args = KernelArgs {
            shift: 4,
            input: Slot::A,
            constants: ConstantsSource::Device,
        };
        let uses = Kernel::Count.resources(&args);
        assert_eq!(uses[0], BufferUse::read(BufferId::IndirectConstants, Access::Uniform));
    }
}
