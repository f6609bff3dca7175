//! Backend-agnostic description of every buffer a sort engine uses.

use super::dispatch::{DispatchArgs, SortConstants};
use super::recorder::{Access, BufferId, Slot};
use super::sizing::{ScratchSizes, calculate_scratch_sizes};
use super::source::SourceData;
use super::tiling::{CONSTANT_RING_SIZE, CONSTANT_RING_STRIDE};

const WORD: u64 = std::mem::size_of::<u32>() as u64;

/// What a buffer is used for. Backends derive usage flags from it.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferRole {
    /// Immutable source data, copied into the sort slots each frame.
    Source,
    /// Ping-pong key/payload storage.
    SortTarget,
    /// Kernel-private scratch.
    Scratch,
    /// Host-uploaded uniform ring.
    HostConstants,
    /// Constants written by a kernel and read as uniforms.
    DeviceConstants,
    /// Dispatch arguments written by a kernel.
    IndirectArgs,
    /// Read-only lookup table.
    Table,
    /// Host-mappable copy target.
    Readback,
}

impl BufferRole {
    /// Access state the buffer is created in.
    pub fn initial_access(self) -> Access {
        match self {
            BufferRole::Source => Access::CopySrc,
            BufferRole::HostConstants => Access::Uniform,
            BufferRole::Readback => Access::CopyDst,
            BufferRole::SortTarget
            | BufferRole::Scratch
            | BufferRole::DeviceConstants
            | BufferRole::IndirectArgs
            | BufferRole::Table => Access::Storage,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferDesc {
    pub id: BufferId,
    /// Size in bytes, always a non-zero multiple of 4.
    pub size: u64,
    pub role: BufferRole,
}

/// Every buffer of one engine, sized once for the largest key count.
#[derive(Debug, Clone)]
pub struct BufferLayout {
    descs: Vec<BufferDesc>,
    sizes: ScratchSizes,
    key_counts: Vec<u32>,
    max_keys: u32,
    has_payload: bool,
    has_readback: bool,
}

impl BufferLayout {
    /// Describes the buffers for `key_counts` key sets of at most `max_keys` keys.
    ///
    /// Scratch is sized for at least one block, so an empty indirect sort still
    /// finds valid reduce storage.
    pub fn new(key_counts: &[u32], max_keys: u32, has_payload: bool, has_readback: bool) -> Self {
        let sizes = calculate_scratch_sizes(max_keys.max(1));
        let stream_bytes = words(max_keys as u64);
        let ring_bytes = CONSTANT_RING_SIZE as u64 * CONSTANT_RING_STRIDE;

        let mut descs = Vec::new();
        let mut push = |id, size, role| descs.push(BufferDesc { id, size, role });

        for (i, &n) in key_counts.iter().enumerate() {
            push(BufferId::SourceKeys(i), words(n as u64), BufferRole::Source);
        }
        for slot in [Slot::A, Slot::B] {
            push(BufferId::Keys(slot), stream_bytes, BufferRole::SortTarget);
        }
        if has_payload {
            push(BufferId::SourcePayload, stream_bytes, BufferRole::Source);
            for slot in [Slot::A, Slot::B] {
                push(BufferId::Payload(slot), stream_bytes, BufferRole::SortTarget);
            }
        }

        push(BufferId::Scratch, sizes.scratch_bytes, BufferRole::Scratch);
        push(BufferId::ReducedScratch, sizes.reduced_scratch_bytes, BufferRole::Scratch);
        push(BufferId::Constants, ring_bytes, BufferRole::HostConstants);
        push(BufferId::IndirectSetup, ring_bytes, BufferRole::HostConstants);
        push(BufferId::KeyCounts, words(key_counts.len() as u64), BufferRole::Table);
        push(
            BufferId::IndirectConstants,
            std::mem::size_of::<SortConstants>() as u64,
            BufferRole::DeviceConstants,
        );
        let args_bytes = std::mem::size_of::<DispatchArgs>() as u64;
        push(BufferId::CountScatterArgs, args_bytes, BufferRole::IndirectArgs);
        push(BufferId::ReduceScanArgs, args_bytes, BufferRole::IndirectArgs);

        if has_readback {
            push(BufferId::ReadbackKeys, stream_bytes, BufferRole::Readback);
            if has_payload {
                push(BufferId::ReadbackPayload, stream_bytes, BufferRole::Readback);
            }
        }

        Self {
            descs,
            sizes,
            key_counts: key_counts.to_vec(),
            max_keys,
            has_payload,
            has_readback,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferDesc> {
        self.descs.iter()
    }

    pub fn get(&self, id: BufferId) -> Option<&BufferDesc> {
        self.descs.iter().find(|d| d.id == id)
    }

    #[inline]
    pub fn scratch_sizes(&self) -> ScratchSizes {
        self.sizes
    }

    #[inline]
    pub fn key_counts(&self) -> &[u32] {
        &self.key_counts
    }

    #[inline]
    pub fn max_keys(&self) -> u32 {
        self.max_keys
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        self.has_payload
    }

    #[inline]
    pub fn has_readback(&self) -> bool {
        self.has_readback
    }

    /// Words a backend uploads into `id` at creation, if any.
    pub fn initial_contents<'a>(&'a self, id: BufferId, source: &'a SourceData) -> Option<&'a [u32]> {
        match id {
            BufferId::SourceKeys(i) => Some(source.keys(i)),
            BufferId::SourcePayload => Some(source.payload()),
            BufferId::KeyCounts => Some(&self.key_counts),
            _ => None,
        }
    }
}

/// Byte size of `count` words, never zero.
#[inline]
fn words(count: u64) -> u64 {
    (count * WORD).max(WORD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_only_layout_has_no_payload_buffers() {
        let layout = BufferLayout::new(&[100, 200], 200, false, false);
        assert!(layout.get(BufferId::Keys(Slot::A)).is_some());
        assert!(layout.get(BufferId::Payload(Slot::A)).is_none());
        assert!(layout.get(BufferId::SourcePayload).is_none());
        assert!(layout.get(BufferId::ReadbackKeys).is_none());
        assert_eq!(layout.get(BufferId::SourceKeys(1)).map(|d| d.size), Some(800));
    }

    #[test]
    fn empty_key_set_still_gets_storage() {
        let layout = BufferLayout::new(&[0], 0, true, true);
        for desc in layout.iter() {
            assert!(desc.size >= 4 && desc.size % 4 == 0, "{desc:?}");
        }
        assert_eq!(layout.get(BufferId::ReducedScratch).map(|d| d.size), Some(64));
    }

    #[test]
    fn roles_start_in_their_natural_state() {
        assert_eq!(BufferRole::Source.initial_access(), Access::CopySrc);
        assert_eq!(BufferRole::HostConstants.initial_access(), Access::Uniform);
        assert_eq!(BufferRole::IndirectArgs.initial_access(), Access::Storage);
        assert_eq!(BufferRole::Readback.initial_access(), Access::CopyDst);
    }
}
