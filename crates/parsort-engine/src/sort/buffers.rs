use super::recorder::{Access, BufferBarrier, BufferId, CommandRecorder, Slot};

/// Ping-pong state over the key (and payload) slots.
///
/// At the start of every pass [`BufferSet::read_slot`] holds the fully valid
/// partially sorted array and [`BufferSet::write_slot`] may be overwritten.
#[derive(Debug, Clone)]
pub struct BufferSet {
    current: Slot,
    has_payload: bool,
}

impl BufferSet {
    pub fn new(has_payload: bool) -> Self {
        Self {
            current: Slot::A,
            has_payload,
        }
    }

    #[inline]
    pub fn read_slot(&self) -> Slot {
        self.current
    }

    #[inline]
    pub fn write_slot(&self) -> Slot {
        self.current.other()
    }

    /// Flips read and write slots after a scatter.
    #[inline]
    pub fn swap(&mut self) {
        self.current = self.current.other();
    }

    #[inline]
    pub fn has_payload(&self) -> bool {
        self.has_payload
    }

    /// Copies the canonical unsorted data of `key_set` into slot A and makes
    /// A the read slot.
    pub fn reset_for_frame<R: CommandRecorder + ?Sized>(
        &mut self,
        recorder: &mut R,
        key_set: usize,
        num_keys: u32,
        with_payload: bool,
    ) {
        assert!(
            !with_payload || self.has_payload,
            "payload copy requested but payload buffers were not allocated"
        );
        self.current = Slot::A;

        if num_keys == 0 {
            return;
        }

        let size = num_keys as u64 * 4;
        let mut copies = vec![(BufferId::SourceKeys(key_set), BufferId::Keys(Slot::A))];
        if with_payload {
            copies.push((BufferId::SourcePayload, BufferId::Payload(Slot::A)));
        }

        let to_copy: Vec<BufferBarrier> = copies
            .iter()
            .map(|&(_, dst)| BufferBarrier::transition(dst, Access::Storage, Access::CopyDst))
            .collect();
        recorder.barrier(&to_copy);

        for &(src, dst) in &copies {
            recorder.copy_buffer(src, dst, 0, size);
        }

        let to_storage: Vec<BufferBarrier> = copies
            .iter()
            .map(|&(_, dst)| BufferBarrier::transition(dst, Access::CopyDst, Access::Storage))
            .collect();
        recorder.barrier(&to_storage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swap_alternates_slots() {
        let mut set = BufferSet::new(false);
        assert_eq!((set.read_slot(), set.write_slot()), (Slot::A, Slot::B));
        set.swap();
        assert_eq!((set.read_slot(), set.write_slot()), (Slot::B, Slot::A));
        set.swap();
        assert_eq!(set.read_slot(), Slot::A);
    }
}
