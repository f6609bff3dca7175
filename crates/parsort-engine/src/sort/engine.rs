use super::buffers::BufferSet;
use super::config::SortConfig;
use super::dispatch::{DispatchMode, DispatchParameterProvider, DispatchPlan};
use super::error::SortError;
use super::layout::BufferLayout;
use super::recorder::{Access, BufferBarrier, BufferId, CommandRecorder, Slot};
use super::sequencer::RadixPassSequencer;
use super::source::SourceData;
use super::tiling::CONSTANT_RING_SIZE;

/// What one sort invocation operates on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SortRequest {
    pub key_set: usize,
    pub payload: bool,
    pub mode: DispatchMode,
}

/// Where the sorted data lives once the recorded commands have executed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SortedOutput {
    pub keys: BufferId,
    pub payload: Option<BufferId>,
    pub slot: Slot,
    pub num_keys: u32,
}

/// Host-side orchestration of the radix sort.
///
/// The engine owns no GPU resources. It describes them through
/// [`SortEngine::layout`] and records work into a caller-provided
/// [`CommandRecorder`]; the caller submits.
pub struct SortEngine {
    config: SortConfig,
    layout: BufferLayout,
    buffers: BufferSet,
    frame: u64,
}

impl SortEngine {
    /// Validates `config` against `source` and sizes every buffer.
    pub fn new(config: SortConfig, source: &SourceData) -> Result<Self, SortError> {
        let available = source.key_set_count();
        if available == 0 {
            return Err(SortError::NoKeySets);
        }
        if config.max_thread_groups == 0 {
            return Err(SortError::ZeroThreadGroups);
        }
        for index in [Some(config.key_set), config.key_set_override]
            .into_iter()
            .flatten()
        {
            if index >= available {
                return Err(SortError::KeySetOutOfRange { index, available });
            }
        }

        let key_counts = source.key_counts();
        let max_keys = config.max_keys.unwrap_or_else(|| source.max_key_count());
        let has_payload = config.payload_buffers;
        let layout = BufferLayout::new(&key_counts, max_keys, has_payload, config.validation);
        let sizes = layout.scratch_sizes();

        for (index, &num_keys) in key_counts.iter().enumerate() {
            if num_keys > max_keys {
                return Err(SortError::KeyCapacityExceeded {
                    index,
                    num_keys,
                    max_keys,
                });
            }
            sizes.check(&DispatchPlan::new(num_keys, config.max_thread_groups))?;
        }

        log::debug!(
            "sort engine: {} key sets, capacity {} keys, scratch {} B, reduced scratch {} B, payload {}",
            available,
            max_keys,
            sizes.scratch_bytes,
            sizes.reduced_scratch_bytes,
            has_payload,
        );

        Ok(Self {
            config,
            layout,
            buffers: BufferSet::new(has_payload),
            frame: 0,
        })
    }

    #[inline]
    pub fn layout(&self) -> &BufferLayout {
        &self.layout
    }

    #[inline]
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Number of keys in key set `key_set`. Panics when out of range.
    #[inline]
    pub fn num_keys(&self, key_set: usize) -> u32 {
        self.layout.key_counts()[key_set]
    }

    /// Sorts recorded so far.
    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    // ── interactive selections ────────────────────────────────────────────

    /// Selects the key set of later frames. Ignored when out of range.
    pub fn set_key_set(&mut self, key_set: usize) {
        if key_set < self.layout.key_counts().len() {
            self.config.key_set = key_set;
        } else {
            log::warn!("ignoring out-of-range key set {key_set}");
        }
    }

    pub fn set_sort_payload(&mut self, sort_payload: bool) {
        self.config.sort_payload = sort_payload;
    }

    pub fn set_mode(&mut self, mode: DispatchMode) {
        self.config.mode = mode;
    }

    /// The request for this frame: overrides first, then the selections.
    pub fn frame_request(&self) -> SortRequest {
        SortRequest {
            key_set: self.config.key_set_override.unwrap_or(self.config.key_set),
            payload: self.config.payload_override || self.config.sort_payload,
            mode: self.config.mode,
        }
    }

    // ── recording ─────────────────────────────────────────────────────────

    /// Copies this frame's unsorted data into the sort slots.
    pub fn copy_source_data_for_frame<R: CommandRecorder + ?Sized>(&mut self, recorder: &mut R) {
        let request = self.frame_request();
        self.copy_source_data(recorder, &request);
    }

    /// Copies the unsorted data `request` sorts into the sort slots.
    pub fn copy_source_data<R: CommandRecorder + ?Sized>(
        &mut self,
        recorder: &mut R,
        request: &SortRequest,
    ) {
        let num_keys = self.num_keys(request.key_set);
        self.buffers
            .reset_for_frame(recorder, request.key_set, num_keys, request.payload);
    }

    /// Records a full sort of the data currently in the read slot.
    ///
    /// Nothing is submitted. Panics when a payload sort is requested without
    /// payload buffers.
    pub fn sort<R: CommandRecorder + ?Sized>(
        &mut self,
        recorder: &mut R,
        request: SortRequest,
    ) -> SortedOutput {
        assert!(
            !request.payload || self.layout.has_payload(),
            "payload sort requested but payload buffers were not allocated"
        );

        let num_keys = self.num_keys(request.key_set);
        let ring_slot = (self.frame % CONSTANT_RING_SIZE as u64) as u32;
        self.frame += 1;

        if request.mode == DispatchMode::Direct && num_keys == 0 {
            log::trace!("empty direct sort, nothing recorded");
            return self.output(num_keys, request.payload);
        }

        log::trace!(
            "recording sort: key set {} ({} keys), payload {}, {:?}, ring slot {}",
            request.key_set,
            num_keys,
            request.payload,
            request.mode,
            ring_slot,
        );

        let provider = DispatchParameterProvider::new(request.mode, self.config.max_thread_groups);
        let dispatch = provider.prepare(recorder, request.key_set, num_keys, ring_slot);
        RadixPassSequencer::record(recorder, &dispatch, &mut self.buffers, request.payload);
        provider.finish(recorder);

        self.output(num_keys, request.payload)
    }

    /// Records copies of `output` into the readback buffers.
    ///
    /// Panics unless the engine was configured with `validation`.
    pub fn record_readback<R: CommandRecorder + ?Sized>(
        &self,
        recorder: &mut R,
        output: &SortedOutput,
    ) {
        assert!(
            self.layout.has_readback(),
            "readback requested but validation buffers were not allocated"
        );
        if output.num_keys == 0 {
            return;
        }

        let mut copies = vec![(output.keys, BufferId::ReadbackKeys)];
        if let Some(payload) = output.payload {
            copies.push((payload, BufferId::ReadbackPayload));
        }

        let to_copy: Vec<BufferBarrier> = copies
            .iter()
            .map(|&(src, _)| BufferBarrier::transition(src, Access::Storage, Access::CopySrc))
            .collect();
        recorder.barrier(&to_copy);

        for &(src, dst) in &copies {
            recorder.copy_buffer(src, dst, 0, output.num_keys as u64 * 4);
        }

        let to_storage: Vec<BufferBarrier> = copies
            .iter()
            .map(|&(src, _)| BufferBarrier::transition(src, Access::CopySrc, Access::Storage))
            .collect();
        recorder.barrier(&to_storage);
    }

    fn output(&self, num_keys: u32, payload: bool) -> SortedOutput {
        let slot = self.buffers.read_slot();
        SortedOutput {
            keys: BufferId::Keys(slot),
            payload: payload.then_some(BufferId::Payload(slot)),
            slot,
            num_keys,
        }
    }
}
