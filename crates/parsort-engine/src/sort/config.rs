use super::dispatch::DispatchMode;
use super::tiling::DEFAULT_MAX_THREAD_GROUPS;

/// Engine configuration.
///
/// `key_set`, `sort_payload` and `mode` are the interactive selections and may
/// change between frames. The `*_override` fields pin the per-frame request and
/// take precedence over them.
#[derive(Debug, Clone)]
pub struct SortConfig {
    /// Cap on Count/Scatter thread groups.
    pub max_thread_groups: u32,

    /// Selected key set.
    pub key_set: usize,

    /// Whether payloads are sorted along with keys.
    pub sort_payload: bool,

    pub mode: DispatchMode,

    /// Allocate payload buffers. Required for any payload sort.
    pub payload_buffers: bool,

    /// Forces every frame to sort this key set.
    pub key_set_override: Option<usize>,

    /// Forces every frame to sort payloads.
    pub payload_override: bool,

    /// Key capacity of the sort buffers. Defaults to the largest key set.
    pub max_keys: Option<u32>,

    /// Allocate host-readable copies of the sorted output.
    pub validation: bool,
}

impl Default for SortConfig {
    fn default() -> Self {
        Self {
            max_thread_groups: DEFAULT_MAX_THREAD_GROUPS,
            key_set: 0,
            sort_payload: false,
            mode: DispatchMode::Direct,
            payload_buffers: true,
            key_set_override: None,
            payload_override: false,
            max_keys: None,
            validation: false,
        }
    }
}
