/// Configuration errors detected when an engine is created.
///
/// These are fatal: an engine is never built from a configuration that could
/// overrun its scratch memory.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SortError {
    /// No key set was supplied.
    #[error("at least one key set is required")]
    NoKeySets,

    /// A key set index does not name a configured key set.
    #[error("key set {index} is out of range ({available} key sets configured)")]
    KeySetOutOfRange { index: usize, available: usize },

    /// A key set is larger than the configured key capacity.
    #[error("key set {index} holds {num_keys} keys but capacity is {max_keys}")]
    KeyCapacityExceeded {
        index: usize,
        num_keys: u32,
        max_keys: u32,
    },

    /// The thread-group cap would yield zero dispatches.
    #[error("max thread groups must be non-zero")]
    ZeroThreadGroups,

    /// Histogram scratch is smaller than a key set needs.
    #[error(
        "scratch buffer holds {available} bytes but {num_keys} keys need {required} bytes"
    )]
    ScratchTooSmall {
        num_keys: u32,
        required: u64,
        available: u64,
    },

    /// Reduced scratch is smaller than a key set needs.
    #[error(
        "reduced scratch buffer holds {available} bytes but {num_keys} keys need {required} bytes"
    )]
    ReducedScratchTooSmall {
        num_keys: u32,
        required: u64,
        available: u64,
    },

    /// The reduced values do not fit a single scan thread group.
    #[error("{scan_values} reduced values exceed the single-group scan capacity of {capacity}")]
    ScanCapacityExceeded { scan_values: u32, capacity: u32 },
}

/// Read-back validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected {expected} sorted values, found {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("entry {index} ({value}) is larger than the next entry ({next})")]
    OutOfOrder { index: usize, value: u32, next: u32 },

    #[error("sorted keys are not a permutation of the source keys")]
    NotAPermutation,

    #[error("entry {index} pairs key {key} with payload {payload}, which is not a source pair")]
    PayloadMismatch { index: usize, key: u32, payload: u32 },

    #[error("equal keys {key} at {index} lost their original order")]
    Unstable { index: usize, key: u32 },
}
