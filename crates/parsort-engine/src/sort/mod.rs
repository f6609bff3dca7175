//! Radix sort core.
//!
//! Everything here is backend-agnostic: buffers are named by [`BufferId`] and
//! work is recorded through [`CommandRecorder`].

mod buffers;
mod config;
mod dispatch;
mod engine;
mod error;
mod layout;
mod recorder;
mod sequencer;
mod sizing;
mod source;

pub mod tiling;
pub mod validate;

pub use buffers::BufferSet;
pub use config::SortConfig;
pub use dispatch::{
    DispatchArgs, DispatchMode, DispatchParameterProvider, DispatchPlan, DispatchSize,
    IndirectSetup, PassDispatch, SortConstants,
};
pub use engine::{SortEngine, SortRequest, SortedOutput};
pub use error::{SortError, ValidationError};
pub use layout::{BufferDesc, BufferLayout, BufferRole};
pub use recorder::{
    Access, BufferBarrier, BufferId, BufferUse, CommandRecorder, ConstantsSource, Kernel,
    KernelArgs, Slot,
};
pub use sequencer::{PassStep, RadixPassSequencer};
pub use sizing::{ScratchSizes, calculate_scratch_sizes};
pub use source::{RESOLUTIONS, SourceData};
