//! Command recorders that execute the sort.

pub mod cpu;
pub mod gpu;

pub use cpu::{Command, CpuSortDevice, Hazard};
pub use gpu::{WgpuRecorder, WgpuSortDevice};
