//! wgpu backend.
//!
//! Compiles the WGSL kernels, allocates one physical buffer per
//! [`crate::sort::BufferDesc`] and records sort commands into a
//! `wgpu::CommandEncoder`.

mod device;
mod pipelines;
mod recorder;

pub use device::WgpuSortDevice;
pub use pipelines::{kernel_source, shader_prelude};
pub use recorder::WgpuRecorder;
