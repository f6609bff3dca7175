//! Headless GPU device management.
//!
//! This module is responsible for:
//! - creating the wgpu Instance/Adapter/Device/Queue without a surface
//! - providing command encoders and submitting recorded work

mod gpu;
mod init;

pub use gpu::Gpu;
pub use init::GpuInit;
