//! Multi-pass GPU radix sort.
//!
//! [`sort::SortEngine`] plans and records the eight 4-bit passes of a
//! FidelityFX-style parallel sort. Backends in [`backend`] execute the
//! recorded commands: on a wgpu device, or on the host with hazard checking.

pub mod backend;
pub mod device;
pub mod logging;
pub mod sort;
