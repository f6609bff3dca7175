use std::num::NonZeroU64;

use crate::sort::tiling::{
    BLOCK_SIZE, ELEMENTS_PER_THREAD, SCAN_CAPACITY, SORT_BIN_COUNT, SORT_BITS_PER_PASS,
    THREADGROUP_SIZE,
};
use crate::sort::{IndirectSetup, Kernel, SortConstants};

/// Size of one pass-parameter entry (`shift` plus padding).
pub(super) const PASS_PARAMS_SIZE: u64 = 16;

/// WGSL declarations generated from the host tiling constants.
pub fn shader_prelude() -> String {
    format!(
        "const SORT_BITS_PER_PASS: u32 = {SORT_BITS_PER_PASS}u;
const SORT_BIN_COUNT: u32 = {SORT_BIN_COUNT}u;
const ELEMENTS_PER_THREAD: u32 = {ELEMENTS_PER_THREAD}u;
const THREADGROUP_SIZE: u32 = {THREADGROUP_SIZE}u;
const BLOCK_SIZE: u32 = {BLOCK_SIZE}u;
const SCAN_CAPACITY: u32 = {SCAN_CAPACITY}u;

struct SortConstants {{
    num_keys: u32,
    num_blocks_per_thread_group: u32,
    num_thread_groups: u32,
    num_thread_groups_with_additional_blocks: u32,
    num_reduce_threadgroup_per_bin: u32,
    num_scan_values: u32,
    _pad0: u32,
    _pad1: u32,
}}
"
    )
}

/// Full WGSL source of the module containing `kernel`.
pub fn kernel_source(kernel: Kernel) -> String {
    let mut source = shader_prelude();
    if kernel != Kernel::SetupIndirect {
        source.push_str(include_str!("shaders/common.wgsl"));
    }
    source.push_str(match kernel {
        Kernel::SetupIndirect => include_str!("shaders/setup_indirect.wgsl"),
        Kernel::Count => include_str!("shaders/count.wgsl"),
        Kernel::Reduce => include_str!("shaders/reduce.wgsl"),
        Kernel::Scan => include_str!("shaders/scan.wgsl"),
        Kernel::ScanAdd => include_str!("shaders/scan_add.wgsl"),
        Kernel::Scatter | Kernel::ScatterPayload => include_str!("shaders/scatter.wgsl"),
    });
    source
}

fn entry_point(kernel: Kernel) -> &'static str {
    match kernel {
        Kernel::Scatter => "scatter_keys",
        other => other.label(),
    }
}

// ── layout helpers ────────────────────────────────────────────────────────

fn uniform_entry(binding: u32, size: u64, dynamic: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn bind_group_layout(
    device: &wgpu::Device,
    label: &str,
    entries: &[wgpu::BindGroupLayoutEntry],
) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries,
    })
}

/// Bind group layouts of the sort kernels.
///
/// - group 0: `SortConstants` + pass parameters, both at dynamic offsets
/// - group 1: source / destination keys
/// - group 2: histogram scratch + reduced scratch
/// - group 3: source / destination payload (payload scatter only)
///
/// The setup kernel has its own single-group layout.
pub struct SortBindGroupLayouts {
    pub constants: wgpu::BindGroupLayout,
    pub stream: wgpu::BindGroupLayout,
    pub scratch: wgpu::BindGroupLayout,
    pub setup: wgpu::BindGroupLayout,
}

impl SortBindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let constants_size = std::mem::size_of::<SortConstants>() as u64;
        let setup_size = std::mem::size_of::<IndirectSetup>() as u64;

        Self {
            constants: bind_group_layout(
                device,
                "parsort constants bgl",
                &[
                    uniform_entry(0, constants_size, true),
                    uniform_entry(1, PASS_PARAMS_SIZE, true),
                ],
            ),
            stream: bind_group_layout(
                device,
                "parsort stream bgl",
                &[storage_entry(0, true), storage_entry(1, false)],
            ),
            scratch: bind_group_layout(
                device,
                "parsort scratch bgl",
                &[storage_entry(0, false), storage_entry(1, false)],
            ),
            setup: bind_group_layout(
                device,
                "parsort setup bgl",
                &[
                    uniform_entry(0, setup_size, true),
                    storage_entry(1, true),
                    storage_entry(2, false),
                    storage_entry(3, false),
                    storage_entry(4, false),
                ],
            ),
        }
    }
}

/// One compute pipeline per kernel.
pub struct SortPipelines {
    pipelines: Vec<(Kernel, wgpu::ComputePipeline)>,
}

impl SortPipelines {
    /// Compiles every kernel. `ScatterPayload` is only built when payload
    /// buffers exist.
    pub fn new(device: &wgpu::Device, layouts: &SortBindGroupLayouts, with_payload: bool) -> Self {
        let sort_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("parsort sort pipeline layout"),
            bind_group_layouts: &[&layouts.constants, &layouts.stream, &layouts.scratch],
            immediate_size: 0,
        });
        let payload_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("parsort payload pipeline layout"),
            bind_group_layouts: &[
                &layouts.constants,
                &layouts.stream,
                &layouts.scratch,
                &layouts.stream,
            ],
            immediate_size: 0,
        });
        let setup_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("parsort setup pipeline layout"),
            bind_group_layouts: &[&layouts.setup],
            immediate_size: 0,
        });

        let mut pipelines = Vec::with_capacity(Kernel::ALL.len());
        for kernel in Kernel::ALL {
            let layout = match kernel {
                Kernel::SetupIndirect => &setup_layout,
                Kernel::ScatterPayload if !with_payload => continue,
                Kernel::ScatterPayload => &payload_layout,
                _ => &sort_layout,
            };

            let label = format!("parsort {}", kernel.label());
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&label),
                source: wgpu::ShaderSource::Wgsl(kernel_source(kernel).into()),
            });

            let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(&label),
                layout: Some(layout),
                module: &module,
                entry_point: Some(entry_point(kernel)),
                compilation_options: Default::default(),
                cache: None,
            });
            pipelines.push((kernel, pipeline));
        }

        log::debug!("compiled {} sort pipelines", pipelines.len());
        Self { pipelines }
    }

    pub fn get(&self, kernel: Kernel) -> Option<&wgpu::ComputePipeline> {
        self.pipelines
            .iter()
            .find(|(k, _)| *k == kernel)
            .map(|(_, pipeline)| pipeline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_carries_host_constants() {
        let prelude = shader_prelude();
        assert!(prelude.contains("const BLOCK_SIZE: u32 = 512u;"));
        assert!(prelude.contains("const SORT_BIN_COUNT: u32 = 16u;"));
        assert!(prelude.contains("const THREADGROUP_SIZE: u32 = 128u;"));
    }

    #[test]
    fn every_kernel_source_defines_its_entry_point() {
        for kernel in Kernel::ALL {
            let source = kernel_source(kernel);
            let entry = format!("fn {}(", entry_point(kernel));
            assert!(source.contains(&entry), "{kernel:?} lacks {entry}");
        }
    }
}
