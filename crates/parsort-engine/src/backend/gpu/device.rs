use std::collections::HashMap;
use std::num::NonZeroU64;

use anyhow::{Context, Result};
use wgpu::util::DeviceExt;

use super::pipelines::{PASS_PARAMS_SIZE, SortBindGroupLayouts, SortPipelines};
use super::recorder::WgpuRecorder;
use crate::device::Gpu;
use crate::sort::tiling::{CONSTANT_RING_STRIDE, NUM_PASSES, pass_shifts};
use crate::sort::{
    BufferId, BufferLayout, BufferRole, IndirectSetup, Slot, SortConstants, SortedOutput,
    SourceData,
};

/// Bind groups for every binding combination the kernels use.
pub(super) struct SortBindGroups {
    /// Host constant ring + pass params.
    pub host_constants: wgpu::BindGroup,
    /// Device-written constants + pass params.
    pub device_constants: wgpu::BindGroup,
    /// Keys read from slot `i`, written to the other slot.
    pub keys: [wgpu::BindGroup; 2],
    pub payload: Option<[wgpu::BindGroup; 2]>,
    pub scratch: wgpu::BindGroup,
    pub setup: wgpu::BindGroup,
}

/// GPU backend: physical buffers, pipelines and bind groups for one
/// [`BufferLayout`].
pub struct WgpuSortDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    buffers: HashMap<BufferId, wgpu::Buffer>,
    pass_params: wgpu::Buffer,
    pub(super) pipelines: SortPipelines,
    pub(super) bind_groups: SortBindGroups,
}

impl WgpuSortDevice {
    /// Allocates every buffer of `layout`, uploads the source data and
    /// compiles the kernels.
    pub fn new(gpu: &Gpu, layout: &BufferLayout, source: &SourceData) -> Result<Self> {
        let device = gpu.device().clone();
        let queue = gpu.queue().clone();

        let mut buffers = HashMap::new();
        for desc in layout.iter() {
            let label = format!("parsort {:?}", desc.id);
            let usage = usages(desc.role);

            let buffer = match layout.initial_contents(desc.id, source) {
                Some(contents) => {
                    let mut words = vec![0u32; (desc.size / 4) as usize];
                    words[..contents.len()].copy_from_slice(contents);
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&label),
                        contents: bytemuck::cast_slice(&words),
                        usage,
                    })
                }
                None => device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&label),
                    size: desc.size,
                    usage,
                    mapped_at_creation: false,
                }),
            };
            buffers.insert(desc.id, buffer);
        }

        // One 256-byte entry per pass, selected by dynamic offset.
        let stride_words = (CONSTANT_RING_STRIDE / 4) as usize;
        let mut params = vec![0u32; NUM_PASSES as usize * stride_words];
        for (pass, shift) in pass_shifts().enumerate() {
            params[pass * stride_words] = shift;
        }
        let pass_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("parsort pass params"),
            contents: bytemuck::cast_slice(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let layouts = SortBindGroupLayouts::new(&device);
        let pipelines = SortPipelines::new(&device, &layouts, layout.has_payload());
        let bind_groups = create_bind_groups(&device, &layouts, &buffers, &pass_params)?;

        log::debug!(
            "wgpu sort device: {} buffers, {} bytes",
            buffers.len(),
            layout.iter().map(|d| d.size).sum::<u64>()
        );

        Ok(Self {
            device,
            queue,
            buffers,
            pass_params,
            pipelines,
            bind_groups,
        })
    }

    /// Wraps `encoder` in a [`crate::sort::CommandRecorder`].
    pub fn recorder<'a>(&'a self, encoder: &'a mut wgpu::CommandEncoder) -> WgpuRecorder<'a> {
        WgpuRecorder::new(self, encoder)
    }

    pub fn buffer(&self, id: BufferId) -> Option<&wgpu::Buffer> {
        self.buffers.get(&id)
    }

    pub(super) fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub(super) fn require_buffer(&self, id: BufferId) -> &wgpu::Buffer {
        match self.buffers.get(&id) {
            Some(buffer) => buffer,
            None => panic!("buffer {id:?} was not allocated"),
        }
    }

    /// Reads the first `count` words of a mappable buffer.
    ///
    /// Blocks until the device is idle; the copy into the buffer must
    /// already be submitted.
    pub fn read_words(&self, id: BufferId, count: usize) -> Result<Vec<u32>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let buffer = self
            .buffer(id)
            .with_context(|| format!("buffer {id:?} was not allocated"))?;

        let slice = buffer.slice(..(count * 4) as u64);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });

        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: None,
            })
            .context("failed to wait for readback")?;
        rx.recv()
            .context("readback callback was dropped")?
            .with_context(|| format!("failed to map {id:?}"))?;

        let words = {
            let view = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&view).to_vec()
        };
        buffer.unmap();
        Ok(words)
    }

    /// Reads back a sorted result copied by `SortEngine::record_readback`.
    pub fn read_output(&self, output: &SortedOutput) -> Result<(Vec<u32>, Option<Vec<u32>>)> {
        let n = output.num_keys as usize;
        let keys = self.read_words(BufferId::ReadbackKeys, n)?;
        let payload = match output.payload {
            Some(_) => Some(self.read_words(BufferId::ReadbackPayload, n)?),
            None => None,
        };
        Ok((keys, payload))
    }

    /// Releases every GPU buffer immediately.
    pub fn destroy(self) {
        for buffer in self.buffers.values() {
            buffer.destroy();
        }
        self.pass_params.destroy();
    }
}

fn usages(role: BufferRole) -> wgpu::BufferUsages {
    use wgpu::BufferUsages as U;
    match role {
        BufferRole::Source => U::COPY_SRC | U::COPY_DST,
        BufferRole::SortTarget => U::STORAGE | U::COPY_SRC | U::COPY_DST,
        BufferRole::Scratch => U::STORAGE,
        BufferRole::HostConstants => U::UNIFORM | U::COPY_DST,
        BufferRole::DeviceConstants => U::STORAGE | U::UNIFORM,
        BufferRole::IndirectArgs => U::STORAGE | U::INDIRECT,
        BufferRole::Table => U::STORAGE | U::COPY_DST,
        BufferRole::Readback => U::MAP_READ | U::COPY_DST,
    }
}

fn sized(buffer: &wgpu::Buffer, size: usize) -> wgpu::BindingResource<'_> {
    wgpu::BindingResource::Buffer(wgpu::BufferBinding {
        buffer,
        offset: 0,
        size: NonZeroU64::new(size as u64),
    })
}

fn pair(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::BindGroupLayout,
    first: wgpu::BindingResource<'_>,
    second: wgpu::BindingResource<'_>,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: first,
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: second,
            },
        ],
    })
}

fn create_bind_groups(
    device: &wgpu::Device,
    layouts: &SortBindGroupLayouts,
    buffers: &HashMap<BufferId, wgpu::Buffer>,
    pass_params: &wgpu::Buffer,
) -> Result<SortBindGroups> {
    let get = |id: BufferId| {
        buffers
            .get(&id)
            .with_context(|| format!("layout lacks {id:?}"))
    };
    let constants_size = std::mem::size_of::<SortConstants>();
    let params_size = PASS_PARAMS_SIZE as usize;

    let host_constants = pair(
        device,
        "parsort host constants",
        &layouts.constants,
        sized(get(BufferId::Constants)?, constants_size),
        sized(pass_params, params_size),
    );
    let device_constants = pair(
        device,
        "parsort device constants",
        &layouts.constants,
        sized(get(BufferId::IndirectConstants)?, constants_size),
        sized(pass_params, params_size),
    );

    let stream = |label: &str, src: BufferId, dst: BufferId| -> Result<wgpu::BindGroup> {
        Ok(pair(
            device,
            label,
            &layouts.stream,
            get(src)?.as_entire_binding(),
            get(dst)?.as_entire_binding(),
        ))
    };
    let keys = [
        stream("parsort keys a->b", BufferId::Keys(Slot::A), BufferId::Keys(Slot::B))?,
        stream("parsort keys b->a", BufferId::Keys(Slot::B), BufferId::Keys(Slot::A))?,
    ];
    let payload = if buffers.contains_key(&BufferId::Payload(Slot::A)) {
        Some([
            stream("parsort payload a->b", BufferId::Payload(Slot::A), BufferId::Payload(Slot::B))?,
            stream("parsort payload b->a", BufferId::Payload(Slot::B), BufferId::Payload(Slot::A))?,
        ])
    } else {
        None
    };

    let scratch = pair(
        device,
        "parsort scratch",
        &layouts.scratch,
        get(BufferId::Scratch)?.as_entire_binding(),
        get(BufferId::ReducedScratch)?.as_entire_binding(),
    );

    let setup_resources = [
        sized(get(BufferId::IndirectSetup)?, std::mem::size_of::<IndirectSetup>()),
        get(BufferId::KeyCounts)?.as_entire_binding(),
        get(BufferId::IndirectConstants)?.as_entire_binding(),
        get(BufferId::CountScatterArgs)?.as_entire_binding(),
        get(BufferId::ReduceScanArgs)?.as_entire_binding(),
    ];
    let entries: Vec<wgpu::BindGroupEntry> = setup_resources
        .into_iter()
        .zip(0..)
        .map(|(resource, binding)| wgpu::BindGroupEntry { binding, resource })
        .collect();
    let setup = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("parsort setup"),
        layout: &layouts.setup,
        entries: &entries,
    });

    Ok(SortBindGroups {
        host_constants,
        device_constants,
        keys,
        payload,
        scratch,
        setup,
    })
}
