use super::device::WgpuSortDevice;
use crate::sort::tiling::{CONSTANT_RING_STRIDE, SORT_BITS_PER_PASS};
use crate::sort::{BufferBarrier, BufferId, CommandRecorder, ConstantsSource, Kernel, KernelArgs};

/// Records sort commands into a wgpu command encoder.
///
/// Each dispatch gets its own compute pass, so wgpu's usage tracking
/// provides the memory ordering and [`CommandRecorder::barrier`] only logs.
/// Buffer writes go through the queue and land before the encoder's
/// commands at submit.
pub struct WgpuRecorder<'a> {
    device: &'a WgpuSortDevice,
    encoder: &'a mut wgpu::CommandEncoder,
}

impl<'a> WgpuRecorder<'a> {
    pub fn new(device: &'a WgpuSortDevice, encoder: &'a mut wgpu::CommandEncoder) -> Self {
        Self { device, encoder }
    }

    fn ring_offset(args: &KernelArgs) -> u32 {
        match args.constants {
            ConstantsSource::Host { ring_slot } => (ring_slot as u64 * CONSTANT_RING_STRIDE) as u32,
            ConstantsSource::Device => 0,
        }
    }

    fn pass_offset(args: &KernelArgs) -> u32 {
        ((args.shift / SORT_BITS_PER_PASS) as u64 * CONSTANT_RING_STRIDE) as u32
    }

    fn encode(&mut self, kernel: Kernel, args: &KernelArgs, size: DispatchCall<'_>) {
        let device = self.device;
        let pipeline = match device.pipelines.get(kernel) {
            Some(pipeline) => pipeline,
            None => panic!("no pipeline compiled for {}", kernel.label()),
        };
        let groups = &device.bind_groups;

        let mut pass = self.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel.label()),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);

        if kernel == Kernel::SetupIndirect {
            pass.set_bind_group(0, &groups.setup, &[Self::ring_offset(args)]);
        } else {
            let constants = match args.constants {
                ConstantsSource::Host { .. } => &groups.host_constants,
                ConstantsSource::Device => &groups.device_constants,
            };
            pass.set_bind_group(
                0,
                constants,
                &[Self::ring_offset(args), Self::pass_offset(args)],
            );
            pass.set_bind_group(1, &groups.keys[args.input.index()], &[]);
            pass.set_bind_group(2, &groups.scratch, &[]);

            if kernel == Kernel::ScatterPayload {
                let payload = match &groups.payload {
                    Some(payload) => &payload[args.input.index()],
                    None => panic!("payload scatter without payload buffers"),
                };
                pass.set_bind_group(3, payload, &[]);
            }
        }

        match size {
            DispatchCall::Direct([x, y, z]) => pass.dispatch_workgroups(x, y, z),
            DispatchCall::Indirect(buffer, offset) => {
                pass.dispatch_workgroups_indirect(buffer, offset)
            }
        }
    }
}

enum DispatchCall<'b> {
    Direct([u32; 3]),
    Indirect(&'b wgpu::Buffer, u64),
}

impl CommandRecorder for WgpuRecorder<'_> {
    fn write_buffer(&mut self, dst: BufferId, offset: u64, data: &[u8]) {
        self.device
            .queue()
            .write_buffer(self.device.require_buffer(dst), offset, data);
    }

    fn dispatch(&mut self, kernel: Kernel, args: &KernelArgs, groups: [u32; 3]) {
        log::trace!("wgpu dispatch {} {:?} {:?}", kernel.label(), args, groups);
        self.encode(kernel, args, DispatchCall::Direct(groups));
    }

    fn dispatch_indirect(
        &mut self,
        kernel: Kernel,
        args: &KernelArgs,
        indirect: BufferId,
        offset: u64,
    ) {
        log::trace!("wgpu indirect dispatch {} {:?} {:?}", kernel.label(), args, indirect);
        let device = self.device;
        let buffer = device.require_buffer(indirect);
        self.encode(kernel, args, DispatchCall::Indirect(buffer, offset));
    }

    fn barrier(&mut self, barriers: &[BufferBarrier]) {
        log::trace!("wgpu barrier on {} buffers", barriers.len());
    }

    fn copy_buffer(&mut self, src: BufferId, dst: BufferId, offset: u64, size: u64) {
        self.encoder.copy_buffer_to_buffer(
            self.device.require_buffer(src),
            offset,
            self.device.require_buffer(dst),
            offset,
            size,
        );
    }
}
