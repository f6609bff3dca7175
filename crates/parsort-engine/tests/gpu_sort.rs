//! Sorts on a real wgpu device, checked against the host backend.
//!
//! Skipped when no adapter is available.

use parsort_engine::backend::{CpuSortDevice, WgpuSortDevice};
use parsort_engine::device::{Gpu, GpuInit};
use parsort_engine::sort::validate::verify_output;
use parsort_engine::sort::{DispatchMode, SortConfig, SortEngine, SortRequest, SourceData};

fn gpu() -> Option<Gpu> {
    match Gpu::new_blocking(GpuInit::default()) {
        Ok(gpu) => Some(gpu),
        Err(err) => {
            println!("Skipping - no GPU adapter: {err:#}");
            None
        }
    }
}

fn sort_on_gpu(
    gpu: &Gpu,
    source: &SourceData,
    request: SortRequest,
) -> (Vec<u32>, Option<Vec<u32>>) {
    let config = SortConfig {
        validation: true,
        ..SortConfig::default()
    };
    let mut engine = SortEngine::new(config, source).expect("valid config");
    let device = WgpuSortDevice::new(gpu, engine.layout(), source).expect("gpu sort device");

    let mut encoder = gpu.begin_frame();
    let output = {
        let mut recorder = device.recorder(&mut encoder);
        engine.copy_source_data(&mut recorder, &request);
        let output = engine.sort(&mut recorder, request);
        engine.record_readback(&mut recorder, &output);
        output
    };
    gpu.submit(encoder);

    device.read_output(&output).expect("readback")
}

#[test]
fn gpu_matches_host_backend() {
    let Some(gpu) = gpu() else { return };
    let source = SourceData::random(&[10, 513, 70_000], 21);

    for mode in [DispatchMode::Direct, DispatchMode::Indirect] {
        for key_set in 0..source.key_set_count() {
            let request = SortRequest {
                key_set,
                payload: true,
                mode,
            };
            let (keys, payload) = sort_on_gpu(&gpu, &source, request);
            verify_output(source.keys(key_set), source.payload(), &keys, payload.as_deref())
                .unwrap_or_else(|e| panic!("key set {key_set} {mode:?}: {e}"));

            let mut engine = SortEngine::new(SortConfig::default(), &source).expect("valid config");
            let mut host = CpuSortDevice::new(engine.layout(), &source);
            engine.copy_source_data(&mut host, &request);
            let output = engine.sort(&mut host, request);
            assert_eq!(host.read_output(&output), (keys, payload));
        }
    }
}

#[test]
fn gpu_sorts_a_1080p_frame() {
    let Some(gpu) = gpu() else { return };
    let source = SourceData::shuffled(&[1920 * 1080], 8);
    let request = SortRequest {
        key_set: 0,
        payload: false,
        mode: DispatchMode::Indirect,
    };
    let (keys, _) = sort_on_gpu(&gpu, &source, request);
    assert_eq!(keys.len(), 1920 * 1080);
    assert!(keys.iter().enumerate().all(|(i, &k)| k == i as u32));
}
