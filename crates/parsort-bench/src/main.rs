//! Headless benchmark and validation harness for the radix sort.
//!
//! Sorts one of the resolution-sized key sets for a number of frames and
//! reports per-frame timings, optionally verifying every result.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use parsort_engine::backend::{CpuSortDevice, WgpuSortDevice};
use parsort_engine::device::{Gpu, GpuInit};
use parsort_engine::logging::{LoggingConfig, init_logging};
use parsort_engine::sort::tiling::DEFAULT_MAX_THREAD_GROUPS;
use parsort_engine::sort::validate::verify_output;
use parsort_engine::sort::{
    DispatchMode, RESOLUTIONS, SortConfig, SortEngine, SortRequest, SourceData,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// wgpu compute device
    Gpu,
    /// Host reference backend with hazard checking
    Cpu,
}

#[derive(Debug, Parser)]
#[clap(about, version)]
struct Cli {
    /// Key set to sort every frame (0 = 1080p, 1 = 1440p, 2 = 2160p)
    #[arg(long)]
    key_set: Option<usize>,
    /// Sort the payload along with the keys
    #[arg(long)]
    payload: bool,
    /// Derive dispatch sizes on the device
    #[arg(long)]
    indirect: bool,
    /// Measured frames
    #[arg(long, default_value_t = 100)]
    frames: u32,
    /// Unmeasured frames before the measured ones
    #[arg(long, default_value_t = 10)]
    warmup: u32,
    /// Cap on Count/Scatter thread groups
    #[arg(long, default_value_t = DEFAULT_MAX_THREAD_GROUPS)]
    max_thread_groups: u32,
    #[arg(long, value_enum, default_value_t = Backend::Gpu)]
    backend: Backend,
    /// Read back and verify every sorted frame
    #[arg(long)]
    validate: bool,
    /// Seed of the shuffled key sets
    #[arg(long, default_value_t = 0)]
    seed: u64,
    /// Log filter, `env_logger` syntax
    #[arg(long)]
    log: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LoggingConfig {
        env_filter: cli.log.clone(),
        ..LoggingConfig::default()
    });

    let source = SourceData::resolutions(cli.seed);
    let config = SortConfig {
        max_thread_groups: cli.max_thread_groups,
        mode: if cli.indirect {
            DispatchMode::Indirect
        } else {
            DispatchMode::Direct
        },
        key_set_override: cli.key_set,
        payload_override: cli.payload,
        validation: cli.validate,
        ..SortConfig::default()
    };
    let mut engine = SortEngine::new(config, &source).context("invalid sort configuration")?;

    let request = engine.frame_request();
    let (width, height) = RESOLUTIONS[request.key_set];
    log::info!(
        "sorting {}x{} ({} keys), payload {}, {:?}, {:?} backend",
        width,
        height,
        engine.num_keys(request.key_set),
        request.payload,
        request.mode,
        cli.backend,
    );

    let timings = match cli.backend {
        Backend::Gpu => run_gpu(&cli, &mut engine, &source)?,
        Backend::Cpu => run_cpu(&cli, &mut engine, &source)?,
    };
    report(&timings, engine.num_keys(request.key_set));
    Ok(())
}

fn run_gpu(cli: &Cli, engine: &mut SortEngine, source: &SourceData) -> Result<Vec<Duration>> {
    let gpu = Gpu::new_blocking(GpuInit::default())?;
    let info = gpu.adapter_info();
    log::info!("adapter: {} ({:?})", info.name, info.backend);

    let device = WgpuSortDevice::new(&gpu, engine.layout(), source)?;
    let mut timings = Vec::with_capacity(cli.frames as usize);

    for frame in 0..cli.warmup + cli.frames {
        let request = engine.frame_request();
        let start = Instant::now();

        let mut encoder = gpu.begin_frame();
        let output = {
            let mut recorder = device.recorder(&mut encoder);
            engine.copy_source_data_for_frame(&mut recorder);
            let output = engine.sort(&mut recorder, request);
            if cli.validate {
                engine.record_readback(&mut recorder, &output);
            }
            output
        };
        gpu.submit(encoder);
        gpu.wait_idle()?;

        if frame >= cli.warmup {
            timings.push(start.elapsed());
        }
        if cli.validate {
            let (keys, payload) = device.read_output(&output)?;
            validate(source, &request, frame, &keys, payload.as_deref())?;
        }
    }

    device.destroy();
    Ok(timings)
}

fn run_cpu(cli: &Cli, engine: &mut SortEngine, source: &SourceData) -> Result<Vec<Duration>> {
    let mut device = CpuSortDevice::new(engine.layout(), source);
    let mut timings = Vec::with_capacity(cli.frames as usize);

    for frame in 0..cli.warmup + cli.frames {
        let request = engine.frame_request();
        let start = Instant::now();

        engine.copy_source_data_for_frame(&mut device);
        let output = engine.sort(&mut device, request);

        if frame >= cli.warmup {
            timings.push(start.elapsed());
        }
        if cli.validate {
            let (keys, payload) = device.read_output(&output);
            validate(source, &request, frame, &keys, payload.as_deref())?;
        }
        device.clear_commands();
    }

    Ok(timings)
}

fn validate(
    source: &SourceData,
    request: &SortRequest,
    frame: u32,
    keys: &[u32],
    payload: Option<&[u32]>,
) -> Result<()> {
    verify_output(source.keys(request.key_set), source.payload(), keys, payload)
        .with_context(|| format!("frame {frame} produced an invalid sort"))?;
    log::debug!("frame {frame} verified");
    Ok(())
}

fn report(timings: &[Duration], num_keys: u32) {
    if timings.is_empty() {
        log::info!("no measured frames");
        return;
    }

    let ms: Vec<f64> = timings.iter().map(|t| t.as_secs_f64() * 1e3).collect();
    let mean = ms.iter().sum::<f64>() / ms.len() as f64;
    let min = ms.iter().copied().fold(f64::INFINITY, f64::min);
    let max = ms.iter().copied().fold(0.0, f64::max);
    let mkeys = num_keys as f64 / (mean * 1e-3) / 1e6;

    log::info!(
        "{} frames: mean {:.3} ms, min {:.3} ms, max {:.3} ms, {:.1} Mkeys/s",
        ms.len(),
        mean,
        min,
        max,
        mkeys,
    );
}
