//! Nether-Bridge - play an emulation core's audio at the host rate
//!
//! Drives the stand-in tone core through the resampler, either against a
//! headless render clock or (with the `device-output` feature) the default
//! audio device.
//!
//! # Usage
//!
//! ```bash
//! nether-bridge --headless
//! nether-bridge --source-rate 32000 --channels 2 --bit-depth 16 --tone 440 --seconds 3 --volume 0.5
//! nether-bridge --source-rate 22050 --channels 1 --bit-depth 8 --host-rate 48000 --headless
//! RUST_LOG=debug nether-bridge --headless --config ./bridge.toml
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use nether_bridge::{BridgeConfig, HeadlessHost, HostReport, Pipeline, config};
use nether_resample::{AudioSourceFormat, StatsLogger, ToneCore};

#[derive(Parser)]
#[command(name = "nether-bridge")]
#[command(
    author,
    version,
    about = "Bridge an emulated console's audio clock to the host"
)]
struct Args {
    /// Emulated core sample rate in Hz
    #[arg(long, default_value = "32000")]
    source_rate: f64,

    /// Emulated core channel count (1 or 2)
    #[arg(long, default_value = "2")]
    channels: u32,

    /// Emulated core bit depth (8 or 16)
    #[arg(long, default_value = "16")]
    bit_depth: u32,

    /// Frequency of the test tone in Hz
    #[arg(long, default_value = "440")]
    tone: f64,

    /// Host sample rate for the headless clock (default: from config)
    #[arg(long)]
    host_rate: Option<f64>,

    /// Frames per render tick (default: from config)
    #[arg(long)]
    frames: Option<usize>,

    /// Output volume, 0.0 - 1.0 (default: from config)
    #[arg(long)]
    volume: Option<f32>,

    /// How long to run
    #[arg(long, default_value = "5")]
    seconds: f64,

    /// Use the headless render clock instead of an audio device
    #[arg(long)]
    headless: bool,

    /// Config file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_from(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => config::load(),
    };
    if let Some(rate) = args.host_rate {
        config.host.sample_rate = rate;
    }
    if let Some(frames) = args.frames {
        config.host.frame_capacity = frames;
    }
    if let Some(volume) = args.volume {
        config.host.volume = volume;
    }
    config.validate()?;

    let format = AudioSourceFormat::new(args.channels, args.bit_depth, args.source_rate)?;
    let core = ToneCore::sine(format, args.tone);
    let duration = Duration::from_secs_f64(args.seconds.max(0.0));

    if args.headless {
        run_headless(core, &config, duration)
    } else {
        run_device(core, &config, duration)
    }
}

fn run_headless(core: ToneCore, config: &BridgeConfig, duration: Duration) -> Result<()> {
    let host_rate = config.host.sample_rate;
    let (mut pipeline, side) = Pipeline::start(Box::new(core), host_rate, config)?;
    let host = HeadlessHost::spawn(side, host_rate, config.host.frame_capacity)?;

    monitor(&mut pipeline, duration);

    let (_side, report) = host.stop()?;
    summarize(&pipeline, &report);
    Ok(())
}

#[cfg(feature = "device-output")]
fn run_device(core: ToneCore, config: &BridgeConfig, duration: Duration) -> Result<()> {
    use nether_bridge::device::{DeviceOutput, DeviceTarget};

    let target = DeviceTarget::default_output()?;
    let host_rate = target.sample_rate();
    info!(
        "Using default output device: {}Hz, {} channels",
        host_rate,
        target.channels()
    );

    let (mut pipeline, side) = Pipeline::start(Box::new(core), host_rate, config)?;
    let output = DeviceOutput::start(target, side)?;

    monitor(&mut pipeline, duration);
    drop(output);

    let stats = pipeline.render_stats().snapshot();
    info!(
        "Done: {} ticks, {:.1}% filled, {} underruns, {} bytes dropped by producer",
        stats.ticks,
        stats.fill_ratio() * 100.0,
        stats.underruns,
        pipeline.producer_stats().bytes_dropped()
    );
    Ok(())
}

#[cfg(not(feature = "device-output"))]
fn run_device(core: ToneCore, config: &BridgeConfig, duration: Duration) -> Result<()> {
    warn!("Built without the device-output feature; using the headless clock");
    run_headless(core, config, duration)
}

/// Log stats once a second and free retired configurations until `duration` passes.
fn monitor(pipeline: &mut Pipeline, duration: Duration) {
    let mut logger = StatsLogger::new(Duration::from_secs(1));
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
        logger.maybe_log(pipeline.render_stats());
        pipeline.collect_retired();
    }
}

fn summarize(pipeline: &Pipeline, report: &HostReport) {
    let stats = pipeline.render_stats().snapshot();
    info!(
        "Done: {} ticks, {} of {} frames rendered ({:.1}%), {} short ticks, peak {:.3}",
        report.ticks,
        report.frames_written,
        report.frames_requested,
        report.fill_ratio() * 100.0,
        report.short_ticks,
        report.peak
    );
    match report.estimated_frequency() {
        Some(frequency) => info!("Estimated output frequency: {:.1} Hz", frequency),
        None => warn!("No audio reached the host"),
    }
    info!(
        "Resampler: {} underruns, {} short reads, {} bytes consumed; producer dropped {} bytes",
        stats.underruns,
        stats.short_reads,
        stats.bytes_consumed,
        pipeline.producer_stats().bytes_dropped()
    );
}
