use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use moodlens_core::{FrameAnalyzer, OnnxAnalyzer};
use moodlens_hw::Camera;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod config;
mod font;
mod overlay;
mod sampler;
mod source;
mod state;
mod view;

use config::Config;
use overlay::{DisplaySize, OverlaySurface};
use sampler::Sampler;
use state::{LabelState, Shutdown};

#[derive(Parser)]
#[command(name = "moodlens", about = "Live webcam emotion detection")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the live preview (default)
    Run(CommonArgs),
    /// Capture one frame, analyze it and print the result as JSON
    Probe(CommonArgs),
    /// List available capture devices
    Devices,
}

#[derive(Args, Default)]
struct CommonArgs {
    /// V4L2 device path (overrides MOODLENS_CAMERA_DEVICE)
    #[arg(short, long)]
    device: Option<String>,
    /// Model directory (overrides MOODLENS_MODEL_DIR)
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
    /// Sampling interval in milliseconds (overrides MOODLENS_POLL_INTERVAL_MS)
    #[arg(short, long)]
    interval_ms: Option<u64>,
    /// Minimum detection confidence (overrides MOODLENS_SCORE_THRESHOLD)
    #[arg(short, long)]
    score_threshold: Option<f32>,
}

fn load_config(args: &CommonArgs) -> Config {
    let mut config = Config::from_env();
    if let Some(device) = &args.device {
        config.camera_device = device.clone();
    }
    if let Some(dir) = &args.model_dir {
        config.model_dir = dir.clone();
    }
    if let Some(ms) = args.interval_ms {
        config.poll_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(threshold) = args.score_threshold {
        config.score_threshold = threshold;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run(CommonArgs::default())) {
        Commands::Run(args) => run(load_config(&args)).await,
        Commands::Probe(args) => probe(load_config(&args)).await,
        Commands::Devices => {
            devices();
            Ok(())
        }
    }
}

/// Models load before the camera starts; the sampling loop starts last.
/// Sequential and one-shot, no retries.
async fn bootstrap(config: &Config) -> Result<(OnnxAnalyzer, Camera)> {
    let model_dir = config.model_dir.clone();
    let options = config.detector_options();
    let analyzer = tokio::task::spawn_blocking(move || OnnxAnalyzer::load(&model_dir, options))
        .await
        .context("model loading task failed")?
        .context("loading models")?;
    let camera = Camera::open(&config.camera_device).context("opening camera")?;
    Ok((analyzer, camera))
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(
        device = %config.camera_device,
        model_dir = %config.model_dir.display(),
        interval_ms = config.poll_interval.as_millis() as u64,
        "moodlens starting"
    );

    let shutdown = Shutdown::new();
    let (frames_tx, frames_rx) = watch::channel(None);
    let view_frames = frames_tx.subscribe();
    let (display_tx, display_rx) = watch::channel(DisplaySize::default());
    let (label, label_rx) = LabelState::new();
    let overlay = Arc::new(Mutex::new(OverlaySurface::new()));

    let mut window_size = (640usize, 480usize);
    let mut sampler_task = None;
    let mut capture_thread = None;
    match bootstrap(&config).await {
        Ok((analyzer, camera)) => {
            window_size = (camera.width as usize, camera.height as usize);
            capture_thread = Some(source::spawn_capture(
                camera,
                frames_tx,
                shutdown.subscribe(),
            ));
            let sampler = Sampler::new(
                analyzer,
                config.poll_interval,
                frames_rx,
                display_rx,
                Arc::clone(&overlay),
                label,
                shutdown.subscribe(),
            );
            sampler_task = Some(tokio::spawn(sampler.run()));
        }
        Err(e) => {
            // Stay mounted with a blank preview; the loop never starts.
            tracing::error!(error = format!("{e:#}"), "startup failed; preview will stay blank");
        }
    }

    let params = view::ViewParams {
        title: "moodlens".to_string(),
        width: window_size.0,
        height: window_size.1,
        frames: view_frames,
        overlay,
        label: label_rx,
        display: display_tx,
        shutdown: shutdown.clone(),
    };
    let mut view_task = tokio::task::spawn_blocking(move || view::run(params));

    let mut view_done = false;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("ctrl-c received; shutting down");
        }
        _ = &mut view_task => {
            view_done = true;
        }
    }
    shutdown.trigger();
    if !view_done {
        let _ = view_task.await;
    }
    if let Some(task) = sampler_task {
        let _ = task.await;
    }
    if let Some(thread) = capture_thread {
        let _ = thread.join();
    }

    tracing::info!("moodlens stopped");
    Ok(())
}

/// One-shot diagnostic: capture a frame, analyze it, print JSON.
async fn probe(config: Config) -> Result<()> {
    let (mut analyzer, camera) = bootstrap(&config).await?;
    let frame = camera.capture_frame().context("capturing frame")?;
    let analysis = tokio::task::spawn_blocking(move || {
        analyzer.analyze(&frame.data, frame.width, frame.height)
    })
    .await
    .context("analysis task failed")?
    .context("analyzing frame")?;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("no V4L2 capture devices found");
        return;
    }
    for device in devices {
        println!("{:<14} {} [{}]", device.path, device.name, device.driver);
    }
}
