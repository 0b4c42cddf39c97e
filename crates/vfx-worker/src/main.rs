//! Transition render command line tool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use vfx_media::{check_ffprobe, extract_palette, probe_rendered, CancelHandle, FfmpegEngine, TranscodeEngine};
use vfx_worker::{load_transition, ProgressCallback, RenderCoordinator, RenderManifest, WorkerConfig};

#[derive(Parser, Debug)]
#[command(name = "vfx-render", version, about = "Burn Lottie transitions into joined video clips")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a manifest into one video.
    Render(RenderArgs),
    /// Print a transition's timing and color palette as JSON.
    Inspect {
        /// Lottie JSON document
        path: PathBuf,
    },
    /// Print the JSON schema of the render manifest.
    Schema,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// Render manifest JSON.
    #[arg(long)]
    manifest: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    output: PathBuf,

    /// Cancel the render after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Maximum clips normalized at once.
    #[arg(long)]
    max_parallel: Option<usize>,

    /// FFmpeg binary to use instead of the one on PATH.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Render(args) => cmd_render(args).await,
        Command::Inspect { path } => cmd_inspect(&path).await,
        Command::Schema => {
            println!("{}", serde_json::to_string_pretty(&RenderManifest::schema())?);
            Ok(())
        }
    }
}

/// Colored output for terminals, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

async fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let mut config = WorkerConfig::from_env();
    if let Some(secs) = args.timeout_secs {
        config.render_timeout = Some(Duration::from_secs(secs));
    }
    if args.max_parallel.is_some() {
        config.max_parallel = args.max_parallel;
    }
    if args.ffmpeg.is_some() {
        config.ffmpeg_bin = args.ffmpeg;
    }
    config.validate()?;
    info!(?config, "Worker config");

    tokio::fs::create_dir_all(&config.work_dir)
        .await
        .with_context(|| format!("create work dir '{}'", config.work_dir.display()))?;

    let engine = match &config.ffmpeg_bin {
        Some(binary) => FfmpegEngine::with_binary(binary),
        None => FfmpegEngine::from_path()?,
    }
    .with_scratch_root(&config.work_dir);
    info!(engine = engine.name(), binary = %engine.binary().display(), "Transcoding engine ready");

    let manifest = RenderManifest::from_file(&args.manifest).await?;
    let base_dir = args.manifest.parent().unwrap_or_else(|| Path::new("."));
    let request = manifest.load_request(base_dir).await?;

    let cancel = CancelHandle::new();
    if let Some(deadline) = config.render_timeout {
        cancel.cancel_after(deadline);
    }
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, cancelling render");
                cancel.cancel();
            }
        });
    }

    let last_logged = Arc::new(AtomicU64::new(0));
    let on_progress: ProgressCallback = Arc::new(move |percent: f64| {
        let step = (percent / 5.0).floor() as u64;
        if last_logged.fetch_max(step, Ordering::Relaxed) < step {
            info!(percent = %format!("{percent:.1}"), "Render progress");
        }
    });

    let coordinator = RenderCoordinator::from_config(Arc::new(engine), &config);
    let output = coordinator.render(request, on_progress, cancel.signal()).await?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    tokio::fs::write(&args.output, &output)
        .await
        .with_context(|| format!("write output '{}'", args.output.display()))?;
    info!(path = %args.output.display(), bytes = output.len(), "Output written");

    if check_ffprobe().is_ok() {
        match probe_rendered(&args.output).await {
            Ok(probed) => info!(
                duration = probed.duration,
                width = probed.width,
                height = probed.height,
                frame_rate = probed.frame_rate,
                "Output probed"
            ),
            Err(e) => warn!("Failed to probe output: {}", e),
        }
    }

    Ok(())
}

async fn cmd_inspect(path: &Path) -> anyhow::Result<()> {
    let descriptor = load_transition(path, &[]).await?;
    let palette = extract_palette(&descriptor.document);

    let report = json!({
        "name": descriptor.name,
        "frame_rate": descriptor.frame_rate,
        "total_frames": descriptor.total_frames,
        "impact_marker_frame": descriptor.impact_marker_frame,
        "pre_roll_secs": descriptor.pre_roll(),
        "duration_secs": descriptor.duration(),
        "width": descriptor.intrinsic_width,
        "height": descriptor.intrinsic_height,
        "palette": palette,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
