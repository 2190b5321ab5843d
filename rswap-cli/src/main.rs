use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use offload::{LogStatus, OffloadClient, Orchestrator};
use offload_proto::{ProcessingConfig, VideoEncoder};
use swap_pipeline::{PipelineContext, ProcessorRegistry};

#[derive(Parser, Debug)]
#[command(
    name = "rswap",
    version,
    about = "Swap a face onto target images and videos, remotely when a worker is reachable and locally otherwise"
)]
struct Args {
    /// Source face image.
    #[arg(
        short,
        long,
        value_name = "FILE",
        required_unless_present = "test_connection"
    )]
    source: Option<PathBuf>,

    /// Target image or video, or a directory with --folder.
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_unless_present = "test_connection"
    )]
    target: Option<PathBuf>,

    /// Output file, or output directory with --folder.
    #[arg(
        short,
        long,
        value_name = "PATH",
        required_unless_present = "test_connection"
    )]
    output: Option<PathBuf>,

    /// Pipeline stage to run, in order. Repeatable.
    #[arg(long = "frame-processor", value_name = "NAME")]
    frame_processors: Vec<String>,

    /// Keep the target video frame rate instead of probing it per render.
    #[arg(long)]
    keep_fps: bool,

    /// Copy the audio track of the target video into the output.
    #[arg(long, action = ArgAction::Set, default_value_t = true, value_name = "BOOL")]
    keep_audio: bool,

    /// Keep extracted frame directories after a video render.
    #[arg(long)]
    keep_frames: bool,

    /// Swap every detected face instead of the most prominent one.
    #[arg(long)]
    many_faces: bool,

    /// Use explicit source-to-target face mappings.
    #[arg(long)]
    map_faces: bool,

    /// Match the swapped face color profile to the target frame.
    #[arg(long)]
    color_correction: bool,

    /// Refuse to process sensitive target material.
    #[arg(long)]
    nsfw_filter: bool,

    /// Preserve the target mouth region.
    #[arg(long)]
    mouth_mask: bool,

    /// Video encoder for rendered output.
    #[arg(long, value_name = "ENCODER", default_value_t = VideoEncoder::Libx264)]
    video_encoder: VideoEncoder,

    /// Output video CRF, 0-51 (lower is better quality).
    #[arg(long, value_name = "N", default_value_t = 18)]
    video_quality: u32,

    /// Worker threads for frame processing. Defaults to 1 for DirectML and
    /// ROCm providers, 8 otherwise.
    #[arg(long, value_name = "N")]
    execution_threads: Option<u32>,

    /// Memory ceiling in GB. Defaults to 4 on macOS, 16 elsewhere.
    #[arg(long, value_name = "GB")]
    max_memory: Option<u32>,

    /// Swapped face blend opacity, 0.0-1.0.
    #[arg(long, value_name = "X", default_value_t = 1.0)]
    opacity: f64,

    /// Extra edge sharpness, 0.0 or more.
    #[arg(long, value_name = "X", default_value_t = 0.0)]
    sharpness: f64,

    /// Preferred execution provider, in priority order. Repeatable.
    #[arg(long = "execution-provider", value_name = "BACKEND")]
    execution_providers: Vec<String>,

    /// Offload worker address: host, host:port or ws://host:port.
    #[arg(long, value_name = "ADDR")]
    offload_server: Option<String>,

    /// Probe the offload worker, print the result and exit.
    #[arg(long, requires = "offload_server")]
    test_connection: bool,

    /// Treat --target as a directory and process every media file in it.
    #[arg(long)]
    folder: bool,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

impl Args {
    fn to_config(&self) -> ProcessingConfig {
        let defaults = ProcessingConfig::default();
        ProcessingConfig {
            frame_processors: if self.frame_processors.is_empty() {
                defaults.frame_processors
            } else {
                self.frame_processors.clone()
            },
            keep_fps: self.keep_fps,
            keep_audio: self.keep_audio,
            keep_frames: self.keep_frames,
            many_faces: self.many_faces,
            map_faces: self.map_faces,
            color_correction: self.color_correction,
            nsfw_filter: self.nsfw_filter,
            mouth_mask: self.mouth_mask,
            video_encoder: self.video_encoder,
            video_quality: self.video_quality,
            execution_threads: self
                .execution_threads
                .unwrap_or_else(|| suggested_execution_threads(&self.execution_providers)),
            max_memory: self.max_memory.unwrap_or_else(suggested_max_memory),
            opacity: self.opacity,
            sharpness: self.sharpness,
            execution_providers: self.execution_providers.clone(),
        }
        .normalized()
    }
}

/// Apple Silicon shares memory with the GPU, so the ceiling stays low there.
fn suggested_max_memory() -> u32 {
    if cfg!(target_os = "macos") { 4 } else { 16 }
}

/// DirectML and ROCm sessions degrade under thread contention; everything
/// else parallelizes.
fn suggested_execution_threads(providers: &[String]) -> u32 {
    let single_threaded = providers
        .iter()
        .any(|p| matches!(p.as_str(), "dml" | "directml" | "rocm"));
    if single_threaded { 1 } else { 8 }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if args.test_connection {
        let Some(server) = args.offload_server.as_deref() else {
            eprintln!("--test-connection requires --offload-server");
            process::exit(2);
        };
        let client = OffloadClient::new(server);
        let (ok, message) = client.test_connection().await;
        println!("{message}");
        process::exit(if ok { 0 } else { 1 });
    }

    let (Some(source), Some(target), Some(output)) = (&args.source, &args.target, &args.output)
    else {
        eprintln!("--source, --target and --output are required");
        process::exit(2);
    };
    if !source.is_file() {
        error!("source face image not found: {}", source.display());
        process::exit(2);
    }
    if args.folder && !target.is_dir() {
        error!("--folder requires --target to be a directory");
        process::exit(2);
    }
    if !args.folder && !target.is_file() {
        error!("target file not found: {}", target.display());
        process::exit(2);
    }

    let config = args.to_config();
    let registry = Arc::new(ProcessorRegistry::with_passthrough_defaults());
    let mut orchestrator = Orchestrator::new(PipelineContext::new(registry));
    if let Some(server) = &args.offload_server {
        orchestrator = orchestrator.with_offload(OffloadClient::new(server));
    }
    let status = LogStatus;

    let ok = if args.folder {
        match orchestrator
            .process_folder(&config, source, target, output, &status)
            .await
        {
            Ok(summary) => {
                info!(
                    successful = summary.successful,
                    failed = summary.failed,
                    "batch finished"
                );
                summary.failed == 0
            }
            Err(e) => {
                error!("batch failed: {e}");
                false
            }
        }
    } else {
        orchestrator
            .process_file(&config, source, target, output, &status)
            .await
    };

    process::exit(if ok { 0 } else { 1 });
}

fn init_logging(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_level(verbose))
        .init();
}
