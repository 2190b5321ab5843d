use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, error, info};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use offload::{OffloadWorker, WorkerConfig};
use offload_proto::DEFAULT_PORT;
use swap_pipeline::ffmpeg::ffmpeg_available;
use swap_pipeline::{ExecutionBackend, PipelineContext, ProcessorRegistry};

#[derive(Parser, Debug)]
#[command(
    name = "swapd",
    version,
    about = "Face-swap worker daemon: accepts jobs over WebSocket and returns rendered artifacts"
)]
struct Args {
    /// Address to listen on.
    #[arg(long, default_value_t = SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)))]
    bind: SocketAddr,

    /// Preferred execution providers, in priority order. Repeatable.
    #[arg(long = "execution-provider", value_name = "BACKEND")]
    execution_providers: Vec<ExecutionBackend>,

    /// Directory per-job scratch directories are created under.
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    if let Err(e) = run(args).await {
        error!("worker failed: {e}");
        process::exit(1);
    }
}

async fn run(args: Args) -> std::io::Result<()> {
    // Video jobs shell out to ffmpeg; refuse to start without it rather
    // than failing jobs later.
    if !ffmpeg_available() {
        return Err(std::io::Error::other(
            "ffmpeg is not installed (required for video jobs)",
        ));
    }

    let registry = Arc::new(ProcessorRegistry::with_passthrough_defaults());
    let worker = Arc::new(OffloadWorker::new(
        PipelineContext::new(registry),
        WorkerConfig {
            scratch_root: args.scratch_dir.unwrap_or_else(std::env::temp_dir),
            preferred_backends: args.execution_providers,
            ..WorkerConfig::default()
        },
    ));
    info!(
        backends = ?worker.backend_names(),
        active = %worker.active_backend(),
        "swapd starting"
    );

    let listener = TcpListener::bind(args.bind).await?;
    worker.serve(listener).await
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
