//! fotokit command-line entry point
//!
//! Runs the HTTP service by default. The transform subcommands push a local
//! file through the same pipeline the service uses.

use super::config::CliConfigBuilder;
use crate::{
    config::ServiceConfig,
    download::ModelDownloader,
    processor::{PhotoProcessor, UploadedAsset},
    server,
    tracing_config::{TracingConfig, TracingFormat},
    transforms::Operation,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Image web service: background removal, contrast enhancement and compression
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "fotokit")]
pub struct Cli {
    /// JSON configuration file; flags override its values
    #[arg(short, long, value_name = "FILE", env = "FOTOKIT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for uploads and results
    #[arg(long, value_name = "DIR", env = "FOTOKIT_UPLOAD_DIR", global = true)]
    pub upload_dir: Option<PathBuf>,

    /// Execution provider in format backend:provider (e.g., tract:cpu, onnx:auto, onnx:cuda)
    #[arg(short, long, value_name = "BACKEND:PROVIDER", global = true)]
    pub execution_provider: Option<String>,

    /// Path of the segmentation model
    #[arg(short, long, value_name = "PATH", global = true)]
    pub model: Option<PathBuf>,

    /// Number of inference threads (0 = auto-detect)
    #[arg(short, long, global = true)]
    pub threads: Option<usize>,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Console, global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP service (default)
    Serve(ServeArgs),
    /// Cut the background out of an image
    RemoveBackground(FileArgs),
    /// Improve contrast and reduce noise
    Enhance(FileArgs),
    /// Re-encode at the configured quality
    Compress(FileArgs),
    /// Show backend and execution provider diagnostics
    Providers,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(short, long, env = "FOTOKIT_BIND")]
    pub bind: Option<SocketAddr>,

    /// Maximum request body size in bytes
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,

    /// Prefix stored names with a random token
    #[arg(long)]
    pub unique_names: bool,

    /// Download the model before serving if it is missing
    #[arg(long)]
    pub download_model: bool,

    /// Load the model before accepting requests
    #[arg(long)]
    pub warm_up: bool,
}

#[derive(Args, Debug, Clone)]
pub struct FileArgs {
    /// Input image
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Also copy the result to this path
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum LogFormat {
    Console,
    Compact,
    #[cfg(feature = "tracing-json")]
    Json,
}

impl From<LogFormat> for TracingFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Console => Self::Console,
            LogFormat::Compact => Self::Compact,
            #[cfg(feature = "tracing-json")]
            LogFormat::Json => Self::Json,
        }
    }
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    TracingConfig::new()
        .with_verbosity(cli.verbose)
        .with_format(cli.log_format.into())
        .init()
        .context("Failed to initialize tracing")?;

    match cli.command.clone() {
        None => serve(&cli, ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(&cli, args).await,
        Some(Command::RemoveBackground(args)) => {
            run_file(&cli, Operation::RemoveBackground, args).await
        },
        Some(Command::Enhance(args)) => run_file(&cli, Operation::Enhance, args).await,
        Some(Command::Compress(args)) => run_file(&cli, Operation::Compress, args).await,
        Some(Command::Providers) => {
            show_provider_diagnostics();
            Ok(())
        },
    }
}

async fn serve(cli: &Cli, args: ServeArgs) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, Some(&args))?;
    info!(
        backend = %config.segmentation.backend,
        provider = %config.segmentation.execution_provider,
        model = %config.segmentation.model_path.display(),
        "Starting fotokit"
    );

    if args.download_model {
        ensure_model(&config).await?;
    }

    let processor = Arc::new(PhotoProcessor::new(config));

    if args.warm_up {
        let warm = Arc::clone(&processor);
        tokio::task::spawn_blocking(move || warm.remover().warm_up())
            .await
            .context("Model warm-up task panicked")?
            .context("Failed to load segmentation model")?;
    }

    server::serve(processor, shutdown_signal())
        .await
        .context("Server error")
}

async fn run_file(cli: &Cli, operation: Operation, args: FileArgs) -> Result<()> {
    let config = CliConfigBuilder::from_cli(cli, None)?;
    if operation == Operation::RemoveBackground {
        ensure_model(&config).await?;
    }

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let filename = args
        .input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());
    let asset = UploadedAsset::new(bytes, filename);

    let processor = PhotoProcessor::new(config);
    processor.store().ensure_root()?;
    let result = tokio::task::spawn_blocking(move || processor.process(operation, &asset))
        .await
        .context("Processing task panicked")?
        .with_context(|| format!("Failed to {operation} {}", args.input.display()))?;

    if let Some(output) = &args.output {
        tokio::fs::write(output, &result.bytes)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))?;
        println!("{}", output.display());
    } else {
        println!("{}", result.stored.path.display());
    }
    Ok(())
}

async fn ensure_model(config: &ServiceConfig) -> Result<()> {
    let downloader = ModelDownloader::new()?;
    let path = downloader
        .ensure_model(&config.segmentation)
        .await
        .context("Failed to prepare segmentation model")?;
    info!("Model ready at {}", path.display());
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}

fn show_provider_diagnostics() {
    println!("Backends and execution providers");

    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("System: {cpu_count} CPU cores detected");

    println!("\nCompiled backends:");
    if cfg!(feature = "tract") {
        println!("  tract: pure Rust, CPU only (default)");
    }
    if cfg!(feature = "onnx") {
        println!("  onnx: ONNX Runtime with hardware acceleration");
    }

    #[cfg(feature = "onnx")]
    {
        println!("\nONNX Runtime execution providers:");
        for (name, available, description) in crate::backends::OnnxBackend::list_providers() {
            let status = if available { "available" } else { "not available" };
            println!("  {name}: {status} - {description}");
        }
    }

    println!("\nUsage:");
    println!("  --execution-provider tract        # Pure Rust backend");
    println!("  --execution-provider onnx:auto    # Best available ONNX provider");
    println!("  --execution-provider onnx:cuda    # NVIDIA CUDA");
    println!("  --execution-provider onnx:coreml  # Apple CoreML");
}
