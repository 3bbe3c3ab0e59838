//! fotokit image service
//!
//! Serves background removal, contrast enhancement and compression over HTTP,
//! or runs a single transform on a local file.

#[cfg(feature = "cli")]
use fotokit::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
