//! Cutout composer CLI
//!
//! Background removal and randomized layout compositing from the command line.

#[cfg(feature = "cli")]
use cutout_composer::cli;

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
