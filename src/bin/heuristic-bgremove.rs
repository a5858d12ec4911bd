//! Heuristic background removal CLI tool
//!
//! Command-line interface for removing and replacing image backgrounds with
//! the heuristic-bgremove library.

#[cfg(feature = "cli")]
use heuristic_bgremove::cli;

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
