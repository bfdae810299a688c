//! bg-blaster command-line tool
//!
//! Removes image backgrounds with the RMBG-1.4 matting model, writing an alpha
//! mask and a transparent cut-out next to each input.

#[cfg(feature = "cli")]
use bg_blaster::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
