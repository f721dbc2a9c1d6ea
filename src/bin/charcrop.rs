//! charcrop CLI Tool
//!
//! Command-line interface for character crop extraction, caption maintenance
//! and crop sorting.

#[cfg(feature = "cli")]
use charcrop::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
