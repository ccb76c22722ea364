//! CLI entry point for the harvester.

use qdarchive_harvester::cli;
use tracing_subscriber::EnvFilter;

fn main() {
    // Progress for this crate, warnings from dependencies; RUST_LOG overrides.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("qdarchive_harvester=info,warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
