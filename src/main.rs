//! depcore CLI entry point.
//!
//! Parses arguments, wires up logging, and maps the result of
//! [`depcore::cli::Cli::run`] onto the process exit code.

use clap::Parser;
use depcore::cli;
use depcore::core::error::user_friendly_error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // 1. RUST_LOG set: always honor it.
    // 2. RUST_LOG unset, --verbose: debug level.
    // 3. Neither: logging off.
    let rust_log_exists = std::env::var("RUST_LOG").is_ok();
    let filter = if rust_log_exists {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error"))
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("off")
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_thread_ids(false).init();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(failure) = cli.run().await {
        let error_ctx = user_friendly_error(failure.error.into());
        error_ctx.display();
        std::process::exit(failure.code);
    }
}
