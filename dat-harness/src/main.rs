//! dat-harness entry point

use clap::Parser;

#[tokio::main]
async fn main() {
    // Initialize structured logging with env-based filter, defaulting to info
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = dat_harness::cli::Cli::parse();
    let code = dat_harness::cli::run(cli).await;
    std::process::exit(code);
}
