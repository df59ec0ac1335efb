use std::process::ExitCode;

use clap::Parser;
use resume_uploader::cli::{run, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment
    dotenvy::dotenv().ok();

    // Logs go to stderr so a scheduler's captured stdout stays quiet.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
    tracing::info!("CLI application startup: tracing initialised, environment loaded");

    let cli = Cli::parse();
    tracing::info!("CLI arguments parsed, invoking run");
    match run(cli).await {
        Ok(status) => {
            if status.is_success() {
                tracing::info!("CLI completed successfully");
            } else {
                tracing::error!(code = status.code(), "CLI finished with a failed run");
            }
            status.into()
        }
        Err(e) => {
            tracing::error!(error = %e, "CLI exited with error");
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
