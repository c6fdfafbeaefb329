#![cfg(not(tarpaulin_include))]

use clap::Parser;
use student_insights::app;
use student_insights::config::{Secrets, ServerConfig};
use student_insights::logging;

/// Main entry point for the web application
///
/// Reads configuration from the command line and environment, loads the
/// student records and serves the question page until stopped.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::parse();
    logging::init_logger(config.service.verbose);

    let secrets = Secrets::from_env()?;

    app::run(config, secrets).await
}
