#![cfg(not(tarpaulin_include))]

use anyhow::Context;
use clap::Parser;
use student_insights::config::{Secrets, ServiceConfig};
use student_insights::dataset::Dataset;
use student_insights::logging;
use student_insights::stats::{render_summary, summarize};

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Print a summary of the student records and optionally ask one question", long_about = None)]
struct Cli {
    /// Question to ask; only the summary is printed when omitted
    question: Option<String>,

    #[command(flatten)]
    service: ServiceConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logger(cli.service.verbose);

    let dataset = Dataset::from_path(&cli.service.data)
        .with_context(|| format!("failed to load dataset from {}", cli.service.data.display()))?;

    match summarize(&dataset) {
        Ok(stats) => println!("Data Summary:\n{}", render_summary(&stats)),
        Err(e) => eprintln!("Summary unavailable: {e}"),
    }

    let Some(question) = cli.question else {
        return Ok(());
    };

    let secrets = Secrets::from_env()?;
    let service = cli.service.answer_service(&secrets.api_key)?;
    let answer = service.ask(&question, dataset.as_csv()).await;

    println!("Answer:\n{}", answer.message());
    Ok(())
}
