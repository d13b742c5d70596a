use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    shelfspine::logging::init().context("init logging")?;

    let cli = shelfspine::cli::Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        shelfspine::cli::Command::Scrape(args) => {
            shelfspine::cli::run_scrape(args).await.context("scrape")?;
        }
    }

    Ok(())
}
