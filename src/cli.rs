use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};

use crate::app::runner::ScrapeRunner;
use crate::cover::CoverOptions;
use crate::fetch::HttpFetcher;
use crate::scrape::{DEFAULT_USER_AGENT, ScrapeOptions};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scrape one shelf and print the books as JSON.
    Scrape(ScrapeArgs),
}

#[derive(Debug, Args)]
pub struct ScrapeArgs {
    /// Shelf listing URL (http/https, `/review/list/...`).
    #[arg(long)]
    pub url: String,

    /// Write the JSON response here instead of stdout.
    #[arg(long)]
    pub out: Option<String>,

    #[command(flatten)]
    pub options: ScrapeOptionArgs,
}

/// Tunables shared by the CLI and the app server.
#[derive(Debug, Clone, Args)]
pub struct ScrapeOptionArgs {
    /// Width of the left cover strip averaged for the spine color, in percent.
    #[arg(long, default_value_t = 10.0)]
    pub edge_width_percent: f64,

    /// Minimum contrast ratio for a palette color to be used as spine text.
    #[arg(long, default_value_t = 4.5)]
    pub min_contrast: f64,

    /// Number of palette colors considered for the spine text.
    #[arg(long, default_value_t = 6)]
    pub palette_size: usize,

    /// Page count used when a row has none.
    #[arg(long, default_value_t = crate::shelf::DEFAULT_PAGE_COUNT)]
    pub default_page_count: u32,

    #[arg(long, default_value_t = 15)]
    pub first_page_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub page_timeout_secs: u64,

    #[arg(long, default_value_t = 10)]
    pub image_timeout_secs: u64,

    /// Maximum concurrent cover downloads within one page.
    #[arg(long, default_value_t = 4)]
    pub cover_concurrency: usize,

    /// Stop after this many listing pages.
    #[arg(long, default_value_t = 500)]
    pub max_pages: u32,

    #[arg(long, default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl ScrapeOptionArgs {
    pub fn to_options(&self) -> ScrapeOptions {
        ScrapeOptions {
            cover: CoverOptions {
                edge_width_percent: self.edge_width_percent,
                min_contrast: self.min_contrast,
                palette_size: self.palette_size,
                timeout: Duration::from_secs(self.image_timeout_secs),
            },
            default_page_count: self.default_page_count.max(1),
            first_page_timeout: Duration::from_secs(self.first_page_timeout_secs),
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            cover_concurrency: self.cover_concurrency.max(1),
            max_pages: self.max_pages.max(1),
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Scrapes one shelf and writes the JSON response to `--out` or stdout.
///
/// Ctrl-C cancels the run; whatever was gathered is still written.
pub async fn run_scrape(args: ScrapeArgs) -> anyhow::Result<()> {
    let options = args.options.to_options();
    let fetcher = HttpFetcher::new(options.user_agent.clone()).context("build http fetcher")?;
    let runner = Arc::new(ScrapeRunner::new(Arc::new(fetcher), options));

    let interrupt_runner = Arc::clone(&runner);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; cancelling scrape");
            interrupt_runner.cancel_active();
        }
    });

    let (status, response) = runner.scrape(Some(&args.url)).await;
    interrupt.abort();

    let json = serde_json::to_string_pretty(&response).context("serialize scrape response")?;
    match &args.out {
        Some(path) => std::fs::write(path, format!("{json}\n"))
            .with_context(|| format!("write scrape response: {path}"))?,
        None => println!("{json}"),
    }

    if !status.is_success() {
        anyhow::bail!(
            "scrape failed ({status}): {}",
            response.error.as_deref().unwrap_or("unknown error")
        );
    }
    if let Some(warning) = response.error.as_deref() {
        tracing::warn!("{warning}");
    }
    tracing::info!(books = response.books.len(), "scrape written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_defaults_match_library_defaults() {
        let cli = Cli::parse_from([
            "shelfspine",
            "scrape",
            "--url",
            "https://example.com/review/list/1",
        ]);
        let Command::Scrape(args) = cli.command;
        assert_eq!(args.options.to_options(), ScrapeOptions::default());
        assert_eq!(args.out, None);
    }

    #[test]
    fn option_flags_override_defaults() {
        let cli = Cli::parse_from([
            "shelfspine",
            "scrape",
            "--url",
            "https://example.com/review/list/1",
            "--edge-width-percent",
            "25",
            "--cover-concurrency",
            "0",
        ]);
        let Command::Scrape(args) = cli.command;
        let options = args.options.to_options();
        assert_eq!(options.cover.edge_width_percent, 25.0);
        assert_eq!(options.cover_concurrency, 1);
    }
}
