//! Pagination driver: fetches listing pages in order, analyzes each valid
//! row's cover and reports progress as books are appended.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cover::{self, CoverColors, CoverOptions};
use crate::fetch::Fetch;
use crate::formats::BookRecord;
use crate::progress::RunProgress;
use crate::shelf::{self, RawBook, ShelfUrl};

pub const NO_BOOKS_MESSAGE: &str = "No valid books found.";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (compatible; shelfspine/0.1)";

#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeOptions {
    pub cover: CoverOptions,
    pub default_page_count: u32,
    pub first_page_timeout: Duration,
    pub page_timeout: Duration,
    pub cover_concurrency: usize,
    pub max_pages: u32,
    pub user_agent: String,
}

impl Default for ScrapeOptions {
    fn default() -> Self {
        Self {
            cover: CoverOptions::default(),
            default_page_count: shelf::DEFAULT_PAGE_COUNT,
            first_page_timeout: Duration::from_secs(15),
            page_timeout: Duration::from_secs(10),
            cover_concurrency: 4,
            max_pages: 500,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScrapeOutcome {
    /// The first page could not be fetched; no books.
    Fatal { error: String },
    /// Pagination ended. `warning` is set when a later page failed or the
    /// run was cancelled, in which case `books` is partial.
    Finished {
        books: Vec<BookRecord>,
        warning: Option<String>,
    },
}

/// Runs one scrape against `shelf`, writing progress through `progress`.
///
/// The caller resets the board (which yields `progress`) before calling.
pub async fn scrape_shelf(
    fetcher: Arc<dyn Fetch>,
    shelf: &ShelfUrl,
    options: &ScrapeOptions,
    progress: &RunProgress,
    cancel: &CancellationToken,
) -> ScrapeOutcome {
    tracing::info!(run_id = %progress.run_id(), shelf = %shelf.as_url(), "scrape started");

    let mut books: Vec<BookRecord> = Vec::new();
    let mut warning: Option<String> = None;
    let mut page: u32 = 1;

    loop {
        if page > options.max_pages.max(1) {
            tracing::warn!(max_pages = options.max_pages, "page limit reached; stopping");
            break;
        }

        let page_url = shelf.page_url(page);
        let timeout = if page == 1 {
            options.first_page_timeout
        } else {
            options.page_timeout
        };

        let fetched = if cancel.is_cancelled() {
            Err(PageError::Cancelled)
        } else {
            tokio::select! {
                _ = cancel.cancelled() => Err(PageError::Cancelled),
                res = fetcher.fetch_text(&page_url, timeout) => res.map_err(PageError::Fetch),
            }
        };

        let html = match fetched {
            Ok(html) => html,
            Err(err) if page == 1 => {
                let error = match err {
                    PageError::Cancelled => "Run cancelled before the first page.".to_string(),
                    PageError::Fetch(err) => format!("Error connecting to shelf: {err:#}"),
                };
                tracing::error!(url = %page_url, "{error}");
                progress.set_error(error.clone());
                progress.finish();
                return ScrapeOutcome::Fatal { error };
            }
            Err(err) => {
                let message = match err {
                    PageError::Cancelled => format!("Run cancelled before page {page}."),
                    PageError::Fetch(err) => format!("Failed page {page}: {err:#}"),
                };
                tracing::warn!(page, url = %page_url, "{message}");
                progress.set_error(message.clone());
                warning = Some(message);
                break;
            }
        };

        let parsed = shelf::parse_page(&html, options.default_page_count);
        drop(html);

        if page == 1 {
            progress.set_total(u64::from(parsed.total_hint.max(1)));
        }
        if parsed.is_end() {
            tracing::info!(page, "no rows on page; listing exhausted");
            break;
        }

        tracing::info!(
            page,
            rows = parsed.rows_seen,
            valid = parsed.books.len(),
            "parsed shelf page"
        );
        process_rows(
            &fetcher,
            &page_url,
            parsed.books,
            options,
            progress,
            cancel,
            &mut books,
        )
        .await;

        page += 1;
    }

    if books.is_empty() {
        progress.set_error_if_unset(NO_BOOKS_MESSAGE);
    }
    progress.finish();
    tracing::info!(
        run_id = %progress.run_id(),
        books = books.len(),
        partial = warning.is_some(),
        "scrape finished"
    );

    ScrapeOutcome::Finished { books, warning }
}

#[derive(Debug)]
enum PageError {
    Cancelled,
    Fetch(anyhow::Error),
}

/// Analyzes covers on at most `cover_concurrency` tasks, appending in
/// document order regardless of completion order.
async fn process_rows(
    fetcher: &Arc<dyn Fetch>,
    page_url: &Url,
    rows: Vec<RawBook>,
    options: &ScrapeOptions,
    progress: &RunProgress,
    cancel: &CancellationToken,
    books: &mut Vec<BookRecord>,
) {
    let semaphore = Arc::new(Semaphore::new(options.cover_concurrency.max(1)));

    let pending = rows
        .into_iter()
        .map(|raw| {
            let cover_url = raw
                .cover_image_url
                .as_deref()
                .and_then(|src| resolve_cover_url(page_url, src));
            let fetcher = Arc::clone(fetcher);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let cover_options = options.cover;

            let task = tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                cover::analyze_cover(fetcher.as_ref(), cover_url.as_ref(), cover_options, &cancel)
                    .await
            });
            (raw, task)
        })
        .collect::<Vec<_>>();

    for (raw, task) in pending {
        let colors = task.await.unwrap_or_else(|err| {
            tracing::warn!(title = %raw.title, ?err, "cover task failed");
            CoverColors::fallback()
        });
        tracing::debug!(
            title = %raw.title,
            spine = %colors.spine,
            text = %colors.text,
            "book processed"
        );
        books.push(BookRecord::from_raw(raw, colors));
        progress.set_processed(books.len() as u64);
    }
}

fn resolve_cover_url(page_url: &Url, src: &str) -> Option<Url> {
    match page_url.join(src) {
        Ok(url) => Some(url),
        Err(err) => {
            tracing::warn!(src, %err, "unusable cover url");
            None
        }
    }
}
