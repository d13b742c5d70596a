use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::app::model::{MISSING_URL_MESSAGE, ProgressResponse, ScrapeResponse};
use crate::fetch::Fetch;
use crate::progress::ProgressBoard;
use crate::scrape::{self, ScrapeOptions};
use crate::shelf::ShelfUrl;

/// Owns the process-wide progress board and starts scrape runs against it.
pub struct ScrapeRunner {
    fetcher: Arc<dyn Fetch>,
    options: ScrapeOptions,
    progress: ProgressBoard,
    active: Arc<Mutex<Option<ActiveRun>>>,
}

struct ActiveRun {
    run_id: Uuid,
    cancel: CancellationToken,
}

impl ScrapeRunner {
    pub fn new(fetcher: Arc<dyn Fetch>, options: ScrapeOptions) -> Self {
        Self {
            fetcher,
            options,
            progress: ProgressBoard::new(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn progress(&self) -> ProgressResponse {
        self.progress.snapshot().into()
    }

    /// Clears progress without starting a run.
    ///
    /// A run in flight keeps its progress, so pollers still see it complete.
    pub fn reset_progress(&self) {
        let slot = lock_slot(&self.active);
        if let Some(active) = slot.as_ref() {
            tracing::debug!(run_id = %active.run_id, "scrape in flight; progress kept");
            return;
        }
        self.progress.reset();
    }

    /// Cancels the active run, if any. Returns whether one was running.
    pub fn cancel_active(&self) -> bool {
        match lock_slot(&self.active).take() {
            Some(active) => {
                tracing::info!(run_id = %active.run_id, "cancelling scrape run");
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs one scrape to completion and maps the outcome to a response.
    ///
    /// The run executes on its own task, which also releases the active slot,
    /// so it completes (and marks progress complete) if the caller goes away.
    pub async fn scrape(&self, raw_url: Option<&str>) -> (StatusCode, ScrapeResponse) {
        let raw_url = raw_url.map(str::trim).unwrap_or_default();
        if raw_url.is_empty() {
            return (
                StatusCode::BAD_REQUEST,
                ScrapeResponse::error(MISSING_URL_MESSAGE),
            );
        }
        let shelf = match ShelfUrl::parse(raw_url) {
            Ok(shelf) => shelf,
            Err(err) => {
                return (
                    StatusCode::BAD_REQUEST,
                    ScrapeResponse::error(format!("Invalid shelf URL: {err:#}")),
                );
            }
        };

        let cancel = CancellationToken::new();
        let progress = {
            let mut slot = lock_slot(&self.active);
            let progress = self.progress.reset();
            let current = ActiveRun {
                run_id: progress.run_id(),
                cancel: cancel.clone(),
            };
            if let Some(previous) = slot.replace(current) {
                tracing::warn!(run_id = %previous.run_id, "superseding unfinished scrape run");
                previous.cancel.cancel();
            }
            progress
        };
        let run_id = progress.run_id();

        let fetcher = Arc::clone(&self.fetcher);
        let options = self.options.clone();
        let active = Arc::clone(&self.active);
        let joined = tokio::spawn(async move {
            let outcome = scrape::scrape_shelf(fetcher, &shelf, &options, &progress, &cancel).await;
            release_slot(&active, run_id);
            outcome
        })
        .await;

        match joined {
            Ok(outcome) => ScrapeResponse::from_outcome(outcome),
            Err(err) => {
                tracing::error!(%run_id, ?err, "scrape task failed");
                release_slot(&self.active, run_id);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ScrapeResponse::error(format!("scrape task failed: {err}")),
                )
            }
        }
    }
}

fn lock_slot(active: &Mutex<Option<ActiveRun>>) -> MutexGuard<'_, Option<ActiveRun>> {
    active.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Empties the slot unless a newer run has already taken it.
fn release_slot(active: &Mutex<Option<ActiveRun>>, run_id: Uuid) {
    let mut slot = lock_slot(active);
    if slot.as_ref().is_some_and(|run| run.run_id == run_id) {
        *slot = None;
    }
}
