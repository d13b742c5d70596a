//! Shared progress of the current scrape run.
//!
//! [`ProgressBoard`] is the single-writer/multi-reader register pollers read.
//! Only the [`RunProgress`] handed out by [`ProgressBoard::reset`] can write,
//! and only while its run is still the current one.

use std::sync::{Arc, PoisonError, RwLock};

use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub run_id: Option<Uuid>,
    pub total_books: u64,
    pub books_processed: u64,
    pub complete: bool,
    pub error: Option<String>,
}

impl ProgressSnapshot {
    /// Whole percent of processed books, clamped to `0..=100`.
    pub fn percent(&self) -> u32 {
        percent(self.books_processed, self.total_books)
    }
}

pub fn percent(processed: u64, total: u64) -> u32 {
    if total == 0 {
        return 0;
    }
    let pct = u128::from(processed) * 100 / u128::from(total);
    pct.min(100) as u32
}

#[derive(Debug, Clone, Default)]
pub struct ProgressBoard {
    inner: Arc<RwLock<ProgressSnapshot>>,
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a new run: zeroes every field and returns the run's writer.
    ///
    /// Writers of earlier runs stop having any effect.
    pub fn reset(&self) -> RunProgress {
        let run_id = Uuid::new_v4();
        *self.write() = ProgressSnapshot {
            run_id: Some(run_id),
            ..ProgressSnapshot::default()
        };
        tracing::debug!(%run_id, "progress reset");
        RunProgress {
            board: self.clone(),
            run_id,
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ProgressSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Write access to the board for one run.
#[derive(Debug, Clone)]
pub struct RunProgress {
    board: ProgressBoard,
    run_id: Uuid,
}

impl RunProgress {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn update(&self, f: impl FnOnce(&mut ProgressSnapshot)) {
        let mut snapshot = self.board.write();
        if snapshot.run_id != Some(self.run_id) {
            tracing::debug!(run_id = %self.run_id, "ignoring progress write from superseded run");
            return;
        }
        if snapshot.complete {
            return;
        }
        f(&mut *snapshot);
    }

    pub(crate) fn set_total(&self, total: u64) {
        self.update(|s| s.total_books = total);
    }

    pub(crate) fn set_processed(&self, processed: u64) {
        self.update(|s| s.books_processed = s.books_processed.max(processed));
    }

    pub(crate) fn set_error(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| s.error = Some(error));
    }

    pub(crate) fn set_error_if_unset(&self, error: impl Into<String>) {
        let error = error.into();
        self.update(|s| {
            s.error.get_or_insert(error);
        });
    }

    /// Reconciles the total with the processed count and marks the run complete.
    pub(crate) fn finish(&self) {
        self.update(|s| {
            s.total_books = s.total_books.max(s.books_processed);
            s.complete = true;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_is_clamped_and_zero_without_total() {
        assert_eq!(percent(0, 0), 0);
        assert_eq!(percent(5, 0), 0);
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(3, 3), 100);
        assert_eq!(percent(7, 3), 100);
        assert_eq!(percent(u64::MAX, 1), 100);
        for total in 1..50 {
            for processed in 0..100 {
                assert!(percent(processed, total) <= 100);
            }
        }
    }

    #[test]
    fn reset_zeroes_previous_run() {
        let board = ProgressBoard::new();
        let run = board.reset();
        run.set_total(10);
        run.set_processed(4);
        run.set_error("boom");
        run.finish();

        let next = board.reset();
        let snapshot = board.snapshot();
        assert_eq!(snapshot.run_id, Some(next.run_id()));
        assert_eq!(snapshot.total_books, 0);
        assert_eq!(snapshot.books_processed, 0);
        assert!(!snapshot.complete);
        assert_eq!(snapshot.error, None);
    }

    #[test]
    fn superseded_writer_is_ignored() {
        let board = ProgressBoard::new();
        let stale = board.reset();
        let current = board.reset();

        stale.set_total(99);
        stale.set_error("stale");
        stale.finish();
        current.set_processed(2);

        let snapshot = board.snapshot();
        assert_eq!(snapshot.total_books, 0);
        assert_eq!(snapshot.books_processed, 2);
        assert_eq!(snapshot.error, None);
        assert!(!snapshot.complete);
    }

    #[test]
    fn processed_never_decreases() {
        let board = ProgressBoard::new();
        let run = board.reset();
        run.set_processed(5);
        run.set_processed(3);
        assert_eq!(board.snapshot().books_processed, 5);
    }

    #[test]
    fn finish_reconciles_total_and_freezes() {
        let board = ProgressBoard::new();
        let run = board.reset();
        run.set_total(1);
        run.set_processed(4);
        run.finish();
        run.set_processed(9);
        run.set_error("late");

        let snapshot = board.snapshot();
        assert_eq!(snapshot.total_books, 4);
        assert_eq!(snapshot.books_processed, 4);
        assert!(snapshot.complete);
        assert_eq!(snapshot.error, None);
        assert_eq!(snapshot.percent(), 100);
    }

    #[test]
    fn first_error_is_kept_by_if_unset() {
        let board = ProgressBoard::new();
        let run = board.reset();
        run.set_error("Failed page 2.");
        run.set_error_if_unset("No valid books found.");
        assert_eq!(board.snapshot().error.as_deref(), Some("Failed page 2."));
    }
}
