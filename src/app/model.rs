use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::formats::BookRecord;
use crate::progress::ProgressSnapshot;
use crate::scrape::ScrapeOutcome;

pub const MISSING_URL_MESSAGE: &str = "Missing URL parameter";
pub const EMPTY_SHELF_MESSAGE: &str = "No books found on shelf.";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScrapeQuery {
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeResponse {
    pub books: Vec<BookRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_found: Option<usize>,
}

impl ScrapeResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            books: Vec::new(),
            error: Some(message.into()),
            total_found: None,
        }
    }

    /// HTTP status and body for a finished run.
    pub fn from_outcome(outcome: ScrapeOutcome) -> (StatusCode, Self) {
        match outcome {
            ScrapeOutcome::Fatal { error } => {
                (StatusCode::INTERNAL_SERVER_ERROR, Self::error(error))
            }
            ScrapeOutcome::Finished { books, warning } if books.is_empty() => (
                StatusCode::NOT_FOUND,
                Self::error(warning.unwrap_or_else(|| EMPTY_SHELF_MESSAGE.to_string())),
            ),
            ScrapeOutcome::Finished { books, warning } => {
                let total_found = Some(books.len());
                (
                    StatusCode::OK,
                    Self {
                        books,
                        error: warning.map(|w| format!("Warning: {w}")),
                        total_found,
                    },
                )
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub progress: u32,
    pub books_processed: u64,
    pub total_books: u64,
    pub complete: bool,
    pub error: Option<String>,
    pub run_id: Option<Uuid>,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            progress: snapshot.percent(),
            books_processed: snapshot.books_processed,
            total_books: snapshot.total_books,
            complete: snapshot.complete,
            error: snapshot.error,
            run_id: snapshot.run_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}
