use serde::{Deserialize, Serialize};

use crate::cover::CoverColors;
use crate::shelf::RawBook;

/// One scraped book, as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecord {
    pub title: String,
    pub author: String,
    pub publisher: String,
    #[serde(rename = "image")]
    pub cover_image_url: String,
    pub page_count: u32,
    pub rating: Option<String>,
    pub review: String,
    pub spine_color: String,
    pub spine_text_color: String,
}

impl BookRecord {
    pub fn from_raw(raw: RawBook, colors: CoverColors) -> Self {
        Self {
            title: raw.title,
            author: raw.author,
            publisher: raw.publisher,
            cover_image_url: raw.cover_image_url.unwrap_or_default(),
            page_count: raw.page_count,
            rating: raw.rating,
            review: raw.review,
            spine_color: colors.spine.to_hex(),
            spine_text_color: colors.text.to_hex(),
        }
    }
}
