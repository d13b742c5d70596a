//! Shelf listing pages: URL handling and row extraction.
//!
//! The listing markup is a table with one `tr[id^="review_"]` per book. Every
//! field is optional in practice, so each extractor returns its value or a
//! documented default rather than an error.

use std::sync::LazyLock;

use anyhow::Context as _;
use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use url::Url;

pub const DEFAULT_PAGE_COUNT: u32 = 350;

const SHELF_PATH_PREFIX: &str = "/review/list/";

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|err| panic!("invalid selector {css:?}: {err:?}"))
}

static ROW: LazyLock<Selector> = LazyLock::new(|| selector(r#"tr[id^="review_"]"#));
static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("td.field.title .value a"));
static AUTHOR: LazyLock<Selector> = LazyLock::new(|| selector("td.field.author .value a"));
static COVER: LazyLock<Selector> = LazyLock::new(|| selector("td.field.cover img"));
static PUBLISHER: LazyLock<Selector> = LazyLock::new(|| selector("td.field.publisher .value"));
static PAGE_COUNT: LazyLock<Selector> = LazyLock::new(|| selector("td.field.num_pages .value"));
static RATING: LazyLock<Selector> =
    LazyLock::new(|| selector("td.field.rating .value span.staticStars"));
static REVIEW: LazyLock<Selector> =
    LazyLock::new(|| selector(r#"td.field.review .value span[id^="freeTextContainer"]"#));
static SHELF_HEADER_COUNT: LazyLock<Selector> =
    LazyLock::new(|| selector("#shelfHeader .greyText"));
static SELECTED_SHELF: LazyLock<Selector> = LazyLock::new(|| selector(".selectedShelf"));

static TOTAL_BOOKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"of (\d+) books").expect("valid total books regex"));
static DIGITS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+").expect("valid digits regex"));
static THUMBNAIL_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\._S[XY]?\d+_?\.").expect("valid thumbnail regex"));
static MORE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*\.\.\.\(more\)$").expect("valid more-suffix regex"));

/// A validated shelf listing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShelfUrl {
    url: Url,
}

impl ShelfUrl {
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let url = Url::parse(raw.trim()).context("parse shelf url")?;
        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!("shelf url must be http/https: {url}");
        }
        if url.host_str().is_none() {
            anyhow::bail!("shelf url must have host: {url}");
        }
        if !url.path().starts_with(SHELF_PATH_PREFIX) {
            anyhow::bail!("not a shelf listing url (expected a {SHELF_PATH_PREFIX} path): {url}");
        }
        Ok(Self { url })
    }

    pub fn as_url(&self) -> &Url {
        &self.url
    }

    /// The listing URL for 1-based page `page`, replacing any `page` parameter.
    pub fn page_url(&self, page: u32) -> Url {
        let kept = self
            .url
            .query_pairs()
            .filter(|(name, _)| name != "page")
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect::<Vec<_>>();

        let mut url = self.url.clone();
        url.set_fragment(None);
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .append_pair("page", &page.to_string());
        url
    }
}

/// One book row as found in the listing, before cover analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBook {
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub cover_image_url: Option<String>,
    pub page_count: u32,
    pub rating: Option<String>,
    pub review: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShelfPage {
    pub books: Vec<RawBook>,
    /// Best-effort total number of books on the shelf; 0 when unknown.
    pub total_hint: u32,
    /// Row anchors seen, including rows dropped for missing title/author.
    pub rows_seen: usize,
}

impl ShelfPage {
    /// A page without any row anchors marks the end of the listing.
    pub fn is_end(&self) -> bool {
        self.rows_seen == 0
    }
}

pub fn parse_page(html: &str, default_page_count: u32) -> ShelfPage {
    let document = Html::parse_document(html);
    let rows = document.select(&ROW).collect::<Vec<_>>();

    let books = rows
        .iter()
        .filter_map(|row| parse_row(*row, default_page_count))
        .collect();

    ShelfPage {
        books,
        total_hint: total_books_hint(&document),
        rows_seen: rows.len(),
    }
}

fn parse_row(row: ElementRef<'_>, default_page_count: u32) -> Option<RawBook> {
    let title = first_text(row, &TITLE).filter(|t| !t.is_empty())?;
    let author = first_text(row, &AUTHOR).filter(|a| !a.is_empty())?;

    let cover_image_url = row
        .select(&COVER)
        .next()
        .and_then(|img| img.value().attr("src"))
        .map(str::trim)
        .filter(|src| !src.is_empty())
        .map(high_res_cover_url);

    let page_count = first_text(row, &PAGE_COUNT)
        .and_then(|text| parse_page_count(&text))
        .unwrap_or(default_page_count)
        .max(1);

    let rating = row
        .select(&RATING)
        .next()
        .and_then(|stars| stars.value().attr("title"))
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .map(str::to_owned);

    let review = row
        .select(&REVIEW)
        .next()
        .map(review_text)
        .unwrap_or_default();

    Some(RawBook {
        title,
        author: normalize_author(&author),
        publisher: first_text(row, &PUBLISHER).unwrap_or_default(),
        cover_image_url,
        page_count,
        rating,
        review,
    })
}

fn first_text(scope: ElementRef<'_>, selector: &Selector) -> Option<String> {
    scope
        .select(selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_owned())
}

/// `"Last, First"` becomes `"First Last"`; anything else is kept.
pub fn normalize_author(raw: &str) -> String {
    let raw = raw.trim();
    match raw.split_once(", ") {
        Some((last, first)) => format!("{} {}", first.trim(), last.trim()),
        None => raw.to_owned(),
    }
}

/// Strips the first `._SX<n>_` / `._SY<n>` thumbnail token before the extension.
pub fn high_res_cover_url(raw: &str) -> String {
    THUMBNAIL_SUFFIX_RE.replace(raw, ".").into_owned()
}

/// Digits of a `"1,234 pages"`-style field; `None` when there are none.
pub fn parse_page_count(text: &str) -> Option<u32> {
    let without_separators = text.replace(',', "");
    DIGITS_RE
        .find(&without_separators)
        .and_then(|m| m.as_str().parse::<u32>().ok())
}

/// Joins the container's own text nodes, skipping nested elements.
fn review_text(container: ElementRef<'_>) -> String {
    let joined = container
        .children()
        .filter_map(|node| node.value().as_text().map(|text| &**text))
        .collect::<Vec<&str>>()
        .join(" ");
    strip_more_suffix(joined.trim())
}

pub fn strip_more_suffix(review: &str) -> String {
    MORE_SUFFIX_RE.replace(review, "").into_owned()
}

fn total_books_hint(document: &Html) -> u32 {
    let from_header = document
        .select(&SHELF_HEADER_COUNT)
        .next()
        .map(|el| el.text().collect::<String>())
        .filter(|text| text.contains("books)"))
        .and_then(|text| {
            let text = text.replace(',', "");
            TOTAL_BOOKS_RE
                .captures(&text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .unwrap_or(0);
    if from_header > 0 {
        return from_header;
    }

    document
        .select(&SELECTED_SHELF)
        .next()
        .map(|el| el.text().collect::<String>().replace(',', ""))
        .and_then(|text| {
            DIGITS_RE
                .find(&text)
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .unwrap_or(0)
}
