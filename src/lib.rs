#![forbid(unsafe_code)]

pub mod app;
pub mod cli;
pub mod color;
pub mod cover;
pub mod fetch;
pub mod formats;
pub mod logging;
pub mod progress;
pub mod scrape;
pub mod shelf;
