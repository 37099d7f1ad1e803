// Page fetcher implementations
pub mod browser;
pub mod http;

pub use browser::BrowserFetcher;
pub use http::HttpFetcher;

use std::sync::Arc;

use crate::config::{FetchMode, ScraperConfig};
use crate::plugins::traits::PageFetcher;
use crate::utils::error::Result;

pub fn from_config(config: &ScraperConfig) -> Result<Arc<dyn PageFetcher>> {
    Ok(match config.mode {
        FetchMode::Http => Arc::new(HttpFetcher::new(config)?),
        FetchMode::Browser => Arc::new(BrowserFetcher::new(config.clone())?),
    })
}
