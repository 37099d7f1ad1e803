use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::utils::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    /// Element that marks the page as loaded.
    pub ready_selector: Option<String>,
    pub wait_timeout: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedPage {
    pub url: String,
    pub final_url: String, // After redirects
    pub html: String,
    pub response_time_ms: u64,
}

/// Retrieves a document for extraction, either over plain HTTP or through a
/// rendering browser.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn name(&self) -> &str;

    /// Cheap reachability check with a short timeout.
    async fn probe(&self, url: &str, timeout: Duration) -> bool;

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage>;
}
