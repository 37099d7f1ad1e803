use async_trait::async_trait;
use std::time::Duration;

use crate::browser::BrowserSession;
use crate::config::ScraperConfig;
use crate::plugins::fetchers::HttpFetcher;
use crate::plugins::traits::{FetchRequest, FetchedPage, PageFetcher};
use crate::utils::error::Result;

/// Renders the page in headless Chrome. Each fetch gets its own browser
/// process, torn down before the call returns.
pub struct BrowserFetcher {
    config: ScraperConfig,
    // Probing does not need a browser.
    prober: HttpFetcher,
}

impl BrowserFetcher {
    pub fn new(config: ScraperConfig) -> Result<Self> {
        let prober = HttpFetcher::new(&config)?;
        Ok(Self { config, prober })
    }
}

#[async_trait]
impl PageFetcher for BrowserFetcher {
    fn name(&self) -> &str {
        "browser"
    }

    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        self.prober.probe(url, timeout).await
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let config = self.config.clone();
        let request = request.clone();

        tokio::task::spawn_blocking(move || {
            let session = BrowserSession::launch(&config)?;
            let result = session.render(&request);
            session.close();
            result
        })
        .await?
    }
}
