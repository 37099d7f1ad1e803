use async_trait::async_trait;
use reqwest::{Client, Proxy};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::ScraperConfig;
use crate::extractor::{contains_element, parse_selector};
use crate::plugins::traits::{FetchRequest, FetchedPage, PageFetcher};
use crate::utils::error::{AppError, Result};

/// Plain GET of the target page. No JavaScript is executed, so the ready
/// marker has to be present in the served HTML.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.request_timeout));

        if let Some(proxy) = &config.proxy {
            builder = builder.proxy(Proxy::all(proxy)?);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn probe(&self, url: &str, timeout: Duration) -> bool {
        match self.client.head(url).timeout(timeout).send().await {
            Ok(response) => !response.status().is_server_error(),
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }

    async fn fetch_page(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let start_time = Instant::now();

        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|e| AppError::Fetch {
                url: request.url.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Fetch {
                url: request.url.clone(),
                message: format!("unexpected status {}", status),
            });
        }

        let final_url = response.url().to_string();
        let html = response.text().await.map_err(|e| AppError::Fetch {
            url: request.url.clone(),
            message: format!("failed to read body: {}", e),
        })?;

        if let Some(ready) = &request.ready_selector {
            let selector = parse_selector(ready)?;
            if !contains_element(&html, &selector) {
                return Err(AppError::PageStructure {
                    selector: ready.clone(),
                });
            }
        }

        Ok(FetchedPage {
            url: request.url.clone(),
            final_url,
            html,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }
}
