use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::booking::page::BookingPage;
use crate::config::{CaptchaConfig, FormSelectors};
use crate::utils::error::{AppError, Result};

/// How the human-verification step gets satisfied.
pub enum CaptchaResolver {
    /// Wait for someone to solve it in the visible browser window.
    Manual { timeout: Duration, poll_interval: Duration },
    Service(CaptchaService),
}

impl CaptchaResolver {
    pub fn from_config(config: &CaptchaConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let poll_interval = Duration::from_secs(config.poll_interval_secs.max(1));

        if !config.automatic {
            return Ok(CaptchaResolver::Manual { timeout, poll_interval });
        }

        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                AppError::Validation("automatic captcha solving requires an api_key".to_string())
            })?;

        Ok(CaptchaResolver::Service(CaptchaService::new(
            &config.service_url,
            api_key,
            poll_interval,
            timeout,
        )?))
    }

    /// Returns once the page holds a captcha answer. A page without a
    /// captcha widget counts as resolved.
    pub async fn resolve(&self, page: &dyn BookingPage, selectors: &FormSelectors) -> Result<()> {
        if page.count(&selectors.captcha_widget).await? == 0 {
            debug!("No captcha widget on page");
            return Ok(());
        }

        match self {
            CaptchaResolver::Manual { timeout, poll_interval } => {
                info!("Waiting up to {:?} for the captcha to be solved manually", timeout);
                tokio::time::timeout(*timeout, async {
                    loop {
                        let answer = page.value_of(&selectors.captcha_response).await?;
                        if answer.is_some_and(|a| !a.trim().is_empty()) {
                            return Ok::<(), AppError>(());
                        }
                        tokio::time::sleep(*poll_interval).await;
                    }
                })
                .await
                .map_err(|_| AppError::CaptchaTimeout(*timeout))?
            }
            CaptchaResolver::Service(service) => {
                let site_key = page
                    .attribute(&selectors.captcha_widget, "data-sitekey")
                    .await?
                    .ok_or_else(|| AppError::PageStructure {
                        selector: format!("{}[data-sitekey]", selectors.captcha_widget),
                    })?;
                let page_url = page.current_url().await;

                let token = service.solve(&site_key, &page_url).await?;
                page.fill(&selectors.captcha_response, &token).await?;
                info!("Captcha solved by service");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceResponse {
    status: u8,
    request: String,
}

/// Client for 2captcha-compatible solving services (`in.php` / `res.php`).
pub struct CaptchaService {
    client: Client,
    base_url: String,
    api_key: String,
    poll_interval: Duration,
    timeout: Duration,
}

impl CaptchaService {
    pub fn new(
        base_url: &str,
        api_key: String,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(30)).build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval,
            timeout,
        })
    }

    /// Submits a reCAPTCHA task and polls until the token is ready.
    pub async fn solve(&self, site_key: &str, page_url: &str) -> Result<String> {
        let submitted: ServiceResponse = self
            .client
            .get(format!("{}/in.php", self.base_url))
            .query(&[
                ("key", self.api_key.as_str()),
                ("method", "userrecaptcha"),
                ("googlekey", site_key),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .send()
            .await?
            .json()
            .await?;

        if submitted.status != 1 {
            return Err(AppError::Captcha(format!("task rejected: {}", submitted.request)));
        }
        let task_id = submitted.request;
        debug!("Captcha task {} submitted", task_id);

        tokio::time::timeout(self.timeout, self.poll(&task_id))
            .await
            .map_err(|_| AppError::CaptchaTimeout(self.timeout))?
    }

    async fn poll(&self, task_id: &str) -> Result<String> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            let response: ServiceResponse = self
                .client
                .get(format!("{}/res.php", self.base_url))
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("action", "get"),
                    ("id", task_id),
                    ("json", "1"),
                ])
                .send()
                .await?
                .json()
                .await?;

            match (response.status, response.request.as_str()) {
                (1, _) => return Ok(response.request),
                (_, "CAPCHA_NOT_READY") => continue,
                (_, err) => return Err(AppError::Captcha(err.to_string())),
            }
        }
    }
}
