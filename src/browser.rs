use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::config::ScraperConfig;
use crate::plugins::traits::fetcher::{FetchRequest, FetchedPage};
use crate::utils::error::{AppError, Result};

/// One Chrome process with a single tab. All calls block, so callers run
/// them on the blocking pool. The process is killed when the session is
/// dropped.
pub struct BrowserSession {
    // Kept alive for the tab's sake.
    _browser: Browser,
    tab: Arc<Tab>,
}

impl BrowserSession {
    pub fn launch(config: &ScraperConfig) -> Result<Self> {
        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .sandbox(false) // Often needed in containerized environments
            .idle_browser_timeout(Duration::from_secs(config.request_timeout.max(60) * 10))
            .args(vec![
                OsStr::new("--no-sandbox"),
                OsStr::new("--disable-dev-shm-usage"),
                OsStr::new("--disable-gpu"),
                OsStr::new("--disable-extensions"),
                OsStr::new("--disable-background-timer-throttling"),
                OsStr::new("--disable-renderer-backgrounding"),
            ])
            .build()
            .map_err(|e| AppError::Browser(format!("Failed to create launch options: {}", e)))?;

        if let Some(chrome_path) = &config.chrome_path {
            launch_options.path = Some(PathBuf::from(chrome_path));
        }
        launch_options.proxy_server = config.proxy.as_deref();

        let browser = Browser::new(launch_options)
            .map_err(|e| AppError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| AppError::Browser(format!("Failed to create tab: {}", e)))?;

        tab.set_user_agent(&config.user_agent, None, None)
            .map_err(|e| AppError::Browser(format!("Failed to set user agent: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.request_timeout));

        debug!("Browser session started");
        Ok(Self { _browser: browser, tab })
    }

    pub fn tab(&self) -> Arc<Tab> {
        Arc::clone(&self.tab)
    }

    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab
            .navigate_to(url)
            .map_err(|e| AppError::Fetch {
                url: url.to_string(),
                message: format!("Navigation failed: {}", e),
            })?
            .wait_until_navigated()
            .map_err(|e| AppError::Fetch {
                url: url.to_string(),
                message: format!("Page load failed: {}", e),
            })?;
        Ok(())
    }

    pub fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        self.tab
            .wait_for_element_with_custom_timeout(selector, timeout)
            .map(|_| ())
            .map_err(|_| AppError::Timeout(timeout, selector.to_string()))
    }

    /// Loads `request.url` and returns the rendered document once the ready
    /// marker shows up.
    pub fn render(&self, request: &FetchRequest) -> Result<FetchedPage> {
        let start_time = Instant::now();

        self.navigate(&request.url)?;

        if let Some(ready) = &request.ready_selector {
            self.wait_for(ready, request.wait_timeout)?;
        }

        let html = self
            .tab
            .get_content()
            .map_err(|e| AppError::Browser(format!("Failed to get page content: {}", e)))?;

        let final_url = {
            let url = self.tab.get_url();
            if url.is_empty() { request.url.clone() } else { url }
        };

        Ok(FetchedPage {
            url: request.url.clone(),
            final_url,
            html,
            response_time_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    pub fn close(self) {
        if let Err(e) = self.tab.close(true) {
            warn!("Failed to close browser tab cleanly: {}", e);
        }
        debug!("Browser session closed");
    }
}

/// Writes a PNG of the current viewport into `dir`. Blocking.
pub fn capture_screenshot(tab: &Tab, dir: &Path) -> Result<PathBuf> {
    let data = tab
        .capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )
        .map_err(|e| AppError::Browser(format!("Screenshot capture failed: {}", e)))?;

    let path = screenshot_path(dir)?;
    std::fs::write(&path, data)?;
    Ok(path)
}

/// Creates `dir` if needed and returns a fresh file name inside it.
fn screenshot_path(dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    Ok(dir.join(format!(
        "booking_{}_{}.png",
        timestamp,
        uuid::Uuid::new_v4().simple()
    )))
}
