use async_trait::async_trait;
use headless_chrome::Tab;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::warn;

use crate::browser::{BrowserSession, capture_screenshot};
use crate::config::ScraperConfig;
use crate::utils::error::{AppError, Result};

/// The browser operations the booking flow needs. Selectors are CSS.
#[async_trait]
pub trait BookingPage: Send + Sync {
    async fn open(&self, url: &str) -> Result<()>;
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()>;
    /// Blocks until the navigation triggered by the previous action settles.
    async fn wait_for_load(&self) -> Result<()>;
    async fn select_option(&self, selector: &str, value: &str) -> Result<()>;
    /// Clicks the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;
    async fn fill(&self, selector: &str, value: &str) -> Result<()>;
    async fn count(&self, selector: &str) -> Result<usize>;
    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;
    async fn value_of(&self, selector: &str) -> Result<Option<String>>;
    async fn current_url(&self) -> String;
    async fn screenshot(&self, dir: &Path) -> Result<PathBuf>;
    /// Releases the browser. Safe to call more than once.
    async fn close(&self);
}

/// [`BookingPage`] backed by a headless Chrome session.
pub struct ChromePage {
    session: Mutex<Option<BrowserSession>>,
    tab: Arc<Tab>,
}

impl ChromePage {
    pub async fn launch(config: ScraperConfig) -> Result<Self> {
        let session = tokio::task::spawn_blocking(move || BrowserSession::launch(&config)).await??;
        let tab = session.tab();
        Ok(Self {
            session: Mutex::new(Some(session)),
            tab,
        })
    }

    async fn on_tab<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Tab) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab)).await?
    }

    async fn eval(&self, js: String) -> Result<serde_json::Value> {
        self.on_tab(move |tab| {
            let result = tab
                .evaluate(&js, false)
                .map_err(|e| AppError::Browser(format!("Script evaluation failed: {}", e)))?;
            Ok(result.value.unwrap_or(serde_json::Value::Null))
        })
        .await
    }
}

fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn browser_err(action: &str, selector: &str, e: impl std::fmt::Display) -> AppError {
    AppError::Browser(format!("{} {} failed: {}", action, selector, e))
}

#[async_trait]
impl BookingPage for ChromePage {
    async fn open(&self, url: &str) -> Result<()> {
        let url = url.to_string();
        self.on_tab(move |tab| {
            tab.navigate_to(&url)
                .and_then(|tab| tab.wait_until_navigated())
                .map(|_| ())
                .map_err(|e| AppError::Fetch {
                    url: url.clone(),
                    message: e.to_string(),
                })
        })
        .await
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<()> {
        let selector = selector.to_string();
        self.on_tab(move |tab| {
            tab.wait_for_element_with_custom_timeout(&selector, timeout)
                .map(|_| ())
                .map_err(|_| AppError::Timeout(timeout, selector.clone()))
        })
        .await
    }

    async fn wait_for_load(&self) -> Result<()> {
        self.on_tab(|tab| {
            tab.wait_until_navigated()
                .map(|_| ())
                .map_err(|e| AppError::Browser(format!("Page load failed: {}", e)))
        })
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<()> {
        let js = format!(
            "(function() {{ const el = document.querySelector({}); if (!el) return false; \
             el.value = {}; el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
             return el.value === {1}; }})()",
            js_str(selector),
            js_str(value)
        );
        match self.eval(js).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(AppError::PageStructure {
                selector: format!("{} option {}", selector, value),
            }),
        }
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let selector = selector.to_string();
        self.on_tab(move |tab| {
            tab.find_element(&selector)
                .map_err(|_| AppError::PageStructure {
                    selector: selector.clone(),
                })?
                .click()
                .map(|_| ())
                .map_err(|e| browser_err("Click on", &selector, e))
        })
        .await
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<()> {
        let js = format!(
            "(function() {{ const el = document.querySelector({}); if (!el) return false; \
             el.value = {}; el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             return true; }})()",
            js_str(selector),
            js_str(value)
        );
        match self.eval(js).await? {
            serde_json::Value::Bool(true) => Ok(()),
            _ => Err(AppError::PageStructure {
                selector: selector.to_string(),
            }),
        }
    }

    async fn count(&self, selector: &str) -> Result<usize> {
        let js = format!("document.querySelectorAll({}).length", js_str(selector));
        Ok(self.eval(js).await?.as_u64().unwrap_or(0) as usize)
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let js = format!(
            "(function() {{ const el = document.querySelector({}); \
             return el ? el.getAttribute({}) : null; }})()",
            js_str(selector),
            js_str(name)
        );
        Ok(self.eval(js).await?.as_str().map(str::to_string))
    }

    async fn value_of(&self, selector: &str) -> Result<Option<String>> {
        let js = format!(
            "(function() {{ const el = document.querySelector({}); \
             return el ? el.value : null; }})()",
            js_str(selector)
        );
        Ok(self.eval(js).await?.as_str().map(str::to_string))
    }

    async fn current_url(&self) -> String {
        self.tab.get_url()
    }

    async fn screenshot(&self, dir: &Path) -> Result<PathBuf> {
        let open = self
            .session
            .lock()
            .map(|guard| guard.is_some())
            .map_err(|_| AppError::Internal("browser session lock poisoned".to_string()))?;
        if !open {
            return Err(AppError::Browser("browser session already closed".to_string()));
        }

        let dir = dir.to_path_buf();
        self.on_tab(move |tab| capture_screenshot(tab, &dir)).await
    }

    async fn close(&self) {
        let session = match self.session.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        if let Some(session) = session {
            if let Err(e) = tokio::task::spawn_blocking(move || session.close()).await {
                warn!("Closing browser session failed: {}", e);
            }
        }
    }
}
