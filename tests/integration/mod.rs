// Integration test helpers for cita-watcher
// These tests run the real HTTP fetcher and captcha client against a local mock server.

pub mod captcha_service_tests;
pub mod http_watcher_tests;

use async_trait::async_trait;
use cita_watcher::plugins::traits::Notifier;
use cita_watcher::{AppConfig, SubscriberId, SubscriberStore};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Configuration pointing at a mock server, with retries fast enough for tests.
pub fn get_test_config(target_url: &str) -> AppConfig {
    let mut config = AppConfig::default();
    config.target.url = target_url.to_string();
    config.target.probe = false;
    config.scraper.retry_attempts = 3;
    config.scraper.retry_delay_ms = 10;
    config.scraper.request_timeout = 5;
    config
}

pub async fn create_test_store(dir: &TempDir, ids: &[i64]) -> Arc<SubscriberStore> {
    let store = SubscriberStore::load(dir.path().join("users.json"))
        .await
        .expect("store loads");
    for id in ids {
        store.subscribe((*id).into()).await.expect("subscribe");
    }
    Arc::new(store)
}

/// Notifier that keeps every message in memory.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(SubscriberId, String)>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(SubscriberId, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_text(&self, recipient: &SubscriberId, text: &str) -> cita_watcher::Result<()> {
        self.sent.lock().unwrap().push((recipient.clone(), text.to_string()));
        Ok(())
    }
}

pub fn availability_page(blocks: &[(&str, &str, &str)]) -> String {
    let body: String = blocks
        .iter()
        .map(|(city, building, dates)| {
            format!(
                r#"<div class="meeting-availability">
                     <span class="city-name">{}</span>
                     <span class="building-name">{}</span>
                     <span class="available-dates">{}</span>
                   </div>"#,
                city, building, dates
            )
        })
        .collect();
    format!("<html><head><title>ICP</title></head><body>{}</body></html>", body)
}
