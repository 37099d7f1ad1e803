use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, NotificationsConfig, TargetConfig};
use crate::extractor::{AvailabilityEntry, AvailabilityExtractor, format_message};
use crate::plugins::traits::{FetchRequest, Notifier, PageFetcher};
use crate::subscribers::SubscriberStore;
use crate::utils::error::Result;
use crate::utils::retry::{RetryPolicy, retry_with_backoff};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Probe failed; the cycle was skipped.
    Unreachable,
    NoAvailability,
    /// Entries were found but all of them were already announced.
    NothingNew,
    Notified,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub entries_found: usize,
    pub new_entries: usize,
    pub messages_sent: usize,
    pub delivery_failures: usize,
    pub error: Option<String>,
    pub total_time_ms: u64,
}

impl CycleReport {
    fn new(outcome: CycleOutcome) -> Self {
        Self {
            outcome,
            entries_found: 0,
            new_entries: 0,
            messages_sent: 0,
            delivery_failures: 0,
            error: None,
            total_time_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome != CycleOutcome::Failed
    }
}

/// One check-and-notify pass over the target page.
pub struct AvailabilityWatcher {
    fetcher: Arc<dyn PageFetcher>,
    notifier: Arc<dyn Notifier>,
    store: Arc<SubscriberStore>,
    extractor: AvailabilityExtractor,
    target: TargetConfig,
    notifications: NotificationsConfig,
    retry: RetryPolicy,
    wait_timeout: Duration,
    seen: Mutex<HashSet<String>>,
}

impl AvailabilityWatcher {
    pub fn new(
        config: &AppConfig,
        fetcher: Arc<dyn PageFetcher>,
        notifier: Arc<dyn Notifier>,
        store: Arc<SubscriberStore>,
    ) -> Result<Self> {
        Ok(Self {
            fetcher,
            notifier,
            store,
            extractor: AvailabilityExtractor::new(&config.extraction)?,
            target: config.target.clone(),
            notifications: config.notifications.clone(),
            retry: RetryPolicy::from_config(&config.scraper),
            wait_timeout: Duration::from_secs(config.scraper.wait_timeout_secs),
            seen: Mutex::new(HashSet::new()),
        })
    }

    /// Runs a full cycle. Errors are logged and folded into the report so
    /// the caller never has to handle them.
    pub async fn run_cycle(&self) -> CycleReport {
        let start_time = Instant::now();

        let mut report = match self.check().await {
            Ok(report) => report,
            Err(e) => {
                error!("Availability check failed: {}", e);
                let mut report = CycleReport::new(CycleOutcome::Failed);
                report.error = Some(e.to_string());
                report
            }
        };

        report.total_time_ms = start_time.elapsed().as_millis() as u64;
        debug!("Cycle finished: {:?} in {}ms", report.outcome, report.total_time_ms);
        report
    }

    async fn check(&self) -> Result<CycleReport> {
        let url = &self.target.url;

        if self.target.probe {
            let timeout = Duration::from_secs(self.target.probe_timeout_secs);
            if !self.fetcher.probe(url, timeout).await {
                warn!("Target {} unreachable, skipping cycle", url);
                return Ok(CycleReport::new(CycleOutcome::Unreachable));
            }
        }

        let request = FetchRequest {
            url: url.clone(),
            ready_selector: self.target.ready_selector.clone(),
            wait_timeout: self.wait_timeout,
        };

        let label = format!("{} fetch of {}", self.fetcher.name(), url);
        let page =
            retry_with_backoff(self.retry, &label, || self.fetcher.fetch_page(&request)).await?;
        debug!(
            "Fetched {} ({} bytes) in {}ms",
            page.final_url,
            page.html.len(),
            page.response_time_ms
        );

        let entries = self.extractor.extract(&page.html);
        let mut report = CycleReport::new(CycleOutcome::NoAvailability);
        report.entries_found = entries.len();

        let fresh = self.filter_new(entries).await;
        if report.entries_found == 0 {
            info!("No availability found");
            return Ok(report);
        }

        report.new_entries = fresh.len();
        if fresh.is_empty() {
            info!("{} entries found, all already announced", report.entries_found);
            report.outcome = CycleOutcome::NothingNew;
            return Ok(report);
        }

        info!("{} new availability entries found", fresh.len());
        let message = format_message(&self.notifications.header, &fresh);
        let (sent, failed) = self.broadcast(&message).await;
        if sent > 0 {
            self.mark_seen(&fresh).await;
        } else {
            warn!("No subscriber received the update, it will be sent again next cycle");
        }

        report.outcome = CycleOutcome::Notified;
        report.messages_sent = sent;
        report.delivery_failures = failed;
        Ok(report)
    }

    /// Drops fingerprints no longer on the page, so an entry that comes back
    /// is announced again, then returns the entries not yet announced.
    async fn filter_new(&self, entries: Vec<AvailabilityEntry>) -> Vec<AvailabilityEntry> {
        if !self.notifications.deduplicate {
            return entries;
        }
        let current: HashSet<String> = entries.iter().map(AvailabilityEntry::fingerprint).collect();
        let mut seen = self.seen.lock().await;
        seen.retain(|fingerprint| current.contains(fingerprint));

        entries
            .into_iter()
            .filter(|entry| !seen.contains(&entry.fingerprint()))
            .collect()
    }

    async fn mark_seen(&self, entries: &[AvailabilityEntry]) {
        if !self.notifications.deduplicate {
            return;
        }
        let mut seen = self.seen.lock().await;
        seen.extend(entries.iter().map(AvailabilityEntry::fingerprint));
    }

    /// Sends `text` to every subscriber; returns (delivered, failed).
    pub async fn broadcast(&self, text: &str) -> (usize, usize) {
        let recipients = self.store.snapshot().await;
        let mut sent = 0;
        let mut failed = 0;

        for recipient in &recipients {
            match self.notifier.send_text(recipient, text).await {
                Ok(()) => sent += 1,
                Err(e) => {
                    failed += 1;
                    warn!("Delivery to {} failed: {}", recipient, e);
                }
            }
        }

        info!("Notified {}/{} subscribers", sent, recipients.len());
        (sent, failed)
    }
}
