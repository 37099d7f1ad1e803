use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::watcher::{AvailabilityWatcher, CycleOutcome, CycleReport};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub id: Option<Uuid>,
    pub cron_expression: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub last_run: Option<DateTime<Utc>>,
    pub last_outcome: Option<CycleOutcome>,
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub skipped_count: u64,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Active,
    Error,
    Stopped,
}

/// Single-slot running flag. Holding a [`CycleTicket`] means a cycle is in
/// progress; the flag clears when the ticket drops.
#[derive(Debug, Default)]
pub struct CycleGuard {
    running: AtomicBool,
}

pub struct CycleTicket<'a> {
    guard: &'a CycleGuard,
}

impl CycleGuard {
    pub fn try_acquire(&self) -> Option<CycleTicket<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleTicket { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for CycleTicket<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

pub struct PollScheduler {
    scheduler: JobScheduler,
    watcher: Arc<AvailabilityWatcher>,
    guard: Arc<CycleGuard>,
    job: Arc<RwLock<JobInfo>>,
    config: SchedulerConfig,
}

impl PollScheduler {
    pub async fn new(watcher: Arc<AvailabilityWatcher>, config: SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        let job = JobInfo {
            id: None,
            cron_expression: config.interval.clone(),
            status: JobStatus::Idle,
            created_at: Utc::now(),
            last_run: None,
            last_outcome: None,
            run_count: 0,
            success_count: 0,
            error_count: 0,
            skipped_count: 0,
            last_error: None,
        };

        Ok(Self {
            scheduler,
            watcher,
            guard: Arc::new(CycleGuard::default()),
            job: Arc::new(RwLock::new(job)),
            config,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let watcher = Arc::clone(&self.watcher);
        let guard = Arc::clone(&self.guard);
        let job_info = Arc::clone(&self.job);

        let job = Job::new_async(self.config.interval.as_str(), move |_uuid, _l| {
            let watcher = Arc::clone(&watcher);
            let guard = Arc::clone(&guard);
            let job_info = Arc::clone(&job_info);

            Box::pin(async move {
                Self::execute_cycle(&watcher, &guard, &job_info).await;
            })
        })?;

        let id = self.scheduler.add(job).await?;
        {
            let mut info = self.job.write().await;
            info.id = Some(id);
            info.status = JobStatus::Active;
        }

        self.scheduler.start().await?;
        tracing::info!("Polling scheduler started with interval: {}", self.config.interval);

        if self.config.run_on_start {
            let watcher = Arc::clone(&self.watcher);
            let guard = Arc::clone(&self.guard);
            let job_info = Arc::clone(&self.job);
            tokio::spawn(async move {
                Self::execute_cycle(&watcher, &guard, &job_info).await;
            });
        }

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        self.job.write().await.status = JobStatus::Stopped;
        tracing::info!("Polling scheduler shutdown");
        Ok(())
    }

    /// Runs a cycle now unless one is already in flight.
    pub async fn run_now(&self) -> Option<CycleReport> {
        Self::execute_cycle(&self.watcher, &self.guard, &self.job).await
    }

    pub async fn job_info(&self) -> JobInfo {
        self.job.read().await.clone()
    }

    pub fn is_cycle_running(&self) -> bool {
        self.guard.is_running()
    }

    /// Returns `None` when the invocation was skipped because the previous
    /// cycle had not finished.
    pub async fn execute_cycle(
        watcher: &AvailabilityWatcher,
        guard: &CycleGuard,
        job_info: &RwLock<JobInfo>,
    ) -> Option<CycleReport> {
        let Some(_ticket) = guard.try_acquire() else {
            tracing::warn!("Previous polling cycle still running, skipping this invocation");
            job_info.write().await.skipped_count += 1;
            return None;
        };

        tracing::debug!("Starting scheduled availability check");
        let report = watcher.run_cycle().await;
        Self::update_job_stats(job_info, &report).await;
        Some(report)
    }

    async fn update_job_stats(job_info: &RwLock<JobInfo>, report: &CycleReport) {
        let mut info = job_info.write().await;
        info.last_run = Some(Utc::now());
        info.last_outcome = Some(report.outcome);
        info.run_count += 1;

        if report.is_success() {
            info.success_count += 1;
            info.last_error = None;
            if info.status == JobStatus::Error {
                info.status = JobStatus::Active;
            }
        } else {
            info.error_count += 1;
            info.last_error = report.error.clone();
            if info.status != JobStatus::Stopped {
                info.status = JobStatus::Error;
            }
        }
    }
}
