use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::orchestrator::{BatchOrchestrator, BatchReport};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub run_count: u64,
    pub success_count: u64,
    pub error_count: u64,
    /// Triggers dropped because the previous batch was still running.
    pub skipped_count: u64,
    pub last_run: Option<DateTime<Utc>>,
    pub last_report: Option<BatchReport>,
    pub last_error: Option<String>,
}

/// Runs the batch job on a cron schedule, never two batches at once.
pub struct BatchScheduler {
    scheduler: JobScheduler,
    orchestrator: Arc<BatchOrchestrator>,
    stats: Arc<RwLock<JobStats>>,
    running: Arc<Mutex<Option<CancellationToken>>>,
    config: SchedulerConfig,
    job_id: Option<Uuid>,
}

impl BatchScheduler {
    pub async fn new(orchestrator: Arc<BatchOrchestrator>, config: SchedulerConfig) -> Result<Self> {
        if !Self::validate_cron_expression(&config.cron) {
            return Err(anyhow::anyhow!("Invalid cron expression: {}", config.cron));
        }

        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            orchestrator,
            stats: Arc::new(RwLock::new(JobStats::default())),
            running: Arc::new(Mutex::new(None)),
            config,
            job_id: None,
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let orchestrator = Arc::clone(&self.orchestrator);
        let stats = Arc::clone(&self.stats);
        let running = Arc::clone(&self.running);

        let job = Job::new_async(self.config.cron.as_str(), move |_uuid, _l| {
            let orchestrator = Arc::clone(&orchestrator);
            let stats = Arc::clone(&stats);
            let running = Arc::clone(&running);

            Box::pin(async move {
                if let Err(e) = Self::execute(orchestrator, stats, running).await {
                    tracing::error!("Scheduled batch failed: {}", e);
                }
            })
        })?;

        self.job_id = Some(self.scheduler.add(job).await?);
        self.scheduler.start().await?;
        tracing::info!("Batch scheduler started with schedule '{}'", self.config.cron);

        if self.config.run_on_start {
            let orchestrator = Arc::clone(&self.orchestrator);
            let stats = Arc::clone(&self.stats);
            let running = Arc::clone(&self.running);
            tokio::spawn(async move {
                if let Err(e) = Self::execute(orchestrator, stats, running).await {
                    tracing::error!("Startup batch failed: {}", e);
                }
            });
        }

        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.cancel_running().await;
        if let Some(job_id) = self.job_id.take() {
            self.scheduler.remove(&job_id).await?;
        }
        self.scheduler.shutdown().await?;
        tracing::info!("Batch scheduler shutdown");
        Ok(())
    }

    /// Run a batch immediately. Returns `None` when a batch is already running.
    pub async fn run_now(&self) -> Result<Option<BatchReport>> {
        Self::execute(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.stats),
            Arc::clone(&self.running),
        )
        .await
    }

    /// Signal the running batch, if any, to stop gathering. Returns whether one was running.
    pub async fn cancel_running(&self) -> bool {
        match self.running.lock().await.as_ref() {
            Some(token) => {
                token.cancel();
                tracing::info!("Cancelling running batch");
                true
            }
            None => false,
        }
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    pub async fn stats(&self) -> JobStats {
        self.stats.read().await.clone()
    }

    async fn execute(
        orchestrator: Arc<BatchOrchestrator>,
        stats: Arc<RwLock<JobStats>>,
        running: Arc<Mutex<Option<CancellationToken>>>,
    ) -> Result<Option<BatchReport>> {
        let token = {
            let mut running = running.lock().await;
            if running.is_some() {
                tracing::warn!("Previous batch still running, skipping this trigger");
                stats.write().await.skipped_count += 1;
                return Ok(None);
            }
            let token = CancellationToken::new();
            *running = Some(token.clone());
            token
        };

        let result = orchestrator.run_with_cancellation(token).await;
        *running.lock().await = None;

        Self::update_stats(&stats, &result).await;
        Ok(Some(result?))
    }

    async fn update_stats(stats: &RwLock<JobStats>, result: &crate::Result<BatchReport>) {
        let mut stats = stats.write().await;
        stats.last_run = Some(Utc::now());
        stats.run_count += 1;

        match result {
            Ok(report) => {
                stats.success_count += 1;
                stats.last_report = Some(report.clone());
                stats.last_error = None;
            }
            Err(e) => {
                stats.error_count += 1;
                stats.last_error = Some(e.to_string());
            }
        }
    }

    /// Validate a cron expression (seconds first, optional trailing year)
    pub fn validate_cron_expression(expression: &str) -> bool {
        let parts: Vec<&str> = expression.split_whitespace().collect();
        if parts.len() != 6 && parts.len() != 7 {
            return false;
        }

        parts.iter().all(|part| {
            part.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '*' | '-' | ',' | '/' | '?'))
        })
    }
}
