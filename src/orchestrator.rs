//! One batch run: scrape every tracked listing, then apply the outcomes.
//!
//! Scrapes run concurrently and only produce outcomes. All writes happen
//! afterwards, one listing at a time, inside a single transaction that is
//! committed once or rolled back entirely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::models::{
    threshold_message, unavailable_message, FailureCause, ScrapeOutcome, TrackedListing,
};
use crate::persistence::{BatchTransaction, PersistenceGateway};
use crate::resilience::ScrapeEngine;
use crate::utils::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchOptions {
    /// Upper bound on scrapes in flight at once.
    pub max_concurrent: usize,
    /// Deadline for the whole gather phase.
    pub batch_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 8,
            batch_timeout: Duration::from_secs(900),
        }
    }
}

impl BatchOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent: config.scraper.max_concurrent_checks,
            batch_timeout: config.scheduler.batch_timeout(),
        }
    }
}

/// Summary of one committed batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchReport {
    pub listings: usize,
    pub updated: usize,
    pub removed: usize,
    pub failed: usize,
    /// Listings whose scrape was cut off by the batch timeout or cancellation.
    pub unfinished: usize,
    pub notifications: usize,
    pub elapsed_ms: u64,
}

pub struct BatchOrchestrator {
    engine: Arc<ScrapeEngine>,
    gateway: Arc<dyn PersistenceGateway>,
    options: BatchOptions,
}

impl BatchOrchestrator {
    pub fn new(
        engine: Arc<ScrapeEngine>,
        gateway: Arc<dyn PersistenceGateway>,
        options: BatchOptions,
    ) -> Self {
        Self {
            engine,
            gateway,
            options,
        }
    }

    pub async fn run(&self) -> Result<BatchReport> {
        self.run_with_cancellation(CancellationToken::new()).await
    }

    pub async fn run_with_cancellation(&self, cancel: CancellationToken) -> Result<BatchReport> {
        let started = Instant::now();
        let listings = self.gateway.list_tracked_listings().await?;
        tracing::info!("Starting batch for {} tracked listings", listings.len());

        let (outcomes, unfinished) = self.gather(&listings, &cancel).await;

        let mut report = self.apply(&listings, outcomes).await?;
        report.unfinished = unfinished;
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        counter!("batch_runs_total", "result" => "committed").increment(1);
        histogram!("batch_duration_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            "Batch committed: {} updated, {} removed, {} failed, {} notifications in {}ms",
            report.updated,
            report.removed,
            report.failed,
            report.notifications,
            report.elapsed_ms
        );

        Ok(report)
    }

    /// Scrape every listing with bounded concurrency. Outcomes come back in
    /// listing order; listings not finished in time count as transport failures.
    async fn gather(
        &self,
        listings: &[TrackedListing],
        cancel: &CancellationToken,
    ) -> (Vec<ScrapeOutcome>, usize) {
        let mut slots: Vec<Option<ScrapeOutcome>> = vec![None; listings.len()];
        let targets: Vec<(usize, String, String)> = listings
            .iter()
            .enumerate()
            .map(|(index, listing)| (index, listing.url.clone(), listing.source.clone()))
            .collect();

        let engine = Arc::clone(&self.engine);
        let mut scrapes = stream::iter(targets)
            .map(move |(index, url, source)| {
                let engine = Arc::clone(&engine);
                async move { (index, engine.scrape(&url, &source).await) }
            })
            .buffer_unordered(self.options.max_concurrent.max(1));

        let deadline = tokio::time::sleep(self.options.batch_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = scrapes.next() => match next {
                    Some((index, outcome)) => slots[index] = Some(outcome),
                    None => break,
                },
                _ = &mut deadline => {
                    tracing::warn!("Batch timeout of {:?} reached, abandoning remaining scrapes", self.options.batch_timeout);
                    break;
                }
                _ = cancel.cancelled() => {
                    tracing::warn!("Batch cancelled, abandoning remaining scrapes");
                    break;
                }
            }
        }
        drop(scrapes);

        let unfinished = slots.iter().filter(|slot| slot.is_none()).count();
        let outcomes = slots
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| ScrapeOutcome::failure(FailureCause::Transport)))
            .collect();
        (outcomes, unfinished)
    }

    async fn apply(
        &self,
        listings: &[TrackedListing],
        outcomes: Vec<ScrapeOutcome>,
    ) -> Result<BatchReport> {
        let mut tx = self.gateway.begin().await?;
        let mut report = BatchReport {
            listings: listings.len(),
            ..Default::default()
        };
        let checked_at = Utc::now();

        for (listing, outcome) in listings.iter().zip(outcomes) {
            if let Err(e) = apply_outcome(tx.as_mut(), listing, outcome, checked_at, &mut report).await {
                tracing::error!("Rolling back batch after error on listing {}: {}", listing.id, e);
                counter!("batch_runs_total", "result" => "rolled_back").increment(1);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::error!("Rollback failed: {}", rollback_err);
                }
                return Err(e);
            }
        }

        tx.commit().await?;
        Ok(report)
    }
}

async fn apply_outcome(
    tx: &mut dyn BatchTransaction,
    listing: &TrackedListing,
    outcome: ScrapeOutcome,
    checked_at: DateTime<Utc>,
    report: &mut BatchReport,
) -> Result<()> {
    match outcome {
        ScrapeOutcome::Success(scraped) => {
            let update = listing.price_update(&scraped, checked_at);
            tx.apply_price_update(&update).await?;
            report.updated += 1;
            tracing::info!(
                "Updated {} listing {}: {} -> {}",
                listing.source,
                listing.id,
                listing.current_price,
                update.price
            );

            for subscriber in tx.subscribers(&listing.id).await? {
                if let Some(crossing) = subscriber.threshold_crossed(listing.current_price, update.price) {
                    let message = threshold_message(&update.title, update.price, crossing);
                    tx.notify(&subscriber.user_id, &message).await?;
                    report.notifications += 1;
                }
            }
        }
        ScrapeOutcome::Unavailable { reason } => {
            let message = unavailable_message(listing, reason);
            for subscriber in tx.subscribers(&listing.id).await? {
                tx.notify(&subscriber.user_id, &message).await?;
                report.notifications += 1;
            }
            tx.apply_unavailable(&listing.id, reason).await?;
            report.removed += 1;
            tracing::info!("Removed {} listing {} ({})", listing.source, listing.id, reason);
        }
        ScrapeOutcome::Failure { cause } => {
            report.failed += 1;
            tracing::warn!(
                "Leaving listing {} unchanged after failed scrape of {} ({})",
                listing.id,
                listing.url,
                cause
            );
        }
    }
    Ok(())
}
