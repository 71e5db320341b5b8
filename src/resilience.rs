//! Bounded retry loop around one fetch + parse attempt.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use rand::Rng;
use scraper::Html;

use crate::config::{AppConfig, ScraperConfig};
use crate::models::{FailureCause, ScrapeOutcome, ScrapedListing};
use crate::plugins::parsers::selectors::visible_text;
use crate::plugins::SourceRegistry;
use crate::transport::{Fetcher, HttpFetcher, IdentityPool};
use crate::utils::error::AppError;

const CHALLENGE_MARKER: &str = "captcha";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &ScraperConfig) -> Self {
        Self::new(config.retry_attempts, config.base_delay())
    }

    /// Delay after the zero-based `attempt`: `base * 2^attempt` plus up to
    /// `base` of jitter, doubled when the page was an anti-bot challenge.
    pub fn backoff(&self, attempt: u32, challenge: bool) -> Duration {
        let exponential = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(attempt));
        let base_ms = u64::try_from(self.base_delay.as_millis()).unwrap_or(u64::MAX);
        let jitter = Duration::from_millis(rand::rng().random_range(0..=base_ms));

        let delay = exponential.saturating_add(jitter);
        if challenge {
            delay.saturating_mul(2)
        } else {
            delay
        }
    }
}

/// Outcome of one scrape together with how much retrying it took.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapeReport {
    pub outcome: ScrapeOutcome,
    pub attempts: u32,
    pub total_backoff: Duration,
}

impl ScrapeReport {
    fn immediate(outcome: ScrapeOutcome) -> Self {
        Self {
            outcome,
            attempts: 0,
            total_backoff: Duration::ZERO,
        }
    }
}

/// True when the visible page text carries an anti-bot challenge marker.
pub fn is_challenge_page(body: &str) -> bool {
    let html = Html::parse_document(body);
    visible_text(&html).to_lowercase().contains(CHALLENGE_MARKER)
}

pub struct ScrapeEngine {
    fetcher: Arc<dyn Fetcher>,
    registry: Arc<SourceRegistry>,
    identities: IdentityPool,
    policy: RetryPolicy,
}

impl ScrapeEngine {
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        registry: Arc<SourceRegistry>,
        identities: IdentityPool,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            fetcher,
            registry,
            identities,
            policy,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, AppError> {
        let fetcher = HttpFetcher::new(&config.scraper, config.proxy.as_ref())?;
        let registry = SourceRegistry::with_default_parsers(&config.selectors)?;

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(registry),
            IdentityPool::from_config(config),
            RetryPolicy::from_config(&config.scraper),
        ))
    }

    /// Scrape with the configured retry policy.
    pub async fn scrape(&self, url: &str, source: &str) -> ScrapeOutcome {
        self.scrape_with(url, source, &self.policy).await.outcome
    }

    pub async fn scrape_with(&self, url: &str, source: &str, policy: &RetryPolicy) -> ScrapeReport {
        let parser = match self.registry.resolve(source) {
            Ok(parser) => parser,
            Err(e) => {
                tracing::warn!("Refusing to scrape {}: {}", url, e);
                counter!("scrape_outcomes_total", "outcome" => "unknown_source").increment(1);
                return ScrapeReport::immediate(ScrapeOutcome::failure(FailureCause::UnknownSource));
            }
        };

        let mut attempts = 0;
        let mut total_backoff = Duration::ZERO;
        let mut last_cause = FailureCause::Transport;

        for attempt in 0..policy.max_attempts {
            attempts = attempt + 1;
            counter!("scrape_attempts_total").increment(1);
            let identity = self.identities.choose();
            tracing::debug!(
                "Attempt {}/{} for {} as '{}'",
                attempts,
                policy.max_attempts,
                url,
                identity.user_agent
            );

            let challenge = match self.fetcher.fetch(url, &identity).await {
                Ok(body) if is_challenge_page(&body) => {
                    tracing::warn!("Anti-bot challenge served for {} (attempt {})", url, attempts);
                    counter!("scrape_challenges_total").increment(1);
                    last_cause = FailureCause::AntiBot;
                    true
                }
                Ok(body) => match parser.parse(&body) {
                    ScrapeOutcome::Failure { cause } if cause.is_retryable() => {
                        tracing::warn!("Could not parse {} (attempt {}): {}", url, attempts, cause);
                        last_cause = cause;
                        false
                    }
                    outcome => {
                        counter!("scrape_outcomes_total", "outcome" => outcome.kind()).increment(1);
                        return ScrapeReport {
                            outcome,
                            attempts,
                            total_backoff,
                        };
                    }
                },
                Err(e) => {
                    tracing::warn!("Fetch failed for {} (attempt {}): {}", url, attempts, e);
                    last_cause = FailureCause::Transport;
                    false
                }
            };

            if attempts < policy.max_attempts {
                let delay = policy.backoff(attempt, challenge);
                tracing::debug!("Backing off {:?} before retrying {}", delay, url);
                tokio::time::sleep(delay).await;
                total_backoff += delay;
            }
        }

        tracing::warn!(
            "Giving up on {} after {} attempts ({})",
            url,
            attempts,
            last_cause
        );
        counter!("scrape_outcomes_total", "outcome" => "failure").increment(1);

        ScrapeReport {
            outcome: ScrapeOutcome::failure(last_cause),
            attempts,
            total_backoff,
        }
    }

    /// Single-listing check for interactive callers: anything other than a
    /// successful scrape becomes an error.
    pub async fn check_listing(&self, url: &str, source: &str) -> Result<ScrapedListing, AppError> {
        match self.scrape(url, source).await {
            ScrapeOutcome::Success(listing) => Ok(listing),
            ScrapeOutcome::Unavailable { reason } => Err(AppError::Unavailable(reason)),
            ScrapeOutcome::Failure {
                cause: FailureCause::UnknownSource,
            } => Err(AppError::UnknownSource {
                name: source.to_string(),
            }),
            ScrapeOutcome::Failure { cause } => Err(AppError::Scraping(format!(
                "could not read listing at {} ({})",
                url, cause
            ))),
        }
    }
}
