use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{FailureCause, UnavailableReason};

/// Fields extracted from a listing page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScrapedListing {
    pub title: String,
    pub price: Decimal,
    pub image_url: Option<String>,
}

/// Terminal result of scraping one listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScrapeOutcome {
    Success(ScrapedListing),
    Unavailable { reason: UnavailableReason },
    Failure { cause: FailureCause },
}

impl ScrapeOutcome {
    pub fn failure(cause: FailureCause) -> Self {
        ScrapeOutcome::Failure { cause }
    }

    pub fn unavailable(reason: UnavailableReason) -> Self {
        ScrapeOutcome::Unavailable { reason }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success(_))
    }

    /// Short label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeOutcome::Success(_) => "success",
            ScrapeOutcome::Unavailable { .. } => "unavailable",
            ScrapeOutcome::Failure { .. } => "failure",
        }
    }
}
