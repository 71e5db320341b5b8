use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, ThresholdCrossing, TrackedListing, UnavailableReason};

/// A queued in-app message for one user. Delivery happens elsewhere.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: generate_id(),
            user_id: user_id.into(),
            message: message.into(),
            is_read: false,
            created_at: Utc::now(),
        }
    }
}

pub fn unavailable_message(listing: &TrackedListing, reason: UnavailableReason) -> String {
    format!(
        "The {} listing for '{}' has been removed because {}.",
        listing.source,
        listing.title,
        reason.describe()
    )
}

pub fn threshold_message(title: &str, price: Decimal, crossing: ThresholdCrossing) -> String {
    match crossing {
        ThresholdCrossing::Below(lower) => format!(
            "'{}' dropped to {}, at or below your target of {}.",
            title, price, lower
        ),
        ThresholdCrossing::Above(upper) => format!(
            "'{}' rose to {}, reaching your limit of {}.",
            title, price, upper
        ),
    }
}
