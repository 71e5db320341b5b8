use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{generate_id, PriceUpdate};

/// Append-only price history entry. One is written per successful scrape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceObservation {
    pub id: String,
    pub listing_id: String,
    pub price: Decimal,
    pub timestamp: DateTime<Utc>,
}

impl PriceObservation {
    pub fn new(listing_id: String, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: generate_id(),
            listing_id,
            price,
            timestamp,
        }
    }
}

impl From<&PriceUpdate> for PriceObservation {
    fn from(update: &PriceUpdate) -> Self {
        PriceObservation::new(update.listing_id.clone(), update.price, update.checked_at)
    }
}
