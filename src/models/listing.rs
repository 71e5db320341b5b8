use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::ScrapedListing;

/// Snapshot of a monitored listing as stored by the persistence layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackedListing {
    pub id: String,
    pub url: String,
    pub source: String,
    pub title: String,
    pub image_url: Option<String>,
    pub current_price: Decimal,
    pub lowest_price_ever: Decimal,
    pub highest_price_ever: Decimal,
    pub last_checked: DateTime<Utc>,
}

/// Mutation proposed by the apply phase for one successful scrape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceUpdate {
    pub listing_id: String,
    pub title: String,
    pub image_url: Option<String>,
    pub price: Decimal,
    pub lowest_price_ever: Decimal,
    pub highest_price_ever: Decimal,
    pub checked_at: DateTime<Utc>,
}

impl TrackedListing {
    /// Builds the update for a new observed price. Bounds only ever widen.
    pub fn price_update(&self, scraped: &ScrapedListing, checked_at: DateTime<Utc>) -> PriceUpdate {
        PriceUpdate {
            listing_id: self.id.clone(),
            title: scraped.title.clone(),
            image_url: scraped.image_url.clone().or_else(|| self.image_url.clone()),
            price: scraped.price,
            lowest_price_ever: self.lowest_price_ever.min(scraped.price),
            highest_price_ever: self.highest_price_ever.max(scraped.price),
            checked_at,
        }
    }

    /// Applies an update to this snapshot in place.
    pub fn apply(&mut self, update: &PriceUpdate) {
        self.title = update.title.clone();
        self.image_url = update.image_url.clone();
        self.current_price = update.price;
        self.lowest_price_ever = update.lowest_price_ever;
        self.highest_price_ever = update.highest_price_ever;
        self.last_checked = update.checked_at;
    }

    pub fn bounds_hold(&self) -> bool {
        self.lowest_price_ever <= self.current_price && self.current_price <= self.highest_price_ever
    }
}
