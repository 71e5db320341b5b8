//! Storage seam for the batch job.
//!
//! The orchestrator reads a snapshot through [`PersistenceGateway`] and
//! writes every mutation of a run through one [`BatchTransaction`], which is
//! either committed as a whole or rolled back.

use async_trait::async_trait;

use crate::models::{PriceUpdate, Subscription, TrackedListing, UnavailableReason};
use crate::utils::error::Result;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryGateway;
pub use sqlite::SqliteGateway;

#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn list_tracked_listings(&self) -> Result<Vec<TrackedListing>>;

    async fn begin(&self) -> Result<Box<dyn BatchTransaction>>;
}

#[async_trait]
pub trait BatchTransaction: Send {
    /// Write the new price state and append one price observation.
    async fn apply_price_update(&mut self, update: &PriceUpdate) -> Result<()>;

    async fn subscribers(&mut self, listing_id: &str) -> Result<Vec<Subscription>>;

    /// Enqueue a notification for one user.
    async fn notify(&mut self, user_id: &str, message: &str) -> Result<()>;

    /// Delete the listing along with its history and subscriptions.
    async fn apply_unavailable(&mut self, listing_id: &str, reason: UnavailableReason) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
