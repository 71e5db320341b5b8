use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{BatchTransaction, PersistenceGateway};
use crate::models::{
    Notification, PriceObservation, PriceUpdate, Subscription, TrackedListing, UnavailableReason,
};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Default)]
struct Store {
    listings: Vec<TrackedListing>,
    observations: Vec<PriceObservation>,
    subscriptions: Vec<Subscription>,
    notifications: Vec<Notification>,
}

/// One write recorded by a transaction, replayed onto the shared store at commit.
#[derive(Debug, Clone)]
enum Change {
    Price(PriceUpdate),
    Notify(Notification),
    Remove(String),
}

impl Store {
    fn apply(&mut self, change: &Change) -> Result<()> {
        match change {
            Change::Price(update) => {
                let listing = self
                    .listings
                    .iter_mut()
                    .find(|l| l.id == update.listing_id)
                    .ok_or_else(|| AppError::NotFound {
                        resource: format!("listing {}", update.listing_id),
                    })?;
                listing.apply(update);
                self.observations.push(PriceObservation::from(update));
            }
            Change::Notify(notification) => self.notifications.push(notification.clone()),
            Change::Remove(listing_id) => {
                let before = self.listings.len();
                self.listings.retain(|l| &l.id != listing_id);
                if self.listings.len() == before {
                    return Err(AppError::NotFound {
                        resource: format!("listing {}", listing_id),
                    });
                }
                self.observations.retain(|o| &o.listing_id != listing_id);
                self.subscriptions.retain(|s| &s.listing_id != listing_id);
            }
        }
        Ok(())
    }
}

/// Process-local gateway for dry runs and tests.
///
/// A transaction stages its writes on a private copy of the store and records
/// them. Commit replays the recorded writes onto the current shared state, so
/// rows inserted while the batch ran survive, and a rolled back batch leaves
/// nothing behind.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<Mutex<Store>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_listing(&self, listing: TrackedListing) {
        self.state.lock().await.listings.push(listing);
    }

    pub async fn subscribe(&self, subscription: Subscription) {
        self.state.lock().await.subscriptions.push(subscription);
    }

    pub async fn listings(&self) -> Vec<TrackedListing> {
        self.state.lock().await.listings.clone()
    }

    pub async fn listing(&self, id: &str) -> Option<TrackedListing> {
        let state = self.state.lock().await;
        state.listings.iter().find(|l| l.id == id).cloned()
    }

    pub async fn observations_for(&self, listing_id: &str) -> Vec<PriceObservation> {
        let state = self.state.lock().await;
        state
            .observations
            .iter()
            .filter(|o| o.listing_id == listing_id)
            .cloned()
            .collect()
    }

    pub async fn subscriptions_for(&self, listing_id: &str) -> Vec<Subscription> {
        let state = self.state.lock().await;
        state
            .subscriptions
            .iter()
            .filter(|s| s.listing_id == listing_id)
            .cloned()
            .collect()
    }

    pub async fn notifications(&self) -> Vec<Notification> {
        self.state.lock().await.notifications.clone()
    }
}

#[async_trait]
impl PersistenceGateway for InMemoryGateway {
    async fn list_tracked_listings(&self) -> Result<Vec<TrackedListing>> {
        Ok(self.listings().await)
    }

    async fn begin(&self) -> Result<Box<dyn BatchTransaction>> {
        let working = self.state.lock().await.clone();
        Ok(Box::new(InMemoryTransaction {
            shared: Arc::clone(&self.state),
            working,
            changes: Vec::new(),
        }))
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Mutex<Store>>,
    working: Store,
    changes: Vec<Change>,
}

impl InMemoryTransaction {
    fn stage(&mut self, change: Change) -> Result<()> {
        self.working.apply(&change)?;
        self.changes.push(change);
        Ok(())
    }
}

#[async_trait]
impl BatchTransaction for InMemoryTransaction {
    async fn apply_price_update(&mut self, update: &PriceUpdate) -> Result<()> {
        self.stage(Change::Price(update.clone()))
    }

    async fn subscribers(&mut self, listing_id: &str) -> Result<Vec<Subscription>> {
        Ok(self
            .working
            .subscriptions
            .iter()
            .filter(|s| s.listing_id == listing_id)
            .cloned()
            .collect())
    }

    async fn notify(&mut self, user_id: &str, message: &str) -> Result<()> {
        self.stage(Change::Notify(Notification::new(user_id, message)))
    }

    async fn apply_unavailable(&mut self, listing_id: &str, reason: UnavailableReason) -> Result<()> {
        self.stage(Change::Remove(listing_id.to_string()))?;
        tracing::debug!("Removed listing {} ({})", listing_id, reason);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut shared = self.shared.lock().await;
        let mut next = shared.clone();
        for change in &self.changes {
            next.apply(change)?;
        }
        *shared = next;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
