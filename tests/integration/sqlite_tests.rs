use rust_decimal::Decimal;
use std::sync::Arc;

use listing_watcher::config::DatabaseConfig;
use listing_watcher::models::Subscription;
use listing_watcher::persistence::{PersistenceGateway, SqliteGateway};

use super::*;

async fn memory_gateway() -> SqliteGateway {
    SqliteGateway::connect(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
    })
    .await
    .expect("in-memory database")
}

#[tokio::test]
async fn test_batch_against_sqlite() {
    let gateway = memory_gateway().await;
    gateway
        .insert_listing(&tracked_listing("cam", "eBay", 100, 80, 120))
        .await
        .unwrap();
    gateway
        .insert_listing(&tracked_listing("console", "Amazon", 300, 250, 320))
        .await
        .unwrap();
    for user in ["alice", "bob"] {
        gateway
            .subscribe(&Subscription::new(user, "console"))
            .await
            .unwrap();
    }

    let fetcher = ScriptedFetcher::new()
        .page("https://listings.test/cam", ebay_page("Film camera", "75.00"))
        .page("https://listings.test/console", AMAZON_SOLD_OUT_PAGE);
    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));

    let report = orchestrator.run().await.unwrap();
    assert_eq!(report.updated, 1);
    assert_eq!(report.removed, 1);
    assert_eq!(report.notifications, 2);

    let cam = gateway.listing("cam").await.unwrap().unwrap();
    assert_eq!(cam.current_price, Decimal::from(75));
    assert_eq!(cam.lowest_price_ever, Decimal::from(75));
    assert_eq!(cam.highest_price_ever, Decimal::from(120));
    assert_eq!(gateway.observations_for("cam").await.unwrap().len(), 1);

    assert!(gateway.listing("console").await.unwrap().is_none());
    assert!(gateway.subscriptions_for("console").await.unwrap().is_empty());
    assert_eq!(gateway.notifications_for("alice").await.unwrap().len(), 1);
    assert_eq!(gateway.notifications_for("bob").await.unwrap().len(), 1);

    let remaining = gateway.list_tracked_listings().await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_sqlite_rollback_discards_writes() {
    let gateway = memory_gateway().await;
    let listing = tracked_listing("kb", "Amazon", 50, 50, 50);
    gateway.insert_listing(&listing).await.unwrap();

    let mut tx = gateway.begin().await.unwrap();
    let update = listing.price_update(
        &listing_watcher::models::ScrapedListing {
            title: "Keyboard".to_string(),
            price: Decimal::from(45),
            image_url: None,
        },
        chrono::Utc::now(),
    );
    tx.apply_price_update(&update).await.unwrap();
    tx.notify("alice", "price changed").await.unwrap();
    tx.rollback().await.unwrap();

    let stored = gateway.listing("kb").await.unwrap().unwrap();
    assert_eq!(stored.current_price, Decimal::from(50));
    assert!(gateway.observations_for("kb").await.unwrap().is_empty());
    assert!(gateway.notifications_for("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_listing_update_fails() {
    let gateway = memory_gateway().await;
    let listing = tracked_listing("ghost", "eBay", 1, 1, 1);

    let mut tx = gateway.begin().await.unwrap();
    let update = listing.price_update(
        &listing_watcher::models::ScrapedListing {
            title: "Ghost".to_string(),
            price: Decimal::from(2),
            image_url: None,
        },
        chrono::Utc::now(),
    );
    let result = tx.apply_price_update(&update).await;
    assert!(matches!(result, Err(AppError::NotFound { .. })));
    tx.rollback().await.unwrap();
}
