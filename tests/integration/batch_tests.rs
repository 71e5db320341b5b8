use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use listing_watcher::models::Subscription;
use listing_watcher::orchestrator::{BatchOptions, BatchOrchestrator};
use listing_watcher::persistence::InMemoryGateway;

use super::*;

#[tokio::test]
async fn test_new_low_widens_lower_bound() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("cam", "eBay", 100, 80, 120), &[]).await;
    let fetcher = ScriptedFetcher::new().page("https://listings.test/cam", ebay_page("Film camera", "75.00"));

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));
    let report = orchestrator.run().await.unwrap();

    let listing = gateway.listing("cam").await.unwrap();
    assert_eq!(listing.current_price, Decimal::from(75));
    assert_eq!(listing.lowest_price_ever, Decimal::from(75));
    assert_eq!(listing.highest_price_ever, Decimal::from(120));
    assert_eq!(listing.title, "Film camera");
    assert!(listing.bounds_hold());

    let observations = gateway.observations_for("cam").await;
    assert_eq!(observations.len(), 1);
    assert_eq!(observations[0].price, Decimal::from(75));
    assert_eq!(report.updated, 1);
}

#[tokio::test]
async fn test_sold_out_notifies_every_subscriber_and_deletes() {
    let gateway = InMemoryGateway::new();
    seed(
        &gateway,
        tracked_listing("console", "Amazon", 300, 250, 320),
        &["alice", "bob"],
    )
    .await;
    let fetcher = ScriptedFetcher::new().page("https://listings.test/console", AMAZON_SOLD_OUT_PAGE);

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));
    let report = orchestrator.run().await.unwrap();

    let notifications = gateway.notifications().await;
    assert_eq!(notifications.len(), 2);
    let mut recipients: Vec<_> = notifications.iter().map(|n| n.user_id.as_str()).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["alice", "bob"]);
    assert!(notifications[0].message.contains("has been removed because it has sold out"));

    assert!(gateway.listing("console").await.is_none());
    assert!(gateway.observations_for("console").await.is_empty());
    assert!(gateway.subscriptions_for("console").await.is_empty());
    assert_eq!(report.removed, 1);
    assert_eq!(report.notifications, 2);
}

#[tokio::test]
async fn test_ended_listing_is_removed() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("lens", "eBay", 90, 90, 90), &["carol"]).await;
    let fetcher = ScriptedFetcher::new().page("https://listings.test/lens", EBAY_ENDED_PAGE);

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));
    orchestrator.run().await.unwrap();

    assert!(gateway.listing("lens").await.is_none());
    let notifications = gateway.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert!(notifications[0].message.contains("the listing has ended"));
}

#[tokio::test]
async fn test_unchanged_price_still_appends_observation() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("kb", "Amazon", 50, 50, 50), &[]).await;
    let fetcher = ScriptedFetcher::new().page("https://listings.test/kb", amazon_page("Keyboard", "50", "00"));

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));
    orchestrator.run().await.unwrap();
    orchestrator.run().await.unwrap();

    let observations = gateway.observations_for("kb").await;
    assert_eq!(observations.len(), 2);
    assert!(observations.iter().all(|o| o.price == Decimal::from(50)));
}

#[tokio::test]
async fn test_retry_exhaustion_leaves_listing_untouched() {
    let gateway = InMemoryGateway::new();
    let original = tracked_listing("mixer", "Amazon", 100, 80, 120);
    seed(&gateway, original.clone(), &["dave"]).await;
    let fetcher = Arc::new(ScriptedFetcher::new().status("https://listings.test/mixer", 503));

    let orchestrator = test_orchestrator(test_engine(fetcher.clone(), 3), Arc::new(gateway.clone()));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(fetcher.calls("https://listings.test/mixer"), 3);
    let listing = gateway.listing("mixer").await.unwrap();
    assert_eq!(listing.current_price, original.current_price);
    assert_eq!(listing.last_checked, original.last_checked);
    assert!(gateway.observations_for("mixer").await.is_empty());
    assert!(gateway.notifications().await.is_empty());
    assert_eq!(report.failed, 1);
}

#[tokio::test]
async fn test_unknown_source_is_never_fetched() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("odd", "UnknownMarket", 10, 10, 10), &[]).await;
    let fetcher = Arc::new(ScriptedFetcher::new());

    let orchestrator = test_orchestrator(test_engine(fetcher.clone(), 3), Arc::new(gateway.clone()));
    let report = orchestrator.run().await.unwrap();

    assert_eq!(fetcher.calls("https://listings.test/odd"), 0);
    assert_eq!(report.failed, 1);
    assert!(gateway.listing("odd").await.is_some());
}

#[tokio::test]
async fn test_captcha_then_success() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("watch", "eBay", 500, 450, 520), &[]).await;
    let fetcher = Arc::new(
        ScriptedFetcher::new()
            .page("https://listings.test/watch", CAPTCHA_PAGE)
            .page("https://listings.test/watch", ebay_page("Seiko SKX007", "480.00")),
    );

    let orchestrator = test_orchestrator(test_engine(fetcher.clone(), 3), Arc::new(gateway.clone()));
    orchestrator.run().await.unwrap();

    assert_eq!(fetcher.calls("https://listings.test/watch"), 2);
    assert_eq!(
        gateway.listing("watch").await.unwrap().current_price,
        Decimal::from(480)
    );
}

#[tokio::test]
async fn test_threshold_alert_only_for_opted_in_subscribers() {
    let gateway = InMemoryGateway::new();
    gateway.insert_listing(tracked_listing("tv", "Amazon", 600, 550, 650)).await;
    gateway
        .subscribe(Subscription::new("erin", "tv").with_thresholds(Some(Decimal::from(500)), None))
        .await;
    gateway.subscribe(Subscription::new("frank", "tv")).await;
    let fetcher = ScriptedFetcher::new().page("https://listings.test/tv", amazon_page("OLED TV", "499", "99"));

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway.clone()));
    let report = orchestrator.run().await.unwrap();

    let notifications = gateway.notifications().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].user_id, "erin");
    assert!(notifications[0].message.contains("499.99"));
    assert_eq!(report.notifications, 1);
}

#[tokio::test]
async fn test_apply_error_rolls_back_whole_batch() {
    let inner = InMemoryGateway::new();
    seed(&inner, tracked_listing("first", "eBay", 100, 80, 120), &[]).await;
    seed(&inner, tracked_listing("second", "Amazon", 40, 40, 40), &["gina"]).await;
    let fetcher = ScriptedFetcher::new()
        .page("https://listings.test/first", ebay_page("First", "90.00"))
        .page("https://listings.test/second", AMAZON_SOLD_OUT_PAGE);

    let gateway = FailingGateway {
        inner: inner.clone(),
        fail_on: "second".to_string(),
    };
    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 3), Arc::new(gateway));

    assert!(orchestrator.run().await.is_err());

    assert_eq!(
        inner.listing("first").await.unwrap().current_price,
        Decimal::from(100)
    );
    assert!(inner.observations_for("first").await.is_empty());
    assert!(inner.listing("second").await.is_some());
    assert!(inner.notifications().await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_batch_timeout_marks_unfinished_listings() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("slow", "eBay", 100, 100, 100), &[]).await;
    let fetcher = SlowFetcher::new(Duration::from_secs(3600), ebay_page("Slow", "1.00"));

    let orchestrator = BatchOrchestrator::new(
        test_engine(Arc::new(fetcher), 1),
        Arc::new(gateway.clone()),
        BatchOptions {
            max_concurrent: 2,
            batch_timeout: Duration::from_secs(5),
        },
    );
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.unfinished, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(
        gateway.listing("slow").await.unwrap().current_price,
        Decimal::from(100)
    );
}

#[tokio::test]
async fn test_cancelled_batch_applies_nothing() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("a", "eBay", 10, 10, 10), &[]).await;
    seed(&gateway, tracked_listing("b", "eBay", 20, 20, 20), &[]).await;
    let fetcher = SlowFetcher::new(Duration::from_secs(3600), ebay_page("Any", "5.00"));

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 1), Arc::new(gateway.clone()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrator.run_with_cancellation(cancel).await.unwrap();

    assert_eq!(report.unfinished, 2);
    assert_eq!(report.updated, 0);
    assert_eq!(gateway.observations_for("a").await.len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_concurrency_is_bounded() {
    let gateway = InMemoryGateway::new();
    for i in 0..6 {
        seed(&gateway, tracked_listing(&format!("item-{}", i), "eBay", 10, 10, 10), &[]).await;
    }
    let fetcher = Arc::new(SlowFetcher::new(Duration::from_millis(200), ebay_page("Item", "12.00")));

    let orchestrator = BatchOrchestrator::new(
        test_engine(fetcher.clone(), 1),
        Arc::new(gateway.clone()),
        BatchOptions {
            max_concurrent: 2,
            batch_timeout: Duration::from_secs(60),
        },
    );
    let report = orchestrator.run().await.unwrap();

    assert_eq!(report.updated, 6);
    assert!(fetcher.peak() <= 2, "peak concurrency was {}", fetcher.peak());
}

#[tokio::test]
async fn test_bounds_hold_across_runs() {
    let gateway = InMemoryGateway::new();
    seed(&gateway, tracked_listing("swing", "eBay", 100, 100, 100), &[]).await;
    let fetcher = ScriptedFetcher::new()
        .page("https://listings.test/swing", ebay_page("Swing", "130.00"))
        .page("https://listings.test/swing", ebay_page("Swing", "60.00"))
        .page("https://listings.test/swing", ebay_page("Swing", "95.00"));

    let orchestrator = test_orchestrator(test_engine(Arc::new(fetcher), 1), Arc::new(gateway.clone()));
    for _ in 0..3 {
        orchestrator.run().await.unwrap();
        assert!(gateway.listing("swing").await.unwrap().bounds_hold());
    }

    let listing = gateway.listing("swing").await.unwrap();
    assert_eq!(listing.current_price, Decimal::from(95));
    assert_eq!(listing.lowest_price_ever, Decimal::from(60));
    assert_eq!(listing.highest_price_ever, Decimal::from(130));
    assert_eq!(gateway.observations_for("swing").await.len(), 3);
}
