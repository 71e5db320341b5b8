// End-to-end scrapes over real HTTP against a local mock server

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use listing_watcher::config::ScraperConfig;
use listing_watcher::models::{FailureCause, ScrapeOutcome, UnavailableReason};
use listing_watcher::transport::HttpFetcher;

use super::*;

fn http_engine(attempts: u32) -> ScrapeEngine {
    let config = ScraperConfig {
        connect_timeout: 2,
        request_timeout: 2,
        ..ScraperConfig::default()
    };
    ScrapeEngine::new(
        Arc::new(HttpFetcher::new(&config, None).unwrap()),
        Arc::new(SourceRegistry::with_default_parsers(&HashMap::new()).unwrap()),
        IdentityPool::new(Vec::new(), None),
        RetryPolicy::new(attempts, Duration::from_millis(5)),
    )
}

#[tokio::test]
async fn test_scrape_amazon_page_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dp/B0TEST"))
        .respond_with(ResponseTemplate::new(200).set_body_string(amazon_page("Stand mixer", "1,049", "99")))
        .mount(&server)
        .await;

    let url = format!("{}/dp/B0TEST", server.uri());
    let listing = http_engine(3).check_listing(&url, "Amazon").await.unwrap();

    assert_eq!(listing.title, "Stand mixer");
    assert_eq!(listing.price, Decimal::new(104999, 2));
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    let url = format!("{}/itm/1", server.uri());
    let report = http_engine(3).scrape_with(&url, "ebay", &RetryPolicy::new(3, Duration::from_millis(5))).await;

    assert_eq!(report.outcome, ScrapeOutcome::failure(FailureCause::Transport));
    assert_eq!(report.attempts, 3);
}

#[tokio::test]
async fn test_ended_listing_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(EBAY_ENDED_PAGE))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/itm/2", server.uri());
    let outcome = http_engine(3).scrape(&url, "eBay").await;

    assert_eq!(outcome, ScrapeOutcome::unavailable(UnavailableReason::ListingEnded));
}

#[tokio::test]
async fn test_check_listing_reports_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(CAPTCHA_PAGE))
        .mount(&server)
        .await;

    let url = format!("{}/itm/3", server.uri());
    let err = http_engine(2).check_listing(&url, "eBay").await.unwrap_err();

    assert!(err.to_string().contains("anti_bot"));
}
