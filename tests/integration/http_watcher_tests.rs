use std::sync::Arc;
use std::time::Duration;

use cita_watcher::plugins::fetchers::HttpFetcher;
use cita_watcher::plugins::traits::{FetchRequest, PageFetcher};
use cita_watcher::{AppError, AvailabilityWatcher, CycleOutcome, SubscriberId};
use rstest::rstest;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{RecordingNotifier, availability_page, create_test_store, get_test_config};

#[tokio::test]
async fn test_madrid_availability_reaches_both_subscribers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/icpplus/index.html"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(availability_page(&[
                ("Madrid", "B1", "доступны 5 мая"),
                ("Toledo", "T3", "нет"),
            ])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&format!("{}/icpplus/index.html", server.uri()));
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir, &[111, 222]).await;
    let file_before = std::fs::read(store.path()).unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let watcher = AvailabilityWatcher::new(
        &config,
        Arc::new(HttpFetcher::new(&config.scraper).unwrap()),
        notifier.clone(),
        Arc::clone(&store),
    )
    .unwrap();

    let report = watcher.run_cycle().await;
    assert_eq!(report.outcome, CycleOutcome::Notified);
    assert_eq!(report.entries_found, 1);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 2);
    let mut recipients: Vec<_> = sent.iter().map(|(id, _)| id.clone()).collect();
    recipients.sort();
    assert_eq!(recipients, vec![SubscriberId::Chat(111), SubscriberId::Chat(222)]);
    for (_, text) in &sent {
        assert!(text.contains("Madrid"));
        assert!(text.contains("B1"));
        assert!(text.contains("доступны 5 мая"));
        assert!(!text.contains("Toledo"));
    }

    assert_eq!(std::fs::read(store.path()).unwrap(), file_before);
}

#[tokio::test]
async fn test_server_errors_exhaust_retries_without_notifying() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let dir = TempDir::new().unwrap();
    let store = create_test_store(&dir, &[111]).await;
    let notifier = Arc::new(RecordingNotifier::default());

    let watcher = AvailabilityWatcher::new(
        &config,
        Arc::new(HttpFetcher::new(&config.scraper).unwrap()),
        notifier.clone(),
        store,
    )
    .unwrap();

    let report = watcher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Failed);
    assert!(report.error.unwrap().contains("503"));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_missing_ready_marker_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(availability_page(&[])))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = get_test_config(&server.uri());
    config.target.ready_selector = Some("#citas".to_string());
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let watcher = AvailabilityWatcher::new(
        &config,
        Arc::new(HttpFetcher::new(&config.scraper).unwrap()),
        notifier.clone(),
        create_test_store(&dir, &[111]).await,
    )
    .unwrap();

    let report = watcher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Failed);
    assert!(report.error.unwrap().contains("#citas"));
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_reachability_check_sees_reachable_server() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = HttpFetcher::new(&config.scraper).unwrap();

    assert!(fetcher.probe(&server.uri(), Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_reachability_check_treats_server_errors_as_unreachable() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let mut config = get_test_config(&server.uri());
    config.target.probe = true;
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let watcher = AvailabilityWatcher::new(
        &config,
        Arc::new(HttpFetcher::new(&config.scraper).unwrap()),
        notifier.clone(),
        create_test_store(&dir, &[111]).await,
    )
    .unwrap();

    let report = watcher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Unreachable);
    assert!(notifier.sent().is_empty());
}

#[tokio::test]
async fn test_fetch_returns_final_url_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/citas"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html><body>ok</body></html>"))
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let fetcher = HttpFetcher::new(&config.scraper).unwrap();
    let request = FetchRequest {
        url: format!("{}/citas", server.uri()),
        ready_selector: Some("body".to_string()),
        wait_timeout: Duration::from_secs(1),
    };

    let page = fetcher.fetch_page(&request).await.unwrap();
    assert_eq!(page.final_url, request.url);
    assert!(page.html.contains("ok"));

    let missing = FetchRequest {
        url: format!("{}/missing", server.uri()),
        ..request
    };
    let err = fetcher.fetch_page(&missing).await.unwrap_err();
    assert!(matches!(err, AppError::Fetch { .. }));
}

#[rstest]
#[case("")]
#[case(r#"{"error":"maintenance"}"#)]
#[case("<html><body><h1>Service Unavailable</h1></body></html>")]
#[tokio::test]
async fn test_page_without_site_markup_fails_the_cycle(#[case] body: &str) {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(1)
        .mount(&server)
        .await;

    let config = get_test_config(&server.uri());
    let dir = TempDir::new().unwrap();
    let notifier = Arc::new(RecordingNotifier::default());

    let watcher = AvailabilityWatcher::new(
        &config,
        Arc::new(HttpFetcher::new(&config.scraper).unwrap()),
        notifier.clone(),
        create_test_store(&dir, &[111]).await,
    )
    .unwrap();

    let report = watcher.run_cycle().await;

    assert_eq!(report.outcome, CycleOutcome::Failed);
    assert!(report.error.unwrap().contains(".meeting-availability"));
    assert!(notifier.sent().is_empty());
}
