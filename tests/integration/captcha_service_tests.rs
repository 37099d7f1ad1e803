use std::time::Duration;

use cita_watcher::AppError;
use cita_watcher::booking::captcha::CaptchaService;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service(server: &MockServer, timeout: Duration) -> CaptchaService {
    CaptchaService::new(
        &server.uri(),
        "test-key".to_string(),
        Duration::from_millis(10),
        timeout,
    )
    .unwrap()
}

async fn mount_submit(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/in.php"))
        .and(query_param("key", "test-key"))
        .and(query_param("method", "userrecaptcha"))
        .and(query_param("googlekey", "site-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 1,
            "request": "4242"
        })))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_solve_polls_until_token_is_ready() {
    let server = MockServer::start().await;
    mount_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/res.php"))
        .and(query_param("id", "4242"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 0,
            "request": "CAPCHA_NOT_READY"
        })))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/res.php"))
        .and(query_param("action", "get"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 1,
            "request": "solved-token"
        })))
        .mount(&server)
        .await;

    let token = service(&server, Duration::from_secs(5))
        .solve("site-key", "https://icp.example/citas")
        .await
        .unwrap();

    assert_eq!(token, "solved-token");
}

#[tokio::test]
async fn test_solve_reports_service_errors() {
    let server = MockServer::start().await;
    mount_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 0,
            "request": "ERROR_CAPTCHA_UNSOLVABLE"
        })))
        .mount(&server)
        .await;

    let err = service(&server, Duration::from_secs(5))
        .solve("site-key", "https://icp.example/citas")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Captcha(ref msg) if msg == "ERROR_CAPTCHA_UNSOLVABLE"));
}

#[tokio::test]
async fn test_solve_rejected_task() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/in.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 0,
            "request": "ERROR_WRONG_USER_KEY"
        })))
        .mount(&server)
        .await;

    let err = service(&server, Duration::from_secs(5))
        .solve("site-key", "https://icp.example/citas")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Captcha(_)));
}

#[tokio::test]
async fn test_solve_times_out_when_never_ready() {
    let server = MockServer::start().await;
    mount_submit(&server).await;

    Mock::given(method("GET"))
        .and(path("/res.php"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": 0,
            "request": "CAPCHA_NOT_READY"
        })))
        .mount(&server)
        .await;

    let err = service(&server, Duration::from_millis(200))
        .solve("site-key", "https://icp.example/citas")
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::CaptchaTimeout(_)));
}
