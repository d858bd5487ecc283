//! Token refresh policy: one retry on `token_expired`, never more

use reqwest::StatusCode;
use serde_json::json;
use snapsync_remote::RemoteError;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common::{self, CountingTokenSource};

#[tokio::test]
async fn test_expired_token_is_refreshed_and_retried_once() {
    let source = CountingTokenSource::new(Some("new-token"));
    let (server, client) = common::setup_backend(source.clone()).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(common::token_expired_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/items"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "items": [common::item_json("k1", None)] })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let items = client.items(50, 0).await.expect("retry should succeed");

    assert_eq!(items.len(), 1);
    assert_eq!(items[0].key.as_str(), "k1");
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_second_token_expired_is_surfaced() {
    let source = CountingTokenSource::new(Some("new-token"));
    let (server, client) = common::setup_backend(source.clone()).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401).set_body_json(common::token_expired_body()))
        .expect(2)
        .mount(&server)
        .await;

    let result = client.items(50, 0).await;

    assert!(matches!(result, Err(RemoteError::AuthExpired { .. })));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_no_session_surfaces_auth_expired_without_retry() {
    let source = CountingTokenSource::new(None);
    let (server, client) = common::setup_backend(source.clone()).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(401).set_body_json(common::token_expired_body()))
        .expect(1)
        .mount(&server)
        .await;

    let result = client.items(50, 0).await;

    assert!(matches!(result, Err(RemoteError::AuthExpired { .. })));
    assert_eq!(source.calls(), 1);
}

#[tokio::test]
async fn test_other_errors_are_not_retried() {
    let source = CountingTokenSource::new(Some("new-token"));
    let (server, client) = common::setup_backend(source.clone()).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "errors": [{ "key": "forbidden", "message": "Nope." }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    match client.items(50, 0).await {
        Err(RemoteError::Status { status, errors, .. }) => {
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert_eq!(errors[0].key, "forbidden");
        }
        other => panic!("expected status error, got {other:?}"),
    }
    assert_eq!(source.calls(), 0);
}

#[tokio::test]
async fn test_upload_is_retried_with_fresh_token() {
    let source = CountingTokenSource::new(Some("new-token"));
    let (server, client) = common::setup_backend(source.clone()).await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("abc1234.jpg");
    std::fs::write(&file, b"jpeg bytes").unwrap();

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(common::token_expired_body()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("authorization", "Bearer new-token"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let token = snapsync_core::domain::IdToken::new("user-token").unwrap();
    let status = client
        .upload(&file, "abc1234.jpg", Some(&token))
        .await
        .expect("upload should succeed after retry");

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(source.calls(), 1);
}
