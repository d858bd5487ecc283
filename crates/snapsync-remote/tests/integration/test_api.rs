//! REST operations of PicsClient against a mock backend

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::json;
use snapsync_core::domain::ItemKey;
use snapsync_core::ports::IPicsBackend;
use snapsync_remote::api::{PicsClient, PICS_VERSION_10};
use snapsync_remote::auth::NoTokenSource;
use snapsync_remote::RemoteError;
use url::Url;
use wiremock::matchers::{body_bytes, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::{self, CountingTokenSource};

#[tokio::test]
async fn test_items_sends_paging_and_default_headers() {
    let (server, client) = common::setup_backend(CountingTokenSource::new(None)).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .and(query_param("limit", "2"))
        .and(query_param("offset", "4"))
        .and(header("accept", PICS_VERSION_10))
        .and(header("csrf-token", "nocheck"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [common::item_json("k5", Some("c5")), common::item_json("k6", None)]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = client.items(2, 4).await.unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].client_key.as_ref().unwrap().as_str(), "c5");
    assert!(items.iter().all(|i| !i.is_local));
}

#[tokio::test]
async fn test_items_rejects_malformed_body() {
    let (server, client) = common::setup_backend(CountingTokenSource::new(None)).await;

    Mock::given(method("GET"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"pics\": []}"))
        .mount(&server)
        .await;

    let result = client.items(50, 0).await;
    assert!(matches!(result, Err(RemoteError::Body { .. })));
}

#[tokio::test]
async fn test_upload_sends_file_and_client_item_header() {
    let server = MockServer::start().await;
    let client = PicsClient::with_base_url(server.uri(), Arc::new(NoTokenSource));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("q1w2e3r.jpg");
    std::fs::write(&file, b"image-data").unwrap();

    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("x-client-item", "q1w2e3r.jpg"))
        .and(header("csrf-token", "nocheck"))
        .and(header("accept", PICS_VERSION_10))
        .and(body_bytes(b"image-data".to_vec()))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let status = client.upload(&file, "q1w2e3r.jpg", None).await.unwrap();
    assert_eq!(status, StatusCode::OK);

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_upload_failure_is_an_error() {
    let server = MockServer::start().await;
    let client = PicsClient::with_base_url(server.uri(), Arc::new(NoTokenSource));

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("b.jpg");
    std::fs::write(&file, b"b").unwrap();

    Mock::given(method("POST"))
        .and(path("/items"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let result = IPicsBackend::upload_file(&client, &file, "b.jpg", None).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_upload_missing_file_is_local_io() {
    let client = PicsClient::with_base_url("http://127.0.0.1:9", Arc::new(NoTokenSource));
    let result = client
        .upload(std::path::Path::new("/nonexistent/x.jpg"), "x.jpg", None)
        .await;
    assert!(matches!(result, Err(RemoteError::LocalIo(_))));
}

#[tokio::test]
async fn test_delete_item() {
    let (server, client) = common::setup_backend(CountingTokenSource::new(None)).await;

    Mock::given(method("DELETE"))
        .and(path("/items/k1"))
        .and(header("authorization", "Bearer old-token"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let key = ItemKey::new("k1").unwrap();
    client.delete_item(&key).await.unwrap();
}

#[tokio::test]
async fn test_download_writes_file() {
    let server = MockServer::start().await;
    let client = PicsClient::with_base_url(server.uri(), Arc::new(NoTokenSource));

    let content: Vec<u8> = (0..65_536).map(|i| (i % 251) as u8).collect();
    Mock::given(method("GET"))
        .and(path("/small/k1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(content.clone()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let to = dir.path().join("small").join("k1");
    let url = Url::parse(&format!("{}/small/k1", server.uri())).unwrap();

    let written = client.download(&url, &to).await.unwrap();

    assert_eq!(written, content.len() as u64);
    assert_eq!(std::fs::read(&to).unwrap(), content);
}

#[tokio::test]
async fn test_download_404_leaves_no_file() {
    let server = MockServer::start().await;
    let client = PicsClient::with_base_url(server.uri(), Arc::new(NoTokenSource));

    Mock::given(method("GET"))
        .and(path("/large/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let to = dir.path().join("large").join("missing");
    let url = Url::parse(&format!("{}/large/missing", server.uri())).unwrap();

    assert!(client.download(&url, &to).await.is_err());
    assert!(!to.exists());
}
