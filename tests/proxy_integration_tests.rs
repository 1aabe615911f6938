//! # Proxy Integration Tests
//!
//! End-to-end tests of the HTTP surface against a mocked taxonomy API and
//! token endpoint, with the in-memory cache store.

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};
use std::time::Duration;
use taxonomy_proxy::core::config::CacheBackend;
use taxonomy_proxy::{ProxyConfig, ProxyServer};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "issued-token";

fn config_for(upstream: &MockServer) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstream.base_url = format!("{}/icd", upstream.uri());
    config.credentials.token_url = format!("{}/connect/token", upstream.uri());
    config.credentials.client_id = "proxy-client".to_string();
    config.credentials.client_secret = "proxy-secret".to_string();
    config.cache.backend = CacheBackend::Memory;
    config
}

async fn mount_token(upstream: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": TOKEN,
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(expected_calls)
        .mount(upstream)
        .await;
}

async fn start_proxy(upstream: &MockServer) -> (TestServer, CancellationToken) {
    let shutdown = CancellationToken::new();
    let server = ProxyServer::new(config_for(upstream), None, shutdown.clone())
        .await
        .unwrap();
    (TestServer::new(server.router()).unwrap(), shutdown)
}

async fn wait_for_request(upstream: &MockServer, request_path: &str) {
    for _ in 0..100 {
        let seen = upstream
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .any(|request| request.url.path() == request_path);
        if seen {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_chapters_fetched_once_then_served_from_cache() {
    let upstream = MockServer::start().await;
    mount_token(&upstream, 1).await;
    let root_path = "/icd/release/11/2019-04/mms";
    let chapter_path = "/icd/release/11/2019-04/mms/1435254666";
    let chapter_url = format!("{}{}", upstream.uri(), chapter_path);

    Mock::given(method("GET"))
        .and(path(root_path))
        .and(header("Authorization", "Bearer issued-token"))
        .and(header("API-Version", "v2"))
        .and(header("Accept-Language", "en"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "releaseId": "2019-04",
            "title": {"@language": "en", "@value": "ICD-11 for Mortality and Morbidity Statistics"},
            "child": [chapter_url]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    // Fetched once by the miss-driven walk, then only from cache
    Mock::given(method("GET"))
        .and(path(chapter_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "title": {"@value": "Certain infectious or parasitic diseases"},
            "code": "01"
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let (proxy, shutdown) = start_proxy(&upstream).await;

    let first = proxy.get("/chapters/2019-04").await;
    first.assert_status_ok();
    let body = first.json::<Value>();
    assert_eq!(body["releaseId"], "2019-04");
    assert_eq!(body["chapters"][0], chapter_url);

    let second = proxy.get("/chapters/2019-04").await;
    second.assert_status_ok();
    assert_eq!(second.json::<Value>(), body);

    wait_for_request(&upstream, chapter_path).await;
    // Give the walk a moment to write the node after the request completes
    tokio::time::sleep(Duration::from_millis(50)).await;

    let chapter = proxy.get("/icd/data").add_query_param("url", &chapter_url).await;
    chapter.assert_status_ok();
    assert_eq!(chapter.json::<Value>()["code"], "01");

    shutdown.cancel();
}

#[tokio::test]
async fn test_search_caches_entity_projections() {
    let upstream = MockServer::start().await;
    mount_token(&upstream, 1).await;
    let entity_url = format!("{}/icd/entity/257068234", upstream.uri());

    Mock::given(method("GET"))
        .and(path("/icd/release/11/2019-04/mms/search"))
        .and(query_param("q", "cholera"))
        .and(query_param("useFlexisearch", "false"))
        .and(query_param("flatResults", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "error": false,
            "destinationEntities": [{
                "id": entity_url,
                "title": "<em class='found'>Cholera</em>",
                "theCode": "1A00",
                "browserUrl": "https://icd.who.int/browse11/l-m/en#/257068234",
                "score": 1.0
            }]
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/icd/entity/257068234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .expect(0)
        .mount(&upstream)
        .await;

    let (proxy, shutdown) = start_proxy(&upstream).await;

    let search = proxy.get("/search/2019-04").add_query_param("q", "cholera").await;
    search.assert_status_ok();
    assert_eq!(search.json::<Value>()["destinationEntities"][0]["theCode"], "1A00");

    // Same query again is a cache hit
    proxy
        .get("/search/2019-04")
        .add_query_param("q", "cholera")
        .await
        .assert_status_ok();

    let entity = proxy.get("/icd/data").add_query_param("url", &entity_url).await;
    entity.assert_status_ok();
    let projection = entity.json::<Value>();
    assert_eq!(projection["id"], entity_url);
    assert_eq!(projection["code"], "1A00");
    assert!(projection.get("score").is_none());

    shutdown.cancel();
}

#[tokio::test]
async fn test_upstream_failure_is_not_cached() {
    let upstream = MockServer::start().await;
    mount_token(&upstream, 1).await;
    let node_url = format!("{}/icd/entity/500", upstream.uri());

    Mock::given(method("GET"))
        .and(path("/icd/entity/500"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(2)
        .mount(&upstream)
        .await;

    let (proxy, shutdown) = start_proxy(&upstream).await;

    for _ in 0..2 {
        let response = proxy.get("/icd/data").add_query_param("url", &node_url).await;
        response.assert_status(StatusCode::BAD_GATEWAY);
        let body = response.json::<Value>();
        assert_eq!(body["error"]["type"], "upstream_error");
        assert_eq!(body["error"]["upstream_status"], 500);
    }

    let stats = proxy.get("/cache/stats").await.json::<Value>();
    assert_eq!(stats["entries"]["node"], 0);

    shutdown.cancel();
}

#[tokio::test]
async fn test_rejected_credentials_return_service_unavailable() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/connect/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_client"})))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/icd/release/11/2019-04/mms"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"child": []})))
        .expect(0)
        .mount(&upstream)
        .await;

    let (proxy, shutdown) = start_proxy(&upstream).await;

    let response = proxy.get("/chapters/2019-04").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.json::<Value>()["error"]["type"], "credential_error");

    shutdown.cancel();
}

#[tokio::test]
async fn test_token_reused_across_requests() {
    let upstream = MockServer::start().await;
    mount_token(&upstream, 1).await;

    for id in ["1", "2", "3"] {
        Mock::given(method("GET"))
            .and(path(format!("/icd/entity/{}", id)))
            .and(header("Authorization", "Bearer issued-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": id})))
            .expect(1)
            .mount(&upstream)
            .await;
    }

    let (proxy, shutdown) = start_proxy(&upstream).await;

    for id in ["1", "2", "3"] {
        let url = format!("{}/icd/entity/{}", upstream.uri(), id);
        proxy.get("/icd/data").add_query_param("url", &url).await.assert_status_ok();
    }

    let stats = proxy.get("/cache/stats").await.json::<Value>();
    assert_eq!(stats["entries"]["node"], 3);
    assert_eq!(stats["healthy"], true);

    shutdown.cancel();
}

#[tokio::test]
async fn test_manual_refresh_walks_canonical_root() {
    let upstream = MockServer::start().await;
    mount_token(&upstream, 1).await;
    let root_path = "/icd/release/11/2019-04/mms";

    Mock::given(method("GET"))
        .and(path(root_path))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"child": []})))
        .expect(1)
        .mount(&upstream)
        .await;

    let (proxy, shutdown) = start_proxy(&upstream).await;

    let response = proxy.post("/cache/refresh").await;
    response.assert_status(StatusCode::ACCEPTED);
    assert_eq!(response.json::<Value>()["status"], "started");

    let mut stats = Value::Null;
    for _ in 0..100 {
        stats = proxy.get("/cache/stats").await.json::<Value>();
        if stats["refresh_in_progress"] == false && !stats["last_refresh"].is_null() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(stats["last_refresh"]["report"]["fetched"], 1);
    assert_eq!(stats["entries"]["node"], 1);
    assert_eq!(stats["entries"]["chapters"], 1);

    // The refreshed root answers the chapter listing without another fetch
    proxy.get("/chapters/2019-04").await.assert_status_ok();

    shutdown.cancel();
}
