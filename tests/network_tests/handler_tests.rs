//! HTTP API Tests
//!
//! These tests run the record server on an ephemeral port and verify:
//! - Write / read / patch / delete / query routes
//! - Actor header and namespace authorization
//! - Error status mapping and the `{"error": ...}` body
//! - Message cascade deletes

use std::sync::Arc;

use nolodb::config::Config;
use nolodb::network::Server;
use nolodb::protocol::{ApiErrorBody, DeleteResponse, HealthResponse, WriteResponse, ACTOR_HEADER};
use nolodb::Engine;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::oneshot;

// =============================================================================
// Test Harness
// =============================================================================

struct TestServer {
    base: String,
    http: reqwest::Client,
    engine: Arc<Engine>,
    shutdown: Option<oneshot::Sender<()>>,
    _dir: TempDir,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(|b| b).await
    }

    async fn start_with(tune: impl FnOnce(nolodb::config::ConfigBuilder) -> nolodb::config::ConfigBuilder) -> Self {
        let dir = TempDir::new().unwrap();
        let config = tune(Config::builder().data_dir(dir.path())).build();
        let engine = Arc::new(Engine::open(config.clone()).unwrap());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let server = Server::new(config.clone(), Arc::clone(&engine));
        tokio::spawn(async move {
            server
                .serve(listener, async {
                    let _ = rx.await;
                })
                .await
                .unwrap();
        });

        Self {
            base: format!("http://{}{}", addr, config.api_prefix),
            http: reqwest::Client::new(),
            engine,
            shutdown: Some(tx),
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path)
    }

    async fn write_as(&self, actor: &str, body: Value) -> reqwest::Response {
        self.http
            .post(self.url("write/"))
            .header(ACTOR_HEADER, actor)
            .json(&body)
            .send()
            .await
            .unwrap()
    }

    async fn write_ok(&self, actor: &str, body: Value) -> String {
        let response = self.write_as(actor, body).await;
        assert_eq!(response.status(), StatusCode::OK);
        response.json::<WriteResponse>().await.unwrap().data_id
    }

    async fn read(&self, key: &str) -> reqwest::Response {
        self.http.get(self.url(&format!("read/{}", key))).send().await.unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn error_of(response: reqwest::Response) -> String {
    response.json::<ApiErrorBody>().await.unwrap().error
}

// =============================================================================
// Basic Routes
// =============================================================================

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let response = server.http.get(server.url("health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.version, nolodb::VERSION);
}

#[tokio::test]
async fn test_write_then_read() {
    let server = TestServer::start().await;

    let key = server
        .write_ok("alice", json!({"data": {"title": "hello"}, "flags": {"isJSON": true, "isObject": true}}))
        .await;
    assert!(key.starts_with("10100-alice-"));

    let response = server.read(&key).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.json::<Value>().await.unwrap(), json!({"title": "hello"}));

    assert_eq!(server.engine.get_record(&key).unwrap(), Some(json!({"title": "hello"})));
}

#[tokio::test]
async fn test_write_with_full_custom_key() {
    let server = TestServer::start().await;

    let key = server
        .write_ok("alice", json!({"data": {"n": 1}, "customId": "10100-alice-fixed"}))
        .await;
    assert_eq!(key, "10100-alice-fixed");

    // Same key again overwrites
    server
        .write_ok("alice", json!({"data": {"n": 2}, "customId": "10100-alice-fixed"}))
        .await;
    let record: Value = server.read(&key).await.json().await.unwrap();
    assert_eq!(record["n"], 2);
}

#[tokio::test]
async fn test_patch_merges_fields() {
    let server = TestServer::start().await;
    let key = server
        .write_ok("alice", json!({"data": {"title": "a", "meta": {"x": 1}}, "customId": "10100-alice-p"}))
        .await;

    let response = server
        .http
        .patch(server.url(&format!("patch/{}", key)))
        .header(ACTOR_HEADER, "alice")
        .json(&json!({"meta": {"y": 2}, "done": true}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let merged: Value = response.json().await.unwrap();
    assert_eq!(merged, json!({"title": "a", "meta": {"x": 1, "y": 2}, "done": true}));
    assert_eq!(server.read(&key).await.json::<Value>().await.unwrap(), merged);
}

#[tokio::test]
async fn test_delete_single() {
    let server = TestServer::start().await;
    let key = server.write_ok("alice", json!({"data": {"n": 1}})).await;

    let response = server
        .http
        .delete(server.url(&format!("delete/{}", key)))
        .header(ACTOR_HEADER, "alice")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: DeleteResponse = response.json().await.unwrap();
    assert_eq!(body.processing_ids, vec![key.clone()]);
    assert_eq!(server.read(&key).await.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_messages_cascade() {
    let server = TestServer::start().await;
    let dialog = server
        .write_ok("alice", json!({"data": {"type": "dialog"}, "customId": "10100-alice-dlg"}))
        .await;
    for i in 0..3 {
        server
            .write_ok("alice", json!({"data": {"dialogId": "dlg", "n": i}}))
            .await;
    }
    let unrelated = server
        .write_ok("alice", json!({"data": {"dialogId": "other"}}))
        .await;

    let response = server
        .http
        .delete(server.url(&format!("delete/{}?type=messages", dialog)))
        .header(ACTOR_HEADER, "alice")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: DeleteResponse = response.json().await.unwrap();
    assert_eq!(body.processing_ids.len(), 4);
    assert_eq!(body.processing_ids[0], dialog);

    assert_eq!(server.read(&dialog).await.status(), StatusCode::NOT_FOUND);
    assert_eq!(server.read(&unrelated).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_query_route() {
    let server = TestServer::start().await;
    for (i, kind) in ["page", "page", "note"].iter().enumerate() {
        server
            .write_ok("alice", json!({"data": {"type": kind, "n": i}}))
            .await;
    }
    server
        .write_ok("alice", json!({"data": {"type": "page"}, "flags": {"isHash": true}}))
        .await;

    let response = server
        .http
        .post(server.url("query/alice?isObject&limit=10"))
        .json(&json!({"type": "page"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let records: Vec<Value> = response.json().await.unwrap();
    assert_eq!(records.len(), 2);

    let limited: Vec<Value> = server
        .http
        .post(server.url("query/alice?isObject=true&limit=1"))
        .json(&json!({"n": {"$gte": 0}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let top: Vec<Value> = server
        .http
        .post(server.url("query/alice"))
        .query(&[("sort", r#"[{"n":-1}]"#), ("limit", "1")])
        .json(&json!({"n": {"$gte": 0}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["n"], 2);

    let bad_sort = server
        .http
        .post(server.url("query/alice"))
        .query(&[("sort", "[{\"n\":0}]")])
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_sort.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Authorization
// =============================================================================

#[tokio::test]
async fn test_missing_actor_is_unauthorized() {
    let server = TestServer::start().await;

    let response = server
        .http
        .post(server.url("write/"))
        .json(&json!({"data": {"n": 1}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(error_of(response).await.contains(ACTOR_HEADER));
}

#[tokio::test]
async fn test_foreign_namespace_is_forbidden() {
    let server = TestServer::start().await;
    let key = server
        .write_ok("alice", json!({"data": {"n": 1}, "customId": "10100-alice-x"}))
        .await;

    let write = server
        .write_as("mallory", json!({"data": {"n": 2}, "userId": "alice"}))
        .await;
    assert_eq!(write.status(), StatusCode::FORBIDDEN);

    let delete = server
        .http
        .delete(server.url(&format!("delete/{}", key)))
        .header(ACTOR_HEADER, "mallory")
        .send()
        .await
        .unwrap();
    assert_eq!(delete.status(), StatusCode::FORBIDDEN);

    // Reads are not restricted
    assert_eq!(server.read(&key).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_allow_rule_grants_access() {
    let server = TestServer::start_with(|b| b.allow("admin", "*")).await;

    let key = server
        .write_ok("admin", json!({"data": {"n": 1}, "userId": "alice"}))
        .await;
    assert!(key.contains("-alice-"));
}

// =============================================================================
// Error Mapping
// =============================================================================

#[tokio::test]
async fn test_read_missing_is_not_found() {
    let server = TestServer::start().await;

    let response = server.read("10100-alice-nothing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(error_of(response).await.contains("10100-alice-nothing"));
}

#[tokio::test]
async fn test_patch_missing_is_not_found() {
    let server = TestServer::start().await;

    let response = server
        .http
        .patch(server.url("patch/10100-alice-nothing"))
        .header(ACTOR_HEADER, "alice")
        .json(&json!({"x": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_input_is_bad_request() {
    let server = TestServer::start().await;

    assert_eq!(server.read("not_a_key").await.status(), StatusCode::BAD_REQUEST);

    let patch = server
        .http
        .patch(server.url("patch/10100-alice-x"))
        .header(ACTOR_HEADER, "alice")
        .json(&json!([1, 2]))
        .send()
        .await
        .unwrap();
    assert_eq!(patch.status(), StatusCode::BAD_REQUEST);

    // Conditions are evaluated per record, so one must exist
    server.write_ok("alice", json!({"data": {"n": 1}})).await;
    let query = server
        .http
        .post(server.url("query/alice"))
        .json(&json!({"$bogus": 1}))
        .send()
        .await
        .unwrap();
    assert_eq!(query.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_custom_prefix() {
    let server = TestServer::start_with(|b| b.api_prefix("/nolo")).await;

    assert!(server.base.ends_with("/nolo"));
    let response = server.http.get(server.url("health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
