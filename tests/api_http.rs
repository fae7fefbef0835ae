// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.

use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use serde_json::json;
use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use tower::ServiceExt as _; // for `oneshot`

use prophecy_decoder::api::{self, AppState, CONTACT_HEADER};
use prophecy_decoder::article::Article;
use prophecy_decoder::batch::{batch_file_name, write_batch};
use prophecy_decoder::categorize::Categorizer;
use prophecy_decoder::store::MemoryDocumentStore;
use prophecy_decoder::{Decoder, SymbolDictionary};

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

const SYMBOLS: &str = r#"{
    "666": { "keywords": [], "scriptures": ["Revelation 13:18"], "meaning": "Number of the beast" },
    "Dragon": { "keywords": ["dragon", "serpent"], "scriptures": ["Revelation 12:9"], "meaning": "Satan" }
}"#;

/// Build the same Router the binary uses, over a temp decoded dir.
fn test_router(decoded_dir: &Path) -> Router {
    let dict = SymbolDictionary::from_json_str(SYMBOLS).expect("symbols json");
    let state = AppState::new(
        Arc::new(Decoder::new(dict)),
        Arc::new(Categorizer::default()),
        Arc::new(MemoryDocumentStore::new()),
        decoded_dir,
    );
    api::router(state)
}

async fn read_json(resp: shuttle_axum::axum::response::Response) -> Json {
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    serde_json::from_slice(&bytes).expect("parse json")
}

fn post_json(uri: &str, payload: Json) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST")
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let body = String::from_utf8(bytes).expect("utf8");
    assert_eq!(body.trim(), "OK", "health body should be 'OK'");
}

#[tokio::test]
async fn decode_returns_success_envelope_with_symbol_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let resp = app
        .oneshot(post_json(
            "/api/decode",
            json!({ "verse": "the number 666 appears" }),
        ))
        .await
        .expect("oneshot /api/decode");
    assert_eq!(resp.status(), StatusCode::OK);

    let v = read_json(resp).await;
    assert_eq!(v["status"], "success");
    assert_eq!(v["original"], "the number 666 appears");
    let decoded = v["result"]["decoded"].as_array().expect("decoded array");
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0]["666"]["scriptures"], json!(["Revelation 13:18"]));
}

#[tokio::test]
async fn decode_accepts_text_field_and_reports_no_match() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let resp = app
        .oneshot(post_json("/api/decode", json!({ "text": "hello world" })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(
        v["result"]["decoded"],
        json!([{ "message": "No symbolic meaning detected in this prophecy." }])
    );
}

#[tokio::test]
async fn decode_rejects_blank_and_malformed_input_with_error_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let resp = app
        .clone()
        .oneshot(post_json("/api/decode", json!({ "verse": "   " })))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let v = read_json(resp).await;
    assert_eq!(v["status"], "error");
    assert!(v["message"].as_str().is_some_and(|m| !m.is_empty()));

    let req = Request::builder()
        .method("POST")
        .uri("/api/decode")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(read_json(resp).await["status"], "error");
}

#[tokio::test]
async fn decode_with_contact_records_history() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let req = Request::builder()
        .method("POST")
        .uri("/api/decode")
        .header("content-type", "application/json")
        .header(CONTACT_HEADER, "ann@example.com")
        .body(Body::from(json!({ "verse": "The dragon stood" }).to_string()))
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::get("/api/history")
        .header(CONTACT_HEADER, "Ann@Example.com")
        .body(Body::empty())
        .unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(v["success"], true);
    let items = v["history"].as_array().expect("history array");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["query"], "The dragon stood");
    assert_eq!(items[0]["matched"], json!(["Dragon"]));
}

#[tokio::test]
async fn history_requires_known_contact() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let resp = app
        .clone()
        .oneshot(Request::get("/api/history").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let req = Request::get("/api/history")
        .header(CONTACT_HEADER, "nobody@example.com")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    assert_eq!(read_json(resp).await["status"], "error");
}

#[tokio::test]
async fn categorize_and_symbols_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(dir.path());

    let resp = app
        .clone()
        .oneshot(post_json(
            "/api/categorize",
            json!({ "headline": "Local bakery wins award", "description": "" }),
        ))
        .await
        .unwrap();
    assert_eq!(read_json(resp).await["categories"], json!(["general"]));

    let resp = app
        .oneshot(Request::get("/api/symbols").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let v = read_json(resp).await;
    assert_eq!(v["count"], 2);
    assert_eq!(v["symbols"], json!(["666", "Dragon"]));
}

#[tokio::test]
async fn events_endpoints_serve_decoded_batches() {
    let dir = tempfile::tempdir().unwrap();
    let today = Local::now().date_naive();
    let older = today - chrono::Duration::days(3);

    write_batch(
        &dir.path().join(batch_file_name("prophecy", older)),
        &[Article::with_headline("old prophecy", "")],
    )
    .unwrap();
    write_batch(
        &dir.path().join(batch_file_name("prophecy", today)),
        &[Article::with_headline("new prophecy", "")],
    )
    .unwrap();
    write_batch(
        &dir.path().join(batch_file_name("end times", today)),
        &[Article::with_headline("end times story", "")],
    )
    .unwrap();

    let app = test_router(dir.path());

    let resp = app
        .clone()
        .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let v = read_json(resp).await;
    assert_eq!(v["status"], "ok");
    assert_eq!(v["events"].as_array().unwrap().len(), 2);

    let resp = app
        .clone()
        .oneshot(Request::get("/api/prophecies").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let v = read_json(resp).await;
    assert_eq!(v["prophecies"][0]["headline"], "new prophecy");

    let resp = app
        .clone()
        .oneshot(
            Request::get("/api/events/latest?query=end%20times")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let v = read_json(resp).await;
    assert_eq!(v["events"][0]["headline"], "end times story");

    let resp = app
        .oneshot(Request::get("/api/events/latest").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn events_endpoint_is_empty_without_data() {
    let dir = tempfile::tempdir().unwrap();
    let app = test_router(&dir.path().join("missing"));

    let resp = app
        .oneshot(Request::get("/api/events").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let v = read_json(resp).await;
    assert_eq!(v["events"], json!([]));
    assert_eq!(v["message"], "No events available today.");
}
