use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, NaiveDate, SecondsFormat, Utc};
use serde_json::{json, Value};
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::article::Article;
use crate::batch::{batch_slug, list_batches, read_batch, slugify};
use crate::categorize::{Category, Categorizer};
use crate::decoder::{text_id, DecodeResult, Decoder};
use crate::store::DocumentStore;

/// Header carrying the caller's contact (email or phone) for history.
pub const CONTACT_HEADER: &str = "x-user-contact";
pub const PROPHECY_QUERY: &str = "prophecy";

#[derive(Clone)]
pub struct AppState {
    decoder: Arc<Decoder>,
    categorizer: Arc<Categorizer>,
    store: Arc<dyn DocumentStore>,
    decoded_dir: Arc<PathBuf>,
}

impl AppState {
    pub fn new(
        decoder: Arc<Decoder>,
        categorizer: Arc<Categorizer>,
        store: Arc<dyn DocumentStore>,
        decoded_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            decoder,
            categorizer,
            store,
            decoded_dir: Arc::new(decoded_dir.into()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/decode", post(decode))
        .route("/api/categorize", post(categorize))
        .route("/api/symbols", get(symbols))
        .route("/api/events", get(events_today))
        .route("/api/events/latest", get(events_latest))
        .route("/api/prophecies", get(prophecies))
        .route("/api/history", get(history))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Error envelope: `{"status":"error","message":...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "status": "error", "message": self.message })),
        )
            .into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        Self::bad_request(format!("invalid JSON body: {}", r.body_text()))
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        tracing::error!(target: "api", error = ?e, "request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(serde::Deserialize)]
struct DecodeReq {
    #[serde(default)]
    verse: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(serde::Serialize)]
struct DecodeResp {
    status: &'static str,
    original: String,
    result: DecodeResult,
}

fn contact(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTACT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

async fn decode(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<DecodeReq>, JsonRejection>,
) -> ApiResult<Json<DecodeResp>> {
    let Json(req) = body?;
    let original = req
        .verse
        .filter(|v| !v.trim().is_empty())
        .or(req.text)
        .unwrap_or_default();
    if original.trim().is_empty() {
        return Err(ApiError::bad_request("Verse or text is required"));
    }

    let result = state.decoder.decode(&original);

    if let Some(who) = contact(&headers) {
        let entry = json!({
            "query": original,
            "matched": result.symbol_names(),
            "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        // History is best-effort; the decode result is returned regardless.
        if let Err(e) = state.store.push_to_array(&who, "history", entry) {
            tracing::warn!(target: "api", id = %text_id(&who), error = %e, "failed to record history");
        }
    }

    Ok(Json(DecodeResp {
        status: "success",
        original,
        result,
    }))
}

#[derive(serde::Deserialize)]
struct CategorizeReq {
    #[serde(default)]
    headline: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(serde::Serialize)]
struct CategorizeResp {
    categories: Vec<Category>,
}

async fn categorize(
    State(state): State<AppState>,
    body: Result<Json<CategorizeReq>, JsonRejection>,
) -> ApiResult<Json<CategorizeResp>> {
    let Json(req) = body?;
    let categories = match req.text {
        Some(t) => state.categorizer.categorize_text(&t),
        None => state
            .categorizer
            .categorize(&Article::with_headline(&req.headline, &req.description)),
    };
    Ok(Json(CategorizeResp { categories }))
}

async fn symbols(State(state): State<AppState>) -> Json<Value> {
    let names = state.decoder.symbol_names();
    Json(json!({ "count": names.len(), "symbols": names }))
}

fn batches_for_day(state: &AppState, day: NaiveDate) -> Vec<Article> {
    list_batches(&state.decoded_dir)
        .into_iter()
        .filter(|(d, _)| *d == day)
        .flat_map(|(_, p)| read_batch(&p))
        .collect()
}

/// Newest decoded batch whose query slug equals `query`'s slug.
fn latest_for_query(state: &AppState, query: &str) -> Option<(String, Vec<Article>)> {
    let want = slugify(query);
    let (_, path) = list_batches(&state.decoded_dir)
        .into_iter()
        .filter(|(_, p)| {
            p.file_name()
                .and_then(|n| batch_slug(&n.to_string_lossy()))
                .is_some_and(|s| s == want)
        })
        .last()?;
    let name = path.file_name()?.to_string_lossy().to_string();
    Some((name, read_batch(&path)))
}

async fn events_today(State(state): State<AppState>) -> Json<Value> {
    let today = Local::now().date_naive();
    let events = batches_for_day(&state, today);
    let message = if events.is_empty() {
        "No events available today.".to_string()
    } else {
        format!("Found {} events for {}", events.len(), today.format("%Y-%m-%d"))
    };
    Json(json!({ "status": "ok", "message": message, "events": events }))
}

#[derive(serde::Deserialize)]
struct LatestQuery {
    #[serde(default)]
    query: Option<String>,
}

async fn events_latest(
    State(state): State<AppState>,
    Query(q): Query<LatestQuery>,
) -> ApiResult<Json<Value>> {
    let query = q
        .query
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("query parameter is required"))?;
    Ok(Json(match latest_for_query(&state, &query) {
        Some((file, events)) => json!({
            "status": "ok",
            "message": format!("Latest events file: {file}"),
            "file": file,
            "events": events,
        }),
        None => json!({
            "status": "ok",
            "message": format!("No events available for `{query}`."),
            "events": [],
        }),
    }))
}

async fn prophecies(State(state): State<AppState>) -> Json<Value> {
    Json(match latest_for_query(&state, PROPHECY_QUERY) {
        Some((file, items)) => json!({
            "status": "ok",
            "message": format!("Latest prophecy file: {file}"),
            "prophecies": items,
        }),
        None => json!({
            "status": "ok",
            "message": "No prophecies available.",
            "prophecies": [],
        }),
    })
}

async fn history(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Json<Value>> {
    let who = contact(&headers).ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "Unauthorized"))?;
    let user = state
        .store
        .find(&who)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "User not found"))?;
    let items = user.get("history").cloned().unwrap_or_else(|| json!([]));
    Ok(Json(json!({ "success": true, "history": items })))
}
