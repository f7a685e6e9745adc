//! # Server - HTTP front end for the engine
//!
//! Every route speaks JSON:
//!
//! ```text
//! POST   /kv/put                   {key, value}            -> {"status":"ok"}
//! GET    /kv/read/{key}                                    -> {key, value}
//! GET    /kv/read-range?start=&end=                        -> {"data":[{key, value}]}
//! POST   /kv/batch-put             {items:[{key, value}]}  -> {"status":"ok","count":n}
//! DELETE /kv/delete/{key}                                  -> {"status":"deleted"}
//! POST   /replicate/append         one WAL record          -> {"status":"ok"}
//! POST   /replicate/appendBatch    {recs:[...]}            -> {"status":"ok"}
//! ```
//!
//! Failures are reported as `{"error": <message>}`:
//!
//! | Cause                | Status |
//! |----------------------|--------|
//! | invalid key or value | 400    |
//! | key absent           | 404    |
//! | inflight limit hit   | 503    |
//! | storage failure      | 500    |

use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use engine::{Db, EngineError, MAX_KEY_SIZE, MAX_VALUE_SIZE};
use replication::{ReplicaBatch, APPEND_BATCH_PATH, APPEND_PATH};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::error;
use wal::WalRecord;

/// Request bodies may carry a maximum-size value plus JSON overhead.
pub const MAX_BODY_BYTES: usize = MAX_VALUE_SIZE + MAX_KEY_SIZE + 64 * 1024;

/// Error body for overloaded writes.
pub const STORE_OVERLOADED: &str = "STORE_OVERLOADED";
/// Error body for reads of absent keys.
pub const NOT_FOUND: &str = "NOT_FOUND";

/// Fields are optional at the JSON level so that a missing or null key or
/// value is reported as a validation error rather than a decode failure.
#[derive(Debug, Deserialize)]
pub struct PutRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
}

impl PutRequest {
    fn into_pair(self) -> Result<(String, String), EngineError> {
        let value = self
            .value
            .ok_or_else(|| EngineError::Validation("value is required".into()))?;
        Ok((self.key.unwrap_or_default(), value))
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchPutRequest {
    #[serde(default)]
    pub items: Vec<PutRequest>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

/// Handler failure, rendered as `{"error": ...}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Engine(EngineError),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        ApiError::Engine(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, NOT_FOUND.to_string()),
            ApiError::Engine(EngineError::Validation(msg)) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Engine(EngineError::Overloaded) => {
                (StatusCode::SERVICE_UNAVAILABLE, STORE_OVERLOADED.to_string())
            }
            ApiError::Engine(e) => {
                error!(error = %e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

/// Builds the application router over a shared [`Db`].
pub fn router(db: Db) -> Router {
    Router::new()
        .route("/kv/put", post(put_handler))
        .route("/kv/read/{key}", get(read_handler))
        .route("/kv/read-range", get(read_range_handler))
        .route("/kv/batch-put", post(batch_put_handler))
        .route("/kv/delete/{key}", delete(delete_handler))
        .route(APPEND_PATH, post(replicate_append_handler))
        .route(APPEND_BATCH_PATH, post(replicate_batch_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(db)
}

async fn put_handler(State(db): State<Db>, Json(body): Json<PutRequest>) -> ApiResult {
    let (key, value) = body.into_pair()?;
    db.put(key, value).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn read_handler(State(db): State<Db>, Path(key): Path<String>) -> Result<Json<KeyValue>, ApiError> {
    match db.read(&key).await? {
        Some(value) => Ok(Json(KeyValue { key, value })),
        None => Err(ApiError::NotFound),
    }
}

async fn read_range_handler(State(db): State<Db>, Query(q): Query<RangeQuery>) -> ApiResult {
    let data: Vec<KeyValue> = db
        .read_range(&q.start, &q.end)
        .await?
        .into_iter()
        .map(|(key, value)| KeyValue { key, value })
        .collect();
    Ok(Json(json!({ "data": data })))
}

async fn batch_put_handler(State(db): State<Db>, Json(body): Json<BatchPutRequest>) -> ApiResult {
    let count = body.items.len();
    let items = body
        .items
        .into_iter()
        .map(PutRequest::into_pair)
        .collect::<Result<Vec<_>, _>>()?;
    db.batch_put(items).await?;
    Ok(Json(json!({ "status": "ok", "count": count })))
}

async fn delete_handler(State(db): State<Db>, Path(key): Path<String>) -> ApiResult {
    db.delete(key).await?;
    Ok(Json(json!({ "status": "deleted" })))
}

async fn replicate_append_handler(State(db): State<Db>, Json(rec): Json<WalRecord>) -> ApiResult {
    db.apply_replica_record(&rec).await?;
    Ok(Json(json!({ "status": "ok" })))
}

async fn replicate_batch_handler(State(db): State<Db>, Json(batch): Json<ReplicaBatch>) -> ApiResult {
    db.apply_replica_batch(&batch.recs).await?;
    Ok(Json(json!({ "status": "ok" })))
}
