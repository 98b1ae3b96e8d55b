//! # API Handlers
//!
//! Axum handlers for ingestion, search and maintenance. Storage work runs on
//! the blocking pool; every failure is returned as a problem document.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use lr_core::volume::{parse_interval, DEFAULT_INTERVAL_MINUTES};
use lr_core::{cursor, filter, CoreError, LogRecord, MaintenanceStatus, PageToken, SearchRequest, Volume};
use lr_store::StoreError;
use serde::{Deserialize, Serialize};

use crate::{otlp, vacuum, AppState};

// =============================================================================
// Problem Documents
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);
pub type ApiResult<T> = Result<T, ApiFailure>;

pub fn problem(status: StatusCode, detail: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(ApiError {
            kind: "about:blank".into(),
            title: status.canonical_reason().unwrap_or("Error").into(),
            status: status.as_u16(),
            detail: detail.into(),
        }),
    )
}

fn core_failure(e: CoreError) -> ApiFailure {
    let status = match e {
        CoreError::MalformedCursor { .. }
        | CoreError::UnsupportedQuerySyntax(_)
        | CoreError::InvalidFilter(_)
        | CoreError::InvalidInterval(_) => StatusCode::BAD_REQUEST,
        CoreError::MaintenanceConflict | CoreError::VacuumInProgress => StatusCode::CONFLICT,
    };
    problem(status, e.to_string())
}

fn store_failure(e: StoreError) -> ApiFailure {
    if e.is_query_syntax() {
        return problem(StatusCode::BAD_REQUEST, format!("Invalid query: {}", e));
    }
    match e {
        StoreError::Core(core) => core_failure(core),
        other => {
            tracing::error!("Storage failure: {}", other);
            problem(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> lr_store::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| problem(StatusCode::INTERNAL_SERVER_ERROR, format!("Task failed: {}", e)))?
        .map_err(store_failure)
}

// =============================================================================
// Search Parameters
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    pub filter: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub size: Option<usize>,
    pub cursor: Option<String>,
    pub interval: Option<String>,
}

/// A validated request plus the wire cursor still to be anchored.
struct Search {
    request: SearchRequest,
    token: Option<PageToken>,
}

fn parse_instant(name: &str, value: Option<&str>) -> ApiResult<Option<DateTime<Utc>>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => DateTime::parse_from_rfc3339(v)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| problem(StatusCode::BAD_REQUEST, format!("Invalid '{}' instant '{}': {}", name, v, e))),
    }
}

impl SearchParams {
    fn into_search(self, page_size: usize) -> ApiResult<Search> {
        let filter_predicate = match self.filter.as_deref() {
            Some(expr) => filter::compile(expr).map_err(core_failure)?,
            None => None,
        };
        let token = match self.cursor.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(c) => Some(cursor::decode(c).map_err(core_failure)?),
            None => None,
        };
        let request = SearchRequest {
            query: self.query.filter(|q| !q.trim().is_empty()),
            filter_predicate,
            from: parse_instant("from", self.from.as_deref())?,
            to: parse_instant("to", self.to.as_deref())?,
            cursor: None,
            page_size,
        };
        Ok(Search { request, token })
    }
}

impl Search {
    /// Resolve the cursor against the store, then run `f`.
    async fn run<T, F>(self, state: &AppState, f: F) -> ApiResult<T>
    where
        F: FnOnce(&lr_store::LogStore, &SearchRequest) -> lr_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = state.store.clone();
        let Search { mut request, token } = self;
        blocking(move || {
            if let Some(token) = token {
                request.cursor = Some(store.resolve_cursor(token)?);
            }
            f(store.as_ref(), &request)
        })
        .await
    }
}

// =============================================================================
// Logs
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub logs: Vec<LogRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub total_count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VolumesResponse {
    pub volumes: Vec<Volume>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub deleted_count: usize,
}

pub async fn search_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<LogsResponse>> {
    let page_size = state.config.search.page_size(params.size);
    let search = params.into_search(page_size)?;
    let logs = search
        .run(&state, |store, request| store.find_latest_logs(request))
        .await?;

    let next_cursor = if logs.len() == page_size {
        logs.last()
            .map(|last| cursor::encode(&lr_core::Cursor::of(last).token()))
    } else {
        None
    };
    Ok(Json(LogsResponse { logs, next_cursor }))
}

pub async fn count_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<CountResponse>> {
    let search = params.into_search(0)?;
    let total_count = search.run(&state, |store, request| store.count(request)).await?;
    Ok(Json(CountResponse { total_count }))
}

pub async fn log_volumes(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<VolumesResponse>> {
    let interval = match params.interval.as_deref() {
        Some(text) => parse_interval(text).map_err(core_failure)?,
        None => DEFAULT_INTERVAL_MINUTES,
    };
    let search = params.into_search(0)?;
    let volumes = search
        .run(&state, move |store, request| store.find_volumes(request, interval))
        .await?;
    Ok(Json(VolumesResponse { volumes }))
}

pub async fn delete_logs(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<DeleteResponse>> {
    let search = params.into_search(0)?;
    let deleted_count = search.run(&state, |store, request| store.delete(request)).await?;
    tracing::info!(deleted_count, "Deleted logs");
    Ok(Json(DeleteResponse { deleted_count }))
}

// =============================================================================
// Ingestion
// =============================================================================

pub async fn ingest_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json");
    let received_at = Utc::now();
    let protobuf = content_type.starts_with("application/x-protobuf");

    let records = if protobuf {
        otlp::decode_protobuf(&body, received_at).map_err(|e| {
            problem(StatusCode::BAD_REQUEST, format!("Invalid OTLP protobuf payload: {}", e))
        })?
    } else if content_type.starts_with("application/json") {
        let data: otlp::LogsData = serde_json::from_slice(&body)
            .map_err(|e| problem(StatusCode::BAD_REQUEST, format!("Invalid OTLP payload: {}", e)))?;
        otlp::decode(data, received_at)
    } else {
        return Err(problem(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!(
                "Unsupported content type '{}', send application/json or application/x-protobuf",
                content_type
            ),
        ));
    };
    let count = records.len();

    let store = state.store.clone();
    blocking(move || store.add_all(&records)).await?;
    tracing::debug!(count, "Ingested logs");

    // An empty ExportLogsServiceResponse in the request's encoding.
    if protobuf {
        Ok(([(header::CONTENT_TYPE, "application/x-protobuf")], Vec::<u8>::new()).into_response())
    } else {
        Ok(Json(serde_json::json!({})).into_response())
    }
}

// =============================================================================
// Maintenance
// =============================================================================

pub async fn maintenance_status(State(state): State<Arc<AppState>>) -> Json<MaintenanceStatus> {
    Json(state.maintenance.status())
}

pub async fn enable_maintenance(State(state): State<Arc<AppState>>) -> StatusCode {
    state.maintenance.enable();
    StatusCode::NO_CONTENT
}

pub async fn disable_maintenance(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    state.maintenance.disable().map_err(core_failure)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_vacuum(State(state): State<Arc<AppState>>) -> ApiResult<StatusCode> {
    vacuum::start(
        state.store.clone(),
        &state.maintenance,
        state.config.store.retention(),
    )
    .map_err(core_failure)?;
    Ok(StatusCode::NO_CONTENT)
}
