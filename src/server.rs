//!
//! pgtunnel HTTP server
//! --------------------
//! Axum front end for the proxy protocol.
//!
//! Responsibilities:
//! - `POST /query`: one statement in autocommit mode.
//! - `POST /batch`: statements in one transaction, with optional isolation,
//!   read-only and deferrable modifiers from the body or headers.
//! - Caller identity from `x-session-id`, `authorization` or a fingerprint of
//!   remote address and user agent; each request refreshes its session.
//! - Result shaping per request headers: raw text or decoded cells, keyed or
//!   positional rows, full result or rows only. Malformed boolean headers are
//!   rejected with 400.
//! - Background session sweeper.

use std::any::Any;
use std::net::{IpAddr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::FutureExt; // for catch_unwind on async blocks
use serde_json::{json, Value};
use tracing::{debug, error, info};

use crate::config::ProxyConfig;
use crate::db::{Connector, PgConnector};
use crate::decode::{project, shape_raw, RowShape, TypeRegistry};
use crate::error::{AppError, AppResult};
use crate::resolver::Statement;
use crate::session::{RequestIdentity, Session, SessionStore};
use crate::tx::{TransactionCoordinator, TxOptions};
use crate::wire::{self, BatchOptions, BatchRequest, FetchMethod, QueryRequest, QueryResult};

/// Shared server state injected into all handlers.
pub struct AppState<K> {
    pub sessions: Arc<SessionStore>,
    pub registry: Arc<TypeRegistry>,
    pub connector: Arc<K>,
}

impl<K> Clone for AppState<K> {
    fn clone(&self) -> Self {
        AppState {
            sessions: self.sessions.clone(),
            registry: self.registry.clone(),
            connector: self.connector.clone(),
        }
    }
}

impl<K: Connector> AppState<K> {
    pub fn new(sessions: Arc<SessionStore>, registry: TypeRegistry, connector: K) -> Self {
        AppState { sessions, registry: Arc::new(registry), connector: Arc::new(connector) }
    }

    fn session_for(&self, headers: &HeaderMap, remote: Option<IpAddr>) -> Session {
        let identity = RequestIdentity {
            session_id: header_str(headers, wire::headers::SESSION_ID).map(str::to_string),
            authorization: header_str(headers, "authorization").map(str::to_string),
            remote_addr: remote,
            user_agent: header_str(headers, "user-agent").map(str::to_string),
        };
        self.sessions.get_or_create(&SessionStore::identify(&identity))
    }
}

/// Per-request output shaping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResultFlags {
    pub row_shape: RowShape,
    /// Return cells exactly as the database printed them.
    pub raw_text: bool,
    /// Return rows only instead of the full result structure.
    pub rows_only: bool,
}

impl ResultFlags {
    pub fn from_headers(headers: &HeaderMap) -> AppResult<Self> {
        Ok(ResultFlags {
            row_shape: RowShape::from_header(header_str(headers, wire::headers::ROW_MODE)),
            raw_text: header_bool(headers, wire::headers::RAW_TEXT)?.unwrap_or(false),
            rows_only: header_str(headers, wire::headers::RESULT_MODE)
                .map(|m| m.eq_ignore_ascii_case("rows"))
                .unwrap_or(false),
        })
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim).filter(|v| !v.is_empty())
}

/// Absent header is `None`; a value that is not a recognised boolean is rejected.
fn header_bool(headers: &HeaderMap, name: &str) -> AppResult<Option<bool>> {
    let Some(v) = header_str(headers, name) else { return Ok(None) };
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(Some(true)),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(Some(false)),
        _ => Err(AppError::user("invalid_header".to_string(), format!("{} must be a boolean, got {:?}", name, v))),
    }
}

/// Transaction modifiers carried in headers; body options take precedence.
pub fn header_options(headers: &HeaderMap) -> AppResult<BatchOptions> {
    Ok(BatchOptions {
        isolation_level: header_str(headers, wire::headers::ISOLATION_LEVEL).map(str::to_string),
        read_only: header_bool(headers, wire::headers::READ_ONLY)?,
        deferrable: header_bool(headers, wire::headers::DEFERRABLE)?,
    })
}

/// Shape one statement result for the response.
pub fn render_result(result: QueryResult, flags: ResultFlags, registry: &TypeRegistry, method: FetchMethod) -> Value {
    let (rows, decode_errors) = if flags.raw_text {
        (shape_raw(&result, flags.row_shape), Vec::new())
    } else {
        let projection = project(&result, registry, flags.row_shape);
        (projection.rows, projection.decode_errors)
    };
    if flags.rows_only {
        return match method {
            FetchMethod::Single => rows.into_iter().next().unwrap_or(Value::Null),
            FetchMethod::All => Value::Array(rows),
        };
    }
    let mut body = json!({
        "command": result.command,
        "fields": result.fields,
        "rowCount": result.row_count,
        "rows": rows,
    });
    if !decode_errors.is_empty() {
        body["decodeErrors"] = json!(decode_errors);
    }
    body
}

pub async fn execute_query<K: Connector>(
    state: &AppState<K>,
    headers: &HeaderMap,
    remote: Option<IpAddr>,
    req: QueryRequest,
) -> AppResult<Value> {
    let flags = ResultFlags::from_headers(headers)?;
    let session = state.session_for(headers, remote);
    let mut conn = state.connector.connect().await.map_err(AppError::connect)?;
    let coordinator = TransactionCoordinator::new(&state.sessions, &state.registry);
    let statement = Statement::new(req.query, req.params);
    let result = coordinator.run_single(&mut conn, &session, &statement).await?;
    Ok(render_result(result, flags, &state.registry, req.method))
}

pub async fn execute_batch<K: Connector>(
    state: &AppState<K>,
    headers: &HeaderMap,
    remote: Option<IpAddr>,
    req: BatchRequest,
) -> AppResult<Value> {
    let flags = ResultFlags::from_headers(headers)?;
    let options = req.options.unwrap_or_default().or(header_options(headers)?);
    let options = TxOptions::from_options(&options)?;
    let session = state.session_for(headers, remote);
    if req.queries.is_empty() {
        return Ok(json!({ "results": [] }));
    }
    let statements: Vec<Statement> = req.queries.into_iter().map(Statement::from).collect();
    let mut conn = state.connector.connect().await.map_err(AppError::connect)?;
    let coordinator = TransactionCoordinator::new(&state.sessions, &state.registry);
    let results = coordinator.run_batch(&mut conn, &session, &statements, &options).await?;
    let results: Vec<Value> = results
        .into_iter()
        .map(|r| render_result(r, flags, &state.registry, FetchMethod::All))
        .collect();
    Ok(json!({ "results": results }))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "panic"
    }
}

fn respond(outcome: Result<AppResult<Value>, Box<dyn Any + Send>>, handler: &str) -> Response {
    match outcome {
        Ok(Ok(body)) => (StatusCode::OK, Json(body)).into_response(),
        Ok(Err(e)) => {
            let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                error!(handler = handler, error = %e, "request failed");
            } else {
                debug!(handler = handler, error = %e, "request rejected");
            }
            (status, Json(e.to_body())).into_response()
        }
        Err(panic_payload) => {
            // Convert panics to a 500 error response without crashing the server task
            error!(target: "panic", "HTTP {} panic: {}", handler, panic_message(panic_payload.as_ref()));
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "code": "internal_panic", "message": "internal server error" })),
            )
                .into_response()
        }
    }
}

async fn query_handler<K: Connector>(
    State(state): State<AppState<K>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<QueryRequest>,
) -> Response {
    let fut = execute_query(&state, &headers, Some(remote.ip()), payload);
    respond(AssertUnwindSafe(fut).catch_unwind().await, "query")
}

async fn batch_handler<K: Connector>(
    State(state): State<AppState<K>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<BatchRequest>,
) -> Response {
    let fut = execute_batch(&state, &headers, Some(remote.ip()), payload);
    respond(AssertUnwindSafe(fut).catch_unwind().await, "batch")
}

pub fn router<K: Connector>(state: AppState<K>) -> Router {
    Router::new()
        .route("/", get(|| async { "pgtunnel ok" }))
        .route("/query", post(query_handler::<K>))
        .route("/batch", post(batch_handler::<K>))
        .with_state(state)
}

/// Start the HTTP server and the session sweeper; runs until the listener fails.
pub async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let pg = config.pg_config()?;
    let sessions = Arc::new(SessionStore::new(config.session_ttl));
    match config.sweep_interval {
        Some(interval) => {
            sessions.clone().spawn_sweeper(interval);
        }
        None => info!(target: "session", "session sweeper disabled"),
    }

    let state = AppState::new(sessions, TypeRegistry::new(), PgConnector::new(pg));
    let app = router(state);

    info!(target: "startup", "Starting server on {}", config.http_addr);
    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.http_addr))?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

#[cfg(test)]
mod tests;
