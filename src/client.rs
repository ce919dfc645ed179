//! HTTP client for the proxy.
//!
//! Requests are always sent in raw-text, full-result, positional-row mode so
//! the client sees exactly what the database printed; cells are then decoded
//! locally through the [`TypeRegistry`] into positional or keyed rows.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Url;
use serde_json::Value;
use tracing::debug;

use crate::decode::{project, DecodeFn, Projection, RowShape, TypeRegistry};
use crate::wire::{self, BatchOptions, BatchRequest, BatchResponse, BatchStatement, FetchMethod, QueryRequest, QueryResult};

/// Non-success answer from the proxy. `body` is the error JSON it returned
/// (database diagnostics pass through here unmodified).
#[derive(Debug, Clone, thiserror::Error)]
#[error("proxy returned HTTP {status}: {body}")]
pub struct RemoteError {
    pub status: u16,
    pub body: Value,
}

#[derive(Clone)]
pub struct ProxyClient {
    base: Url,
    client: reqwest::Client,
    session_id: Option<String>,
    shape: RowShape,
    registry: TypeRegistry,
}

impl ProxyClient {
    pub fn new(base: &str) -> Result<Self> {
        let base = Url::parse(base).context("invalid proxy base URL")?;
        let client = reqwest::Client::builder().build()?;
        Ok(Self { base, client, session_id: None, shape: RowShape::Keyed, registry: TypeRegistry::new() })
    }

    /// Send `x-session-id` so captured values follow this client across requests.
    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn with_row_shape(mut self, shape: RowShape) -> Self {
        self.shape = shape;
        self
    }

    /// Override how one type id is decoded.
    pub fn register_decoder(&mut self, oid: i32, decode: DecodeFn) {
        self.registry.register(oid, decode);
    }

    pub fn session_id(&self) -> Option<&str> { self.session_id.as_deref() }

    fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(wire::headers::RAW_TEXT, HeaderValue::from_static("true"));
        headers.insert(wire::headers::RESULT_MODE, HeaderValue::from_static("full"));
        headers.insert(wire::headers::ROW_MODE, HeaderValue::from_static("array"));
        if let Some(sid) = &self.session_id {
            headers.insert(wire::headers::SESSION_ID, HeaderValue::from_str(sid).context("session id is not a valid header value")?);
        }
        Ok(headers)
    }

    async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> Result<Value> {
        let url = self.base.join(path)?;
        let resp = self.client.post(url).headers(self.request_headers()?).json(body).send().await?;
        let status = resp.status();
        let val: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(RemoteError { status: status.as_u16(), body: val }.into());
        }
        Ok(val)
    }

    /// Run one statement in autocommit mode and decode its rows.
    pub async fn query(&self, sql: &str, params: Vec<Value>) -> Result<Projection> {
        let req = QueryRequest { query: sql.to_string(), params, method: FetchMethod::All };
        let body = self.post("/query", &req).await?;
        self.decode_result(body)
    }

    /// Run statements in one transaction; one projection per statement.
    pub async fn batch(&self, statements: Vec<(String, Vec<Value>)>, options: Option<BatchOptions>) -> Result<Vec<Projection>> {
        let queries = statements.into_iter().map(|(query, params)| BatchStatement { query, params }).collect();
        let body = self.post("/batch", &BatchRequest { queries, options }).await?;
        self.decode_batch(body)
    }

    pub fn decode_result(&self, body: Value) -> Result<Projection> {
        let raw: QueryResult = serde_json::from_value(body).context("unexpected query response shape")?;
        Ok(self.project(&raw))
    }

    pub fn decode_batch(&self, body: Value) -> Result<Vec<Projection>> {
        let resp: BatchResponse<QueryResult> = serde_json::from_value(body).context("unexpected batch response shape")?;
        Ok(resp.results.iter().map(|r| self.project(r)).collect())
    }

    fn project(&self, raw: &QueryResult) -> Projection {
        let projection = project(raw, &self.registry, self.shape);
        if !projection.decode_errors.is_empty() {
            debug!(target: "decode", errors = projection.decode_errors.len(), command = %raw.command, "cells kept as raw text");
        }
        projection
    }
}
