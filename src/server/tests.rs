use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderValue, StatusCode};
use serde_json::json;

use super::*;
use crate::db::scripted::returning_row;
use crate::db::{ColumnMetadata, ScriptedConnection};
use crate::error::DbDiagnostic;
use crate::wire::{BatchStatement, Column};

const INT4: i32 = 23;
const INT4_ARRAY: i32 = 1007;

fn state(conn: &ScriptedConnection) -> AppState<ScriptedConnection> {
    AppState::new(Arc::new(SessionStore::default()), TypeRegistry::new(), conn.clone())
}

fn with_headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut h = HeaderMap::new();
    for (k, v) in pairs {
        h.insert(*k, HeaderValue::from_static(v));
    }
    h
}

fn local() -> Option<IpAddr> { Some(IpAddr::V4(Ipv4Addr::LOCALHOST)) }

fn tagged_rows() -> QueryResult {
    QueryResult {
        command: "SELECT".into(),
        fields: vec![
            Column { name: "id".into(), type_id: INT4, ordinal: 0 },
            Column { name: "tags".into(), type_id: INT4_ARRAY, ordinal: 1 },
        ],
        row_count: 2,
        rows: vec![json!(["1", "{1,2}"]), json!(["2", "{}"])],
    }
}

fn query(sql: &str, method: FetchMethod) -> QueryRequest {
    QueryRequest { query: sql.to_string(), params: vec![], method }
}

#[tokio::test]
async fn query_returns_decoded_keyed_rows_by_default() {
    let conn = ScriptedConnection::new().respond(tagged_rows());
    let body = execute_query(&state(&conn), &HeaderMap::new(), local(), query("SELECT id, tags FROM t", FetchMethod::All))
        .await
        .unwrap();
    assert_eq!(body["command"], "SELECT");
    assert_eq!(body["rowCount"], 2);
    assert_eq!(body["rows"], json!([{"id": 1, "tags": [1, 2]}, {"id": 2, "tags": []}]));
    assert_eq!(body["fields"][1]["typeId"], INT4_ARRAY);
    assert!(body.get("decodeErrors").is_none());
}

#[tokio::test]
async fn raw_text_rows_mode_single_row() {
    let conn = ScriptedConnection::new().respond(tagged_rows());
    let headers = with_headers(&[("x-raw-text", "true"), ("x-result-mode", "rows")]);
    let body = execute_query(&state(&conn), &headers, local(), query("SELECT id, tags FROM t", FetchMethod::Single))
        .await
        .unwrap();
    assert_eq!(body, json!({"id": "1", "tags": "{1,2}"}));
}

#[tokio::test]
async fn raw_text_honours_row_mode() {
    let conn = ScriptedConnection::new().respond(tagged_rows()).respond(tagged_rows());
    let st = state(&conn);
    let keyed = with_headers(&[("x-raw-text", "true"), ("x-result-mode", "full")]);
    let body = execute_query(&st, &keyed, local(), query("SELECT id, tags FROM t", FetchMethod::All)).await.unwrap();
    assert_eq!(body["rows"], json!([{"id": "1", "tags": "{1,2}"}, {"id": "2", "tags": "{}"}]));
    assert_eq!(body["rowCount"], 2);

    let positional = with_headers(&[("x-raw-text", "true"), ("x-row-mode", "array"), ("x-result-mode", "rows")]);
    let body = execute_query(&st, &positional, local(), query("SELECT id, tags FROM t", FetchMethod::All)).await.unwrap();
    assert_eq!(body, json!([["1", "{1,2}"], ["2", "{}"]]));
}

#[tokio::test]
async fn positional_rows_mode() {
    let conn = ScriptedConnection::new().respond(tagged_rows());
    let headers = with_headers(&[("x-row-mode", "array"), ("x-result-mode", "rows")]);
    let body = execute_query(&state(&conn), &headers, local(), query("SELECT id, tags FROM t", FetchMethod::All))
        .await
        .unwrap();
    assert_eq!(body, json!([[1, [1, 2]], [2, []]]));
}

#[tokio::test]
async fn malformed_cells_are_reported_not_fatal() {
    let mut result = tagged_rows();
    result.rows[1] = json!(["2", "{1,2"]);
    let conn = ScriptedConnection::new().respond(result);
    let body = execute_query(&state(&conn), &HeaderMap::new(), local(), query("SELECT id, tags FROM t", FetchMethod::All))
        .await
        .unwrap();
    assert_eq!(body["rows"][0]["tags"], json!([1, 2]));
    assert_eq!(body["rows"][1]["tags"], "{1,2");
    assert_eq!(body["decodeErrors"][0]["row"], 1);
    assert_eq!(body["decodeErrors"][0]["column"], "tags");
}

#[tokio::test]
async fn session_header_carries_captures_between_requests() {
    let conn = ScriptedConnection::new()
        .with_table("accounts", vec![ColumnMetadata::plain("user_id"), ColumnMetadata::plain("provider")])
        .respond(returning_row("INSERT", &[("id", INT4)], &[Some("3")]));
    let state = state(&conn);
    let headers = with_headers(&[("x-session-id", "web-1")]);

    let first = QueryRequest {
        query: "INSERT INTO users (email) VALUES ($1) RETURNING id".into(),
        params: vec![json!("a@example.com")],
        method: FetchMethod::All,
    };
    execute_query(&state, &headers, local(), first).await.unwrap();

    let second = query("INSERT INTO accounts (user_id, provider) VALUES (DEFAULT, 'x')", FetchMethod::All);
    execute_query(&state, &headers, local(), second).await.unwrap();

    let executed = conn.executed();
    assert_eq!(executed[1].0, "INSERT INTO accounts (user_id, provider) VALUES ($1, 'x')");
    assert_eq!(executed[1].1, vec![json!(3)]);
    assert_eq!(conn.connects(), 2);

    // a different caller does not see those captures
    let other = with_headers(&[("x-session-id", "web-2")]);
    let third = query("INSERT INTO accounts (user_id, provider) VALUES (DEFAULT, 'x')", FetchMethod::All);
    execute_query(&state, &other, local(), third).await.unwrap();
    assert!(conn.executed()[2].1.is_empty());
    assert_eq!(state.sessions.len(), 2);
}

#[tokio::test]
async fn batch_body_options_override_headers() {
    let conn = ScriptedConnection::new();
    let headers = with_headers(&[("x-isolation-level", "serializable"), ("x-read-only", "true")]);
    let req = BatchRequest {
        queries: vec![BatchStatement { query: "SELECT 1".into(), params: vec![] }],
        options: Some(BatchOptions { read_only: Some(false), ..Default::default() }),
    };
    let body = execute_batch(&state(&conn), &headers, local(), req).await.unwrap();
    assert_eq!(body["results"].as_array().map(Vec::len), Some(1));
    assert_eq!(conn.commands()[0], "BEGIN ISOLATION LEVEL SERIALIZABLE, READ WRITE");
}

#[tokio::test]
async fn invalid_isolation_is_rejected_before_connecting() {
    let conn = ScriptedConnection::new();
    let headers = with_headers(&[("x-isolation-level", "eventually")]);
    let req = BatchRequest { queries: vec![BatchStatement { query: "SELECT 1".into(), params: vec![] }], options: None };
    let err = execute_batch(&state(&conn), &headers, local(), req).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(conn.connects(), 0);
}

#[tokio::test]
async fn empty_batch_needs_no_connection() {
    let conn = ScriptedConnection::new();
    let req = BatchRequest { queries: vec![], options: None };
    let body = execute_batch(&state(&conn), &HeaderMap::new(), local(), req).await.unwrap();
    assert_eq!(body, json!({ "results": [] }));
    assert_eq!(conn.connects(), 0);
}

#[tokio::test]
async fn identity_falls_back_to_authorization_then_fingerprint() {
    let conn = ScriptedConnection::new();
    let st = state(&conn);
    let auth = with_headers(&[("authorization", "Bearer abc")]);
    let agent = with_headers(&[("user-agent", "curl/8")]);
    for headers in [&auth, &auth, &agent] {
        execute_query(&st, headers, local(), query("SELECT 1", FetchMethod::All)).await.unwrap();
    }
    assert_eq!(st.sessions.len(), 2);
}

#[tokio::test]
async fn malformed_boolean_header_is_a_bad_request() {
    let conn = ScriptedConnection::new();
    let headers = with_headers(&[("x-raw-text", "maybe")]);
    let err = execute_query(&state(&conn), &headers, local(), query("SELECT 1", FetchMethod::All)).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(err.code_str(), "invalid_header");

    let headers = with_headers(&[("x-read-only", "sometimes")]);
    let req = BatchRequest { queries: vec![BatchStatement { query: "SELECT 1".into(), params: vec![] }], options: None };
    let err = execute_batch(&state(&conn), &headers, local(), req).await.unwrap_err();
    assert_eq!(err.http_status(), 400);
    assert_eq!(conn.connects(), 0);
}

#[tokio::test]
async fn unreachable_database_is_service_unavailable() {
    let conn = ScriptedConnection::new().refuse_connections(DbDiagnostic::message_only("connection refused"));
    let err = execute_query(&state(&conn), &HeaderMap::new(), local(), query("SELECT 1", FetchMethod::All))
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), 503);
    let resp = respond(Ok(Err(err)), "query");
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);

    let req = BatchRequest { queries: vec![BatchStatement { query: "SELECT 1".into(), params: vec![] }], options: None };
    let err = execute_batch(&state(&conn), &HeaderMap::new(), local(), req).await.unwrap_err();
    assert_eq!(err.to_body(), json!({"message": "connection refused", "code": "connection_failed"}));
    assert!(conn.executed().is_empty());
}

#[test]
fn error_and_panic_responses() {
    let err = AppError::database(DbDiagnostic::message_only("relation \"nope\" does not exist"));
    assert_eq!(respond(Ok(Err(err)), "query").status(), StatusCode::BAD_REQUEST);
    let decode = AppError::decode("decode_error", "bad array");
    assert_eq!(respond(Ok(Err(decode)), "query").status(), StatusCode::BAD_GATEWAY);
    assert_eq!(respond(Err(Box::new("boom") as Box<dyn std::any::Any + Send>), "batch").status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(respond(Ok(Ok(json!({}))), "query").status(), StatusCode::OK);
}

#[test]
fn flags_from_headers() {
    let flags = ResultFlags::from_headers(&with_headers(&[("x-row-mode", "array"), ("x-raw-text", "1"), ("x-result-mode", "ROWS")]));
    assert_eq!(flags.unwrap(), ResultFlags { row_shape: RowShape::Positional, raw_text: true, rows_only: true });
    assert_eq!(ResultFlags::from_headers(&HeaderMap::new()).unwrap(), ResultFlags::default());
    let opts = header_options(&with_headers(&[("x-deferrable", "no"), ("x-read-only", "OFF")])).unwrap();
    assert_eq!(opts.deferrable, Some(false));
    assert_eq!(opts.read_only, Some(false));
    assert_eq!(opts.isolation_level, None);
    assert!(header_options(&with_headers(&[("x-deferrable", "2")])).is_err());
    assert!(ResultFlags::from_headers(&with_headers(&[("x-raw-text", "yes please")])).is_err());
}
