use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::json;

use pgtunnel::client::{ProxyClient, RemoteError};
use pgtunnel::db::scripted::returning_row;
use pgtunnel::db::{ColumnMetadata, ScriptedConnection};
use pgtunnel::decode::{RowShape, TypeRegistry};
use pgtunnel::error::DbDiagnostic;
use pgtunnel::server::{router, AppState};
use pgtunnel::session::SessionStore;
use pgtunnel::wire::{BatchOptions, Column, QueryResult};

const INT4: i32 = 23;
const TEXT_ARRAY: i32 = 1009;

async fn serve(conn: ScriptedConnection) -> String {
    let state = AppState::new(Arc::new(SessionStore::default()), TypeRegistry::new(), conn);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
            .await
            .unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn batch_then_query_through_http() {
    let conn = ScriptedConnection::new()
        .with_table("accounts", vec![ColumnMetadata::plain("user_id"), ColumnMetadata::plain("provider")])
        .respond(returning_row("INSERT", &[("id", INT4)], &[Some("7")]))
        .respond(returning_row("INSERT", &[("user_id", INT4)], &[Some("7")]))
        .respond(QueryResult {
            command: "SELECT".into(),
            fields: vec![
                Column { name: "user_id".into(), type_id: INT4, ordinal: 0 },
                Column { name: "scopes".into(), type_id: TEXT_ARRAY, ordinal: 1 },
            ],
            row_count: 1,
            rows: vec![json!(["7", "{read,\"write,all\",NULL}"])],
        });
    let base = serve(conn.clone()).await;
    let client = ProxyClient::new(&base).unwrap().with_session("it-1");

    let results = client
        .batch(
            vec![
                ("INSERT INTO users (email) VALUES ($1) RETURNING id".into(), vec![json!("a@example.com")]),
                ("INSERT INTO accounts (user_id, provider) VALUES (DEFAULT, $1) RETURNING user_id".into(), vec![json!("gh")]),
            ],
            Some(BatchOptions { isolation_level: Some("read committed".into()), ..Default::default() }),
        )
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].rows, vec![json!({"id": 7})]);
    assert_eq!(conn.commands(), vec!["BEGIN ISOLATION LEVEL READ COMMITTED", "COMMIT"]);
    assert_eq!(conn.executed()[1].0, "INSERT INTO accounts (user_id, provider) VALUES ($2, $1) RETURNING user_id");

    let projection = client
        .with_row_shape(RowShape::Positional)
        .query("SELECT user_id, scopes FROM accounts", vec![])
        .await
        .unwrap();
    assert_eq!(projection.rows, vec![json!([7, ["read", "write,all", null]])]);
}

#[tokio::test]
async fn database_error_body_reaches_the_client() {
    let conn = ScriptedConnection::new().fail(DbDiagnostic {
        code: Some("42P01".into()),
        table: Some("nope".into()),
        ..DbDiagnostic::message_only("relation \"nope\" does not exist")
    });
    let base = serve(conn).await;
    let err = ProxyClient::new(&base).unwrap().query("SELECT * FROM nope", vec![]).await.unwrap_err();
    let remote = err.downcast_ref::<RemoteError>().expect("remote error");
    assert_eq!(remote.status, 400);
    assert_eq!(remote.body["code"], "42P01");
    assert_eq!(remote.body["table"], "nope");
    assert_eq!(remote.body["message"], "relation \"nope\" does not exist");
}
