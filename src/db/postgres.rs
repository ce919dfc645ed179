use futures_util::{pin_mut, TryStreamExt};
use serde_json::Value;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config, NoTls};
use tracing::{debug, warn};

use super::params::SqlParam;
use super::text::TextCell;
use super::{command_word, ColumnMetadata, Connector, SqlConnection};
use crate::error::DbDiagnostic;
use crate::wire::{Column, QueryResult};

/// Columns of a table with the first foreign key each one takes part in.
const TABLE_COLUMNS_SQL: &str = "\
SELECT a.attname::text, NOT a.attnotnull,
  (SELECT fc.relname::text FROM pg_constraint k JOIN pg_class fc ON fc.oid = k.confrelid
     WHERE k.conrelid = c.oid AND k.contype = 'f' AND a.attnum = ANY(k.conkey) LIMIT 1),
  (SELECT fa.attname::text FROM pg_constraint k
     JOIN pg_attribute fa ON fa.attrelid = k.confrelid AND fa.attnum = k.confkey[array_position(k.conkey, a.attnum)]
     WHERE k.conrelid = c.oid AND k.contype = 'f' AND a.attnum = ANY(k.conkey) LIMIT 1)
FROM pg_attribute a
JOIN pg_class c ON c.oid = a.attrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relname = $1 AND n.nspname = COALESCE($2, current_schema())
  AND a.attnum > 0 AND NOT a.attisdropped
ORDER BY a.attnum";

/// A single tokio-postgres session. Statements run on it in order; the
/// connection driver runs on its own task until the client is dropped.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    pub async fn connect(config: &Config) -> Result<Self, DbDiagnostic> {
        let (client, connection) = config.connect(NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(target: "db", error = %e, "postgres connection error");
            }
        });
        Ok(PgConnection { client })
    }

    pub fn from_client(client: Client) -> Self { PgConnection { client } }
}

/// Opens a fresh [`PgConnection`] from a parsed configuration.
#[derive(Clone)]
pub struct PgConnector {
    config: Config,
}

impl PgConnector {
    pub fn new(config: Config) -> Self { PgConnector { config } }
}

impl Connector for PgConnector {
    type Conn = PgConnection;

    async fn connect(&self) -> Result<PgConnection, DbDiagnostic> {
        PgConnection::connect(&self.config).await
    }
}

impl SqlConnection for PgConnection {
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult, DbDiagnostic> {
        let stmt = self.client.prepare(sql).await?;
        let fields: Vec<Column> = stmt
            .columns()
            .iter()
            .enumerate()
            .map(|(ordinal, c)| Column { name: c.name().to_string(), type_id: c.type_().oid() as i32, ordinal })
            .collect();

        let bound: Vec<SqlParam<'_>> = params.iter().map(SqlParam).collect();
        let refs: Vec<&(dyn ToSql + Sync)> = bound.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let stream = self.client.query_raw(&stmt, refs).await?;
        pin_mut!(stream);

        let mut rows = Vec::new();
        while let Some(row) = stream.try_next().await? {
            let mut cells = Vec::with_capacity(row.len());
            for i in 0..row.len() {
                let TextCell(text) = row.try_get::<_, TextCell>(i)?;
                cells.push(text.map(Value::String).unwrap_or(Value::Null));
            }
            rows.push(Value::Array(cells));
        }
        let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);
        debug!(target: "db", rows = rows.len(), row_count = row_count, "statement executed");
        Ok(QueryResult { command: command_word(sql), fields, row_count, rows })
    }

    async fn command(&mut self, sql: &str) -> Result<(), DbDiagnostic> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    async fn table_columns(&mut self, schema: Option<&str>, table: &str) -> Result<Vec<ColumnMetadata>, DbDiagnostic> {
        let rows = self.client.query(TABLE_COLUMNS_SQL, &[&table, &schema]).await?;
        rows.iter()
            .map(|r| -> Result<ColumnMetadata, DbDiagnostic> {
                Ok(ColumnMetadata {
                    name: r.try_get(0)?,
                    is_nullable: r.try_get(1)?,
                    referenced_table: r.try_get(2)?,
                    referenced_column: r.try_get(3)?,
                })
            })
            .collect()
    }
}
