//! PostgreSQL warehouse.
//!
//! Every unit of work opens its own [`Session`]; the connection closes when
//! the session is dropped. A load is two units: the cascading drop (its own
//! session, committed on execution) and the create-and-copy (a second
//! session, one transaction). If the copy fails the table stays absent.

pub mod report;
pub mod schema;

use std::ops::{Deref, DerefMut};
use std::time::Instant;

use async_trait::async_trait;
use futures::pin_mut;
use tokio_postgres::binary_copy::BinaryCopyInWriter;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, NoTls};

use crate::config::DbConfig;
use crate::error::{DatabaseError, DatabaseResult};
use crate::logs::{log_info_indent, log_success_indent, log_warning};
use crate::models::{Batch, LoadStats};

pub use report::{Report, RevenueReport, RevenueReporter};
pub use schema::{ColumnType, TableSchema};

/// Replaces a table with the contents of a batch.
#[async_trait]
pub trait Load: Send + Sync {
    async fn replace(&self, table: &str, batch: Batch) -> DatabaseResult<LoadStats>;
}

/// Connection factory for the warehouse database.
#[derive(Debug, Clone)]
pub struct Warehouse {
    db: DbConfig,
}

impl Warehouse {
    pub fn new(db: DbConfig) -> Self {
        Self { db }
    }

    /// Open a session. The connection lives as long as the session.
    pub async fn connect(&self) -> DatabaseResult<Session> {
        let (client, connection) =
            self.db
                .pg_config()
                .connect(NoTls)
                .await
                .map_err(|source| DatabaseError::Connect {
                    url: self.db.redacted_url(),
                    source,
                })?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log_warning(format!("connection closed with error: {}", e));
            }
        });
        Ok(Session { client })
    }

    /// Drop a table and everything depending on it.
    pub async fn drop_table(&self, table: &str) -> DatabaseResult<()> {
        schema::validate_table_name(table)?;
        let session = self.connect().await?;
        session
            .batch_execute(&schema::drop_sql(table))
            .await
            .map_err(statement(table, "drop"))
    }

    /// Row count and column names of a table, or `None` if it is absent.
    pub async fn describe(&self, table: &str) -> DatabaseResult<Option<LoadStats>> {
        schema::validate_table_name(table)?;
        let session = self.connect().await?;

        let columns: Vec<String> = session
            .query(
                "SELECT column_name::text FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name::text = $1 \
                 ORDER BY ordinal_position",
                &[&table],
            )
            .await
            .map_err(statement(table, "describe"))?
            .iter()
            .map(|row| row.get(0))
            .collect();

        if columns.is_empty() {
            return Ok(None);
        }

        let count: i64 = session
            .query_one(
                format!("SELECT COUNT(*) FROM {}", schema::quote_ident(table)).as_str(),
                &[],
            )
            .await
            .map_err(statement(table, "count"))?
            .get(0);

        Ok(Some(LoadStats {
            table: table.to_string(),
            rows: count as u64,
            columns,
        }))
    }

    /// Create the table and stream the rows in one transaction.
    async fn create_and_copy(&self, schema: &TableSchema, batch: &Batch) -> DatabaseResult<u64> {
        let table = schema.table.as_str();
        let mut session = self.connect().await?;
        let tx = session
            .transaction()
            .await
            .map_err(statement(table, "begin"))?;

        tx.batch_execute(&schema.creates())
            .await
            .map_err(statement(table, "create"))?;

        let sink = tx
            .copy_in(schema.copy().as_str())
            .await
            .map_err(statement(table, "copy"))?;
        let types = schema.types();
        let writer = BinaryCopyInWriter::new(sink, &types);
        pin_mut!(writer);
        for row in &batch.rows {
            let cells = schema.cells(row);
            let values: Vec<&(dyn ToSql + Sync)> =
                cells.iter().map(|c| c as &(dyn ToSql + Sync)).collect();
            writer
                .as_mut()
                .write(&values)
                .await
                .map_err(statement(table, "copy"))?;
        }
        let rows = writer
            .finish()
            .await
            .map_err(statement(table, "copy"))?;

        tx.commit().await.map_err(statement(table, "commit"))?;
        Ok(rows)
    }
}

#[async_trait]
impl Load for Warehouse {
    async fn replace(&self, table: &str, batch: Batch) -> DatabaseResult<LoadStats> {
        let start = Instant::now();
        let schema = TableSchema::infer(table, &batch)?;

        self.drop_table(table).await?;
        log_info_indent(format!("dropped {} (cascade)", table), 1);

        let rows = self.create_and_copy(&schema, &batch).await?;
        log_success_indent(
            format!(
                "{} rows x {} columns into {} in {:.2?}",
                rows,
                schema.columns.len(),
                table,
                start.elapsed()
            ),
            1,
        );

        Ok(LoadStats {
            table: table.to_string(),
            rows,
            columns: batch.headers,
        })
    }
}

/// A checked-out connection. Dropping it closes the connection.
pub struct Session {
    client: Client,
}

impl Deref for Session {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl DerefMut for Session {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}

fn statement<'a>(
    table: &'a str,
    action: &'static str,
) -> impl Fn(tokio_postgres::Error) -> DatabaseError + 'a {
    move |source| DatabaseError::Statement {
        table: table.to_string(),
        action,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warehouse() -> Warehouse {
        Warehouse::new(DbConfig {
            host: "localhost".into(),
            port: 5432,
            user: "loader".into(),
            password: "secret".into(),
            dbname: "ecommerce_dw".into(),
        })
    }

    #[tokio::test]
    async fn test_replace_rejects_bad_table_before_connecting() {
        let mut batch = Batch::new(vec!["order_id".into()]);
        batch.rows.push(vec![Some("o1".into())]);

        let err = warehouse().replace("fact orders; --", batch).await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidIdentifier(_)));
    }

    #[tokio::test]
    async fn test_describe_rejects_bad_table_before_connecting() {
        let err = warehouse().describe("Fact_Orders").await.unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidIdentifier(ref t) if t == "Fact_Orders"));
    }
}
