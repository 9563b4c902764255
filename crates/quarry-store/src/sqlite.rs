use std::str::FromStr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures_util::TryStreamExt;
use quarry_config::StoreConfig;
use quarry_core::QueryParam;
use quarry_telemetry::metrics;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row as _, TypeInfo, ValueRef};

use crate::QueryStore;
use crate::error::StoreError;
use crate::result::{ColumnSchema, ExecutionResult, Row, TableSchema};

/// SQLite store opened read-only
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    sample_rows: usize,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open a read-only pool from configuration
    ///
    /// Every pooled connection also runs `PRAGMA query_only = ON`.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(StoreError::Connect)?
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout_duration())
            .idle_timeout(config.idle_timeout_duration())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    sqlx::query("PRAGMA query_only = ON").execute(&mut *conn).await?;
                    sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .connect_with(options)
            .await
            .map_err(StoreError::Connect)?;

        tracing::info!(
            url = %config.url,
            max_connections = config.max_connections,
            sample_rows = config.sample_rows,
            "store connected"
        );

        Ok(Self::from_pool(pool, config.sample_rows, config.query_timeout_duration()))
    }

    /// Wrap an existing pool
    ///
    /// The caller is responsible for the pool being read-only.
    pub const fn from_pool(pool: SqlitePool, sample_rows: usize, query_timeout: Duration) -> Self {
        Self {
            pool,
            sample_rows,
            query_timeout,
        }
    }

    async fn run(&self, query: &str, params: &[QueryParam]) -> Result<ExecutionResult, StoreError> {
        let mut statement = sqlx::query(query);

        for param in params {
            statement = match param {
                QueryParam::Null => statement.bind(None::<String>),
                QueryParam::Integer(value) => statement.bind(*value),
                QueryParam::Text(value) => statement.bind(value.clone()),
            };
        }

        let mut result = ExecutionResult::default();
        let mut rows = statement.fetch(&self.pool);

        while let Some(row) = rows.try_next().await? {
            if result.columns.is_empty() {
                result.columns = unique_column_names(row.columns().iter().map(Column::name));
            }

            result.row_count += 1;

            if result.rows.len() < self.sample_rows {
                result.rows.push(row_to_json(&row, &result.columns));
            }
        }

        drop(rows);

        // Column names of an empty result come from the prepared statement
        if result.columns.is_empty() {
            let described = (&self.pool).describe(query).await?;
            result.columns = unique_column_names(described.columns().iter().map(Column::name));
        }

        Ok(result)
    }
}

#[async_trait]
impl QueryStore for SqliteStore {
    async fn execute(&self, query: &str, params: &[QueryParam]) -> Result<ExecutionResult, StoreError> {
        let start = Instant::now();

        let outcome = tokio::time::timeout(self.query_timeout, self.run(query, params)).await;
        let elapsed = start.elapsed();

        match outcome {
            Ok(Ok(mut result)) => {
                result.duration = elapsed;
                metrics::record_query("success", elapsed);
                tracing::debug!(
                    row_count = result.row_count,
                    elapsed_ms = result.duration_ms(),
                    "query executed"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                metrics::record_query("error", elapsed);
                tracing::warn!(error = %error, "query failed");
                Err(error)
            }
            Err(_) => {
                metrics::record_query("timeout", elapsed);
                tracing::warn!(timeout_secs = self.query_timeout.as_secs(), "query timed out");
                Err(StoreError::Timeout(self.query_timeout))
            }
        }
    }

    async fn schema(&self) -> Result<Vec<TableSchema>, StoreError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut tables = Vec::with_capacity(names.len());

        for name in names {
            let columns = sqlx::query("SELECT name, type FROM pragma_table_info(?1) ORDER BY cid")
                .bind(&name)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|row| {
                    Ok(ColumnSchema {
                        name: row.try_get("name")?,
                        data_type: row.try_get("type")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?;

            tables.push(TableSchema { name, columns });
        }

        Ok(tables)
    }
}

/// Column names with repeats suffixed (`id`, `id_2`, ...) so every cell keeps a key
fn unique_column_names<'a>(names: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::new();

    for name in names {
        let mut candidate = name.to_owned();
        let mut n = 1;

        while unique.contains(&candidate) {
            n += 1;
            candidate = format!("{name}_{n}");
        }

        unique.push(candidate);
    }

    unique
}

fn row_to_json(row: &SqliteRow, columns: &[String]) -> Row {
    row.columns()
        .iter()
        .zip(columns)
        .map(|(column, name)| (name.clone(), decode_value(row, column.ordinal())))
        .collect()
}

/// Decode one cell by its runtime storage class
fn decode_value(row: &SqliteRow, index: usize) -> Value {
    let Ok(raw) = row.try_get_raw(index) else {
        return Value::Null;
    };

    if raw.is_null() {
        return Value::Null;
    }

    let type_name = raw.type_info().name().to_ascii_uppercase();

    let decoded = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(index).ok().map(Value::from),
        "REAL" | "NUMERIC" => row
            .try_get::<f64, _>(index)
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(index)
            .ok()
            .map(|bytes| Value::String(BASE64.encode(bytes))),
        _ => None,
    };

    decoded
        .or_else(|| row.try_get::<String, _>(index).ok().map(Value::String))
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    async fn seeded_store(sample_rows: usize) -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shop.db");

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(SqliteConnectOptions::new().filename(&path).create_if_missing(true))
            .await
            .unwrap();

        sqlx::raw_sql(
            "CREATE TABLE orders (id INTEGER PRIMARY KEY, province TEXT NOT NULL, total REAL NOT NULL, receipt BLOB);
             INSERT INTO orders (province, total, receipt) VALUES
               ('Jakarta', 120.5, x'CAFE'),
               ('Bali', 80.0, NULL),
               ('Jakarta', 42.25, NULL),
               ('Banten', 10.0, NULL);",
        )
        .execute(&writer)
        .await
        .unwrap();
        writer.close().await;

        let config: StoreConfig = toml::from_str(&format!(
            "url = \"sqlite://{}\"\nsample_rows = {sample_rows}\nquery_timeout = \"5s\"",
            path.display()
        ))
        .unwrap();

        let store = SqliteStore::connect(&config).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn rows_are_sampled_but_counted() {
        let (_dir, store) = seeded_store(2).await;

        let result = store.execute("SELECT id, province FROM orders ORDER BY id", &[]).await.unwrap();

        assert_eq!(result.row_count, 4);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.columns, ["id", "province"]);
        assert_eq!(result.rows[0]["province"], json!("Jakarta"));
    }

    #[tokio::test]
    async fn values_decode_by_storage_class() {
        let (_dir, store) = seeded_store(50).await;

        let result = store
            .execute("SELECT id, total, receipt FROM orders WHERE id = 1", &[])
            .await
            .unwrap();

        let row = &result.rows[0];
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["total"], json!(120.5));
        assert_eq!(row["receipt"], json!("yv4="));
    }

    #[tokio::test]
    async fn params_are_bound_positionally() {
        let (_dir, store) = seeded_store(50).await;
        let query = "SELECT province, SUM(total) AS total FROM orders WHERE (?1 IS NULL OR province = ?1) GROUP BY province ORDER BY province";

        let all = store.execute(query, &[QueryParam::Null]).await.unwrap();
        assert_eq!(all.row_count, 3);

        let jakarta = store
            .execute(query, &[QueryParam::Text("Jakarta".to_owned())])
            .await
            .unwrap();
        assert_eq!(jakarta.row_count, 1);
        assert_eq!(jakarta.rows[0]["total"], json!(162.75));
    }

    #[tokio::test]
    async fn repeated_column_names_keep_every_value() {
        let (_dir, store) = seeded_store(50).await;

        let result = store
            .execute(
                "SELECT a.id, b.id, a.province FROM orders a JOIN orders b ON b.id = a.id + 1 WHERE a.id = 1",
                &[],
            )
            .await
            .unwrap();

        assert_eq!(result.columns, ["id", "id_2", "province"]);
        let row = &result.rows[0];
        assert_eq!(row.len(), 3);
        assert_eq!(row["id"], json!(1));
        assert_eq!(row["id_2"], json!(2));
    }

    #[test]
    fn suffixes_skip_names_already_taken() {
        let names = unique_column_names(["id", "id_2", "id", "total"].into_iter());
        assert_eq!(names, ["id", "id_2", "id_3", "total"]);
    }

    #[tokio::test]
    async fn empty_results_still_report_columns() {
        let (_dir, store) = seeded_store(50).await;

        let result = store
            .execute("SELECT province, total FROM orders WHERE total > 1000", &[])
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.columns, ["province", "total"]);
    }

    #[tokio::test]
    async fn writes_fail_at_the_connection() {
        let (_dir, store) = seeded_store(50).await;

        let err = store.execute("DELETE FROM orders", &[]).await.unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));

        let still_there = store.execute("SELECT COUNT(*) AS n FROM orders", &[]).await.unwrap();
        assert_eq!(still_there.rows[0]["n"], json!(4));
    }

    #[tokio::test]
    async fn database_errors_keep_their_message() {
        let (_dir, store) = seeded_store(50).await;

        let err = store.execute("SELECT nope FROM orders", &[]).await.unwrap_err();
        assert!(err.to_string().contains("no such column: nope"));
    }

    #[tokio::test]
    async fn schema_lists_tables_and_columns() {
        let (_dir, store) = seeded_store(50).await;

        let tables = store.schema().await.unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "orders");
        let names: Vec<_> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["id", "province", "total", "receipt"]);
        assert_eq!(tables[0].columns[2].data_type, "REAL");
    }

    #[tokio::test]
    async fn missing_database_fails_to_connect() {
        let config: StoreConfig = toml::from_str("url = \"sqlite:///definitely/not/here.db\"").unwrap();
        assert!(matches!(SqliteStore::connect(&config).await, Err(StoreError::Connect(_))));
    }
}
