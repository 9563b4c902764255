use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;

/// One result row, keyed by column name in select order
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Outcome of a successful query
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Leading rows, capped at the sample size
    pub rows: Vec<Row>,
    /// Rows the query produced, including those not sampled
    pub row_count: u64,
    pub columns: Vec<String>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    /// Whether any column carries `name`, ignoring case
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSchema {
    pub name: String,
    /// Declared type; empty when the column has none
    pub data_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
}

impl TableSchema {
    /// Render tables as `name(col TYPE, ...)` lines for a prompt
    pub fn summarize(tables: &[Self]) -> String {
        let mut summary = String::new();

        for table in tables {
            let columns = table
                .columns
                .iter()
                .map(|column| {
                    if column.data_type.is_empty() {
                        column.name.clone()
                    } else {
                        format!("{} {}", column.name, column.data_type)
                    }
                })
                .collect::<Vec<_>>()
                .join(", ");

            let _ = writeln!(summary, "{}({columns})", table.name);
        }

        summary
    }
}
