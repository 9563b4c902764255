//! Instructions sent to the completion backend at each protocol step

use indexmap::IndexMap;
use indoc::{formatdoc, indoc};
use quarry_guard::{CLOSE_DELIMITER, OPEN_DELIMITER};
use quarry_store::{ExecutionResult, Row};

/// Question used when a dataset is requested without one
pub const DEFAULT_QUESTION: &str = "Analyze this dataset and point out the most important business insights.";

/// Built-in system instructions
pub fn default_system_prompt(assistant_name: &str) -> String {
    formatdoc! {"
        You are {assistant_name}, a data analyst embedded in an analytics dashboard. \
        Base every insight on the SQL results you are given. \
        Keep a concise, professional tone with no emojis and no filler. \
        Open with a bold **Executive Summary** of one or two sentences, then use bold section headings \
        such as **Key Metrics** and **Recommended Actions** with `- ` bullet lists. \
        Explain what the numbers mean for the business, call out notable changes and suggest follow-up actions. \
        When the data you have cannot answer the question, reply with a single read-only SELECT query wrapped in \
        {OPEN_DELIMITER}...{CLOSE_DELIMITER} and wait for its result before drawing conclusions. \
        Respond in markdown only."
    }
}

/// Context for a conversation with no dataset attached
pub const GENERAL_CONVERSATION: &str = indoc! {"
    This is a general analytics conversation: the user may ask about any metric in the business. \
    Use the schema description to write read-only SELECT queries when data is needed."
};

/// Sent before drafting: the backend must answer with a delimited query
pub fn draft_instruction() -> String {
    format!(
        "If answering needs data you have not been given, reply with one read-only SELECT query wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER}."
    )
}

/// The dataset answers the question; no further query is wanted
pub const DATASET_SUFFICIENT: &str = indoc! {"
    The dataset above already holds every value needed. Do not request or write additional SQL. \
    Give insights and recommended actions based only on the provided rows."
};

/// The dataset cannot answer the question; a query is wanted
pub fn dataset_insufficient(extra: Option<&str>) -> String {
    let mut instruction = format!(
        "The dataset above does not contain what this question needs. Write a read-only SELECT query wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER} that fetches it. The dataset is only context."
    );

    if let Some(extra) = extra {
        instruction.push(' ');
        instruction.push_str(extra);
    }

    instruction
}

/// Fall back to the dataset after the guard refused a query proposed for it
pub fn dataset_insights_only(reason: &str) -> String {
    format!(
        "That statement is not allowed ({reason}). Do not write SQL. Give insights and recommended actions \
         based only on the dataset above."
    )
}

/// Nudge after a draft reply without a query
pub fn missing_query() -> String {
    format!(
        "You did not provide SQL. Reply with only the SELECT query required, wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER}, and no commentary."
    )
}

/// Nudge after a corrective reply without a query
pub fn still_missing_query() -> String {
    format!(
        "There is still no SQL in your reply. Reply with only the SELECT query required, wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER}, and no narration."
    )
}

/// Corrective prompt after the guard refused a query
pub fn unsupported_statement(reason: &str) -> String {
    format!(
        "That statement is not allowed ({reason}). Provide a single read-only SELECT query wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER} with no commentary."
    )
}

/// Corrective prompt after the store rejected a query
pub fn execution_failed(error: &str) -> String {
    format!(
        "The SQL failed with this error: {error}. Provide a corrected SELECT query wrapped in \
         {OPEN_DELIMITER}...{CLOSE_DELIMITER} with no commentary."
    )
}

/// Describe a fetched dataset for the backend
pub fn dataset_context(
    id: &str,
    filters: &IndexMap<String, String>,
    sql: &str,
    result: &ExecutionResult,
    preview_rows: usize,
) -> String {
    let filters = if filters.is_empty() {
        "none".to_owned()
    } else {
        filters
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let preview = &result.rows[..result.rows.len().min(preview_rows)];

    formatdoc! {"
        Dataset: {id}

        Applied filters: {filters}

        SQL executed:
        {sql}

        Rows returned: {row_count}

        Preview (first {shown} rows):
        {preview}",
        sql = sql.trim(),
        row_count = result.row_count,
        shown = preview.len(),
        preview = pretty_rows(preview),
    }
}

/// Hand the executed rows back for the final narrative
pub fn result_summary(result: &ExecutionResult) -> String {
    let columns = if result.columns.is_empty() {
        "n/a".to_owned()
    } else {
        result.columns.join(", ")
    };

    formatdoc! {"
        The SQL query ran successfully.

        Rows returned: {row_count}

        Columns: {columns}

        Execution time: {duration} ms

        Sample rows:
        {rows}

        Write one consolidated analysis of these results. Do not repeat earlier interim replies or produce \
        more than one executive summary; answer once, with the usual bold headings and bullet lists.",
        row_count = result.row_count,
        duration = result.duration_ms(),
        rows = pretty_rows(&result.rows),
    }
}

/// System message carrying the introspected schema
pub fn schema_summary(summary: &str) -> String {
    format!("Database schema summary (table(column TYPE, ...)):\n{summary}")
}

fn pretty_rows(rows: &[Row]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_owned())
}
