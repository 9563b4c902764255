use indexmap::IndexMap;
use quarry_catalog::Filters;
use quarry_llm::{Message, Role, Usage};
use quarry_store::{ExecutionResult, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `POST /v1/analytics`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsRequest {
    #[serde(default)]
    pub question: Option<String>,
    /// Declared dataset the question is about
    #[serde(default)]
    pub chart_id: Option<String>,
    #[serde(default)]
    pub filters: Option<Filters>,
    /// Earlier turns, as sent by the caller; entries are sanitized before use
    #[serde(default)]
    pub conversation_history: Option<Vec<Value>>,
}

impl AnalyticsRequest {
    /// The trimmed question, if one was asked
    pub fn question(&self) -> Option<&str> {
        self.question.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// The requested dataset id, ignoring blanks
    pub fn chart_id(&self) -> Option<&str> {
        self.chart_id.as_deref().map(str::trim).filter(|id| !id.is_empty())
    }

    /// Caller history with unusable entries dropped
    pub fn history(&self) -> Vec<Message> {
        self.conversation_history
            .iter()
            .flatten()
            .filter_map(Message::sanitize)
            .collect()
    }

    /// Text of the turn being answered: the question, else the latest user turn
    pub(crate) fn latest_user_text(history: &[Message], question: Option<&str>) -> Option<String> {
        question.map(str::to_owned).or_else(|| {
            history
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.clone())
        })
    }
}

/// Successful answer to an analytics request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    pub success: bool,
    pub reply: String,
    /// Query whose rows the reply is based on
    pub sql: Option<String>,
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub duration_ms: Option<u64>,
    pub chart_id: Option<String>,
    /// Backend that produced the final reply
    pub backend_used: Option<String>,
    /// Tokens spent across every completion of the turn
    pub usage: Option<Usage>,
}

impl AnalyticsResponse {
    /// A reply carrying no rows
    pub(crate) fn reply_only(reply: impl Into<String>) -> Self {
        Self {
            success: true,
            reply: reply.into(),
            sql: None,
            rows: Vec::new(),
            row_count: 0,
            columns: Vec::new(),
            duration_ms: None,
            chart_id: None,
            backend_used: None,
            usage: None,
        }
    }

    pub(crate) fn with_result(mut self, sql: &str, result: ExecutionResult) -> Self {
        self.duration_ms = Some(result.duration_ms());
        self.sql = Some(sql.to_owned());
        self.rows = result.rows;
        self.row_count = result.row_count;
        self.columns = result.columns;
        self
    }
}

/// Body of `POST /v1/datasets/{id}`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub success: bool,
    pub id: String,
    pub sql: String,
    /// Filters as bound, after defaults and canonicalization
    pub filters: IndexMap<String, String>,
    pub rows: Vec<Row>,
    pub row_count: u64,
    pub columns: Vec<String>,
    pub duration_ms: u64,
}
