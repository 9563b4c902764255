use jiff::civil::Date;
use quarry_core::QueryParam;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CatalogError;

/// Caller-supplied filters keyed by filter name
pub type Filters = serde_json::Map<String, Value>;

/// How a filter value is coerced before binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Text,
    Integer,
    /// Four-digit calendar year, bound as an integer
    Year,
    /// ISO `YYYY-MM-DD`, bound as text
    Date,
}

/// A filter a dataset accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterSpec {
    pub key: String,
    pub kind: FilterKind,
    /// Closed set of accepted values; empty accepts any value of the kind
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed: Vec<String>,
}

impl FilterSpec {
    /// Coerce a raw value into a bound parameter
    ///
    /// Returns `None` when the value means "unset": JSON null, an empty
    /// string, or `"all"` in any case.
    pub(crate) fn coerce(&self, raw: &Value) -> Result<Option<(QueryParam, String)>, CatalogError> {
        let text = match raw {
            Value::Null => return Ok(None),
            Value::String(text) => text.trim().to_owned(),
            Value::Number(number) => number.to_string(),
            Value::Bool(_) | Value::Array(_) | Value::Object(_) => {
                return Err(self.invalid("expected a string or a number"));
            }
        };

        if text.is_empty() || text.eq_ignore_ascii_case("all") {
            return Ok(None);
        }

        self.coerce_text(&text).map(Some)
    }

    pub(crate) fn coerce_text(&self, text: &str) -> Result<(QueryParam, String), CatalogError> {
        let text = if self.allowed.is_empty() {
            text.to_owned()
        } else {
            self.allowed
                .iter()
                .find(|allowed| allowed.eq_ignore_ascii_case(text))
                .cloned()
                .ok_or_else(|| self.invalid(&format!("must be one of {}", self.allowed.join(", "))))?
        };

        let param = match self.kind {
            FilterKind::Text => QueryParam::Text(text),
            FilterKind::Integer => {
                let value = text.parse::<i64>().map_err(|_| self.invalid("expected an integer"))?;
                QueryParam::Integer(value)
            }
            FilterKind::Year => {
                let value = text
                    .parse::<i64>()
                    .ok()
                    .filter(|year| (1000..=9999).contains(year))
                    .ok_or_else(|| self.invalid("expected a four-digit year"))?;
                QueryParam::Integer(value)
            }
            FilterKind::Date => {
                let date: Date = text
                    .parse()
                    .map_err(|e| self.invalid(&format!("expected a YYYY-MM-DD date ({e})")))?;
                QueryParam::Text(date.to_string())
            }
        };

        let shown = param.to_string();

        Ok((param, shown))
    }

    fn invalid(&self, reason: &str) -> CatalogError {
        CatalogError::InvalidFilterValue {
            key: self.key.clone(),
            reason: reason.to_owned(),
        }
    }
}
