use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Role of a message participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instruction
    System,
    /// User message
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse a role name, falling back to `User` for anything unrecognised
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            _ => Self::User,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Coerce an untrusted history entry into a message
    ///
    /// Unknown or missing roles become `user`. String content is kept as is;
    /// any other content is carried as its JSON text. Entries that are not
    /// objects, or that have no content at all, are dropped.
    pub fn sanitize(entry: &Value) -> Option<Self> {
        let object = entry.as_object()?;

        let role = object
            .get("role")
            .and_then(Value::as_str)
            .map_or(Role::User, Role::parse_lenient);

        let content = match object.get("content")? {
            Value::Null => return None,
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };

        Some(Self::new(role, content))
    }
}
