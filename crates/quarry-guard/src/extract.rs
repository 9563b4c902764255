use std::sync::OnceLock;

use regex::Regex;

use crate::{CLOSE_DELIMITER, OPEN_DELIMITER};

fn delimited_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<SQL>(.*?)</SQL>").expect("valid delimiter regex"))
}

fn fenced_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```sql[ \t]*\r?\n?(.*?)```").expect("valid fence regex"))
}

fn inner_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\A\s*```[A-Za-z]*[ \t]*\r?\n?(.*?)```\s*\z").expect("valid inner fence regex"))
}

/// Pull the first query candidate out of generated text
///
/// A `<SQL>...</SQL>` block wins over a fenced ```` ```sql ```` block. The
/// body is normalized; an empty body counts as no candidate. A code fence
/// wrapped inside the delimiters is unwrapped first.
pub fn extract_candidate(text: &str) -> Option<String> {
    let body = delimited_regex()
        .captures(text)
        .or_else(|| fenced_regex().captures(text))
        .and_then(|captures| captures.get(1))?
        .as_str();

    let body = inner_fence_regex()
        .captures(body)
        .and_then(|captures| captures.get(1))
        .map_or(body, |inner| inner.as_str());

    let candidate = normalize(body);

    if candidate.is_empty() { None } else { Some(candidate) }
}

/// Trim whitespace and any trailing statement terminators
pub fn normalize(statement: &str) -> String {
    statement
        .trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_owned()
}

/// Render a query the way models are asked to propose one
pub fn wrap_candidate(query: &str) -> String {
    format!("{OPEN_DELIMITER}{query}{CLOSE_DELIMITER}")
}
