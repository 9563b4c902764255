use std::time::Duration;

/// Parse a human duration such as `"30s"`, `"2m"` or `"1h"`
pub(crate) fn parse(value: &str) -> anyhow::Result<Duration> {
    duration_str::parse(value).map_err(|e| anyhow::anyhow!("invalid duration '{value}': {e}"))
}

/// Parse a duration already checked by `Config::validate`, falling back when it is not
pub(crate) fn parse_or(value: &str, fallback: Duration) -> Duration {
    parse(value).unwrap_or(fallback)
}
