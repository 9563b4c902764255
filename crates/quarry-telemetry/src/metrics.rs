//! Metric instruments for completions, quota and store queries
//!
//! Instruments come from the global meter, so they record nothing until
//! [`crate::init`] installs an exporting meter provider.

use std::{sync::OnceLock, time::Duration};

use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

pub const COMPLETION_REQUESTS: &str = "quarry.completion.requests";
pub const COMPLETION_TOKENS: &str = "quarry.completion.tokens";
pub const COMPLETION_DURATION: &str = "quarry.completion.duration";
pub const QUOTA_COOLDOWNS: &str = "quarry.quota.cooldowns";
pub const STORE_QUERIES: &str = "quarry.store.queries";
pub const STORE_QUERY_DURATION: &str = "quarry.store.query.duration";

struct Instruments {
    completion_requests: Counter<u64>,
    completion_tokens: Counter<u64>,
    completion_duration: Histogram<f64>,
    quota_cooldowns: Counter<u64>,
    store_queries: Counter<u64>,
    store_query_duration: Histogram<f64>,
}

fn instruments() -> &'static Instruments {
    static INSTRUMENTS: OnceLock<Instruments> = OnceLock::new();

    INSTRUMENTS.get_or_init(|| {
        let meter = global::meter("quarry");

        Instruments {
            completion_requests: meter.u64_counter(COMPLETION_REQUESTS).build(),
            completion_tokens: meter.u64_counter(COMPLETION_TOKENS).build(),
            completion_duration: meter.f64_histogram(COMPLETION_DURATION).with_unit("s").build(),
            quota_cooldowns: meter.u64_counter(QUOTA_COOLDOWNS).build(),
            store_queries: meter.u64_counter(STORE_QUERIES).build(),
            store_query_duration: meter.f64_histogram(STORE_QUERY_DURATION).with_unit("s").build(),
        }
    })
}

/// Count one completion attempt against a backend and time it
pub fn record_completion(backend: &str, outcome: &'static str, elapsed: Duration) {
    let attributes = [
        KeyValue::new("backend", backend.to_owned()),
        KeyValue::new("outcome", outcome),
    ];

    let instruments = instruments();
    instruments.completion_requests.add(1, &attributes);
    instruments.completion_duration.record(elapsed.as_secs_f64(), &attributes);
}

/// Add reported token usage for a backend
pub fn record_tokens(backend: &str, prompt_tokens: u64, completion_tokens: u64) {
    let instruments = instruments();

    instruments.completion_tokens.add(
        prompt_tokens,
        &[
            KeyValue::new("backend", backend.to_owned()),
            KeyValue::new("kind", "prompt"),
        ],
    );
    instruments.completion_tokens.add(
        completion_tokens,
        &[
            KeyValue::new("backend", backend.to_owned()),
            KeyValue::new("kind", "completion"),
        ],
    );
}

pub fn record_cooldown(backend: &str) {
    instruments()
        .quota_cooldowns
        .add(1, &[KeyValue::new("backend", backend.to_owned())]);
}

/// Count one store execution and time it
pub fn record_query(outcome: &'static str, elapsed: Duration) {
    let attributes = [KeyValue::new("outcome", outcome)];

    let instruments = instruments();
    instruments.store_queries.add(1, &attributes);
    instruments.store_query_duration.record(elapsed.as_secs_f64(), &attributes);
}
