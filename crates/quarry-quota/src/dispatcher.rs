use std::{
    collections::HashSet,
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use quarry_config::{LlmConfig, QuotaCeilings};
use serde::Serialize;

use crate::{
    error::QuotaError,
    ledger::{BackendLedger, ReservationMark},
    window::UsageWindow,
};

/// Static description of a backend's identity and ceilings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub id: String,
    pub ceilings: QuotaCeilings,
}

impl BackendDescriptor {
    pub fn new(id: impl Into<String>, ceilings: QuotaCeilings) -> Self {
        Self {
            id: id.into(),
            ceilings,
        }
    }
}

struct BackendSlot {
    descriptor: BackendDescriptor,
    ledger: Mutex<BackendLedger>,
}

/// Selects backends with spare capacity and keeps their usage ledgers
///
/// Shared by every request for the lifetime of the process. Each backend's
/// ledger sits behind its own mutex, and the capacity check plus reservation
/// happen under a single acquisition of it.
pub struct QuotaDispatcher {
    slots: Vec<Arc<BackendSlot>>,
}

impl fmt::Debug for QuotaDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuotaDispatcher")
            .field("backends", &self.backend_ids().collect::<Vec<_>>())
            .finish()
    }
}

impl QuotaDispatcher {
    /// Create a dispatcher over backends listed in priority order
    pub fn new(descriptors: Vec<BackendDescriptor>) -> Self {
        let now = Instant::now();

        let slots = descriptors
            .into_iter()
            .map(|descriptor| {
                Arc::new(BackendSlot {
                    descriptor,
                    ledger: Mutex::new(BackendLedger::new(now)),
                })
            })
            .collect();

        Self { slots }
    }

    /// Create a dispatcher from the configured backends, preserving their order
    pub fn from_config(config: &LlmConfig) -> Self {
        let descriptors = config
            .backends
            .iter()
            .map(|(id, backend)| BackendDescriptor::new(id.clone(), backend.quota))
            .collect();

        Self::new(descriptors)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Backend identifiers in priority order
    pub fn backend_ids(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|slot| slot.descriptor.id.as_str())
    }

    /// Reserve capacity on the first backend that can take `estimated_tokens`
    ///
    /// Backends in `excluded` or under cooldown are skipped. The returned
    /// [`Reservation`] already counts against the backend; settle it with
    /// [`QuotaDispatcher::record_usage`] or let it drop to release it.
    pub fn select_backend(&self, estimated_tokens: u64, excluded: &HashSet<String>) -> Result<Reservation, QuotaError> {
        self.select_backend_at(estimated_tokens, excluded, Instant::now())
    }

    pub(crate) fn select_backend_at(
        &self,
        estimated_tokens: u64,
        excluded: &HashSet<String>,
        now: Instant,
    ) -> Result<Reservation, QuotaError> {
        let mut retry_after: Option<Duration> = None;

        for slot in &self.slots {
            if excluded.contains(&slot.descriptor.id) {
                continue;
            }

            match try_reserve(slot, estimated_tokens, now) {
                Ok(reservation) => return Ok(reservation),
                Err(wait) => retry_after = Some(retry_after.map_or(wait, |current| current.min(wait))),
            }
        }

        tracing::debug!(estimated_tokens, excluded = excluded.len(), "no backend has capacity");

        Err(exhausted(retry_after))
    }

    /// Reserve capacity on one named backend
    pub fn reserve(&self, backend_id: &str, estimated_tokens: u64) -> Result<Reservation, QuotaError> {
        self.reserve_at(backend_id, estimated_tokens, Instant::now())
    }

    pub(crate) fn reserve_at(
        &self,
        backend_id: &str,
        estimated_tokens: u64,
        now: Instant,
    ) -> Result<Reservation, QuotaError> {
        let slot = self
            .slot(backend_id)
            .ok_or_else(|| QuotaError::UnknownBackend(backend_id.to_string()))?;

        try_reserve(slot, estimated_tokens, now).map_err(|wait| exhausted(Some(wait)))
    }

    /// Settle a reservation with the token usage the backend reported
    pub fn record_usage(&self, reservation: Reservation, prompt_tokens: u64, completion_tokens: u64) {
        reservation.settle(prompt_tokens.saturating_add(completion_tokens), Instant::now());
    }

    /// Give back a reservation whose call did not complete
    pub fn release(&self, reservation: Reservation) {
        drop(reservation);
    }

    /// Exclude a backend from selection for `duration`
    pub fn mark_cooldown(&self, backend_id: &str, duration: Duration) {
        self.mark_cooldown_at(backend_id, duration, Instant::now());
    }

    pub(crate) fn mark_cooldown_at(&self, backend_id: &str, duration: Duration, now: Instant) {
        let Some(slot) = self.slot(backend_id) else {
            tracing::warn!(backend = backend_id, "cooldown requested for unknown backend");
            return;
        };

        slot.ledger.lock().mark_cooldown(now + duration);

        tracing::warn!(
            backend = backend_id,
            cooldown_secs = duration.as_secs(),
            "backend placed under cooldown"
        );
    }

    /// Current usage of every backend, in priority order
    pub fn snapshot(&self) -> Vec<BackendUsage> {
        self.snapshot_at(Instant::now())
    }

    pub(crate) fn snapshot_at(&self, now: Instant) -> Vec<BackendUsage> {
        self.slots
            .iter()
            .map(|slot| {
                let mut ledger = slot.ledger.lock();
                ledger.refresh(now);

                BackendUsage {
                    backend_id: slot.descriptor.id.clone(),
                    minute: WindowUsage::from_window(
                        ledger.minute(),
                        slot.descriptor.ceilings.requests_per_minute,
                        slot.descriptor.ceilings.tokens_per_minute,
                        now,
                    ),
                    day: WindowUsage::from_window(
                        ledger.day(),
                        slot.descriptor.ceilings.requests_per_day,
                        slot.descriptor.ceilings.tokens_per_day,
                        now,
                    ),
                    cooldown_remaining_secs: ledger.cooldown_remaining(now).map(|d| d.as_secs().max(1)),
                }
            })
            .collect()
    }

    fn slot(&self, backend_id: &str) -> Option<&Arc<BackendSlot>> {
        self.slots.iter().find(|slot| slot.descriptor.id == backend_id)
    }
}

/// Check and reserve under one lock; on refusal, report how long until it might fit
fn try_reserve(slot: &Arc<BackendSlot>, estimated_tokens: u64, now: Instant) -> Result<Reservation, Duration> {
    let mut ledger = slot.ledger.lock();
    ledger.refresh(now);

    let ceilings = &slot.descriptor.ceilings;

    if !ledger.has_capacity(ceilings, estimated_tokens, now) {
        return Err(ledger.available_in(ceilings, estimated_tokens, now));
    }

    let mark = ledger.reserve(estimated_tokens);
    drop(ledger);

    tracing::debug!(backend = %slot.descriptor.id, estimated_tokens, "reserved backend capacity");

    Ok(Reservation {
        slot: Arc::clone(slot),
        mark,
        settled: false,
    })
}

fn exhausted(retry_after: Option<Duration>) -> QuotaError {
    QuotaError::Exhausted {
        retry_after: retry_after.map_or(1, |wait| wait.as_secs().max(1)),
    }
}

/// Capacity held on one backend for an in-flight completion
///
/// Dropping an unsettled reservation returns its capacity to the ledger,
/// which covers failed calls as well as cancelled request futures.
pub struct Reservation {
    slot: Arc<BackendSlot>,
    mark: ReservationMark,
    settled: bool,
}

impl Reservation {
    pub fn backend_id(&self) -> &str {
        &self.slot.descriptor.id
    }

    pub const fn estimated_tokens(&self) -> u64 {
        self.mark.estimated_tokens
    }

    pub(crate) fn settle(mut self, actual_tokens: u64, now: Instant) {
        self.slot.ledger.lock().settle(self.mark, actual_tokens, now);
        self.settled = true;
    }
}

impl fmt::Debug for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reservation")
            .field("backend", &self.backend_id())
            .field("estimated_tokens", &self.mark.estimated_tokens)
            .finish_non_exhaustive()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.settled {
            self.slot.ledger.lock().release(self.mark, Instant::now());
        }
    }
}

/// Usage of one backend as reported by [`QuotaDispatcher::snapshot`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendUsage {
    pub backend_id: String,
    pub minute: WindowUsage,
    pub day: WindowUsage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowUsage {
    pub requests: u64,
    pub tokens: u64,
    pub request_limit: Option<u64>,
    pub token_limit: Option<u64>,
    pub resets_in_secs: u64,
}

impl WindowUsage {
    fn from_window(window: &UsageWindow, request_limit: Option<u64>, token_limit: Option<u64>, now: Instant) -> Self {
        Self {
            requests: window.requests(),
            tokens: window.tokens(),
            request_limit,
            token_limit,
            resets_in_secs: window.resets_in(now).as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use rand::Rng;

    use super::*;

    fn ceilings(rpm: u64, tpm: u64) -> QuotaCeilings {
        QuotaCeilings {
            requests_per_minute: Some(rpm),
            requests_per_day: Some(rpm * 10),
            tokens_per_minute: Some(tpm),
            tokens_per_day: Some(tpm * 10),
        }
    }

    fn dispatcher() -> QuotaDispatcher {
        QuotaDispatcher::new(vec![
            BackendDescriptor::new("versatile", ceilings(2, 10_000)),
            BackendDescriptor::new("instant", ceilings(30, 6_000)),
        ])
    }

    fn none() -> HashSet<String> {
        HashSet::new()
    }

    #[test]
    fn first_fit_in_priority_order() {
        let dispatcher = dispatcher();

        let first = dispatcher.select_backend(3500, &none()).unwrap();
        assert_eq!(first.backend_id(), "versatile");
        dispatcher.record_usage(first, 1000, 500);

        let second = dispatcher.select_backend(3500, &none()).unwrap();
        assert_eq!(second.backend_id(), "versatile");
        dispatcher.record_usage(second, 1000, 500);

        // Request ceiling of 2/min reached, fall through to the next backend
        let third = dispatcher.select_backend(3500, &none()).unwrap();
        assert_eq!(third.backend_id(), "instant");
    }

    #[test]
    fn excluded_backends_are_skipped() {
        let dispatcher = dispatcher();
        let excluded = HashSet::from(["versatile".to_string()]);

        let reservation = dispatcher.select_backend(100, &excluded).unwrap();
        assert_eq!(reservation.backend_id(), "instant");
    }

    #[test]
    fn cost_above_every_ceiling_is_exhausted() {
        let dispatcher = dispatcher();

        let err = dispatcher.select_backend(20_000, &none()).unwrap_err();
        assert!(matches!(err, QuotaError::Exhausted { .. }));
    }

    #[test]
    fn unbounded_backend_always_fits() {
        let dispatcher = QuotaDispatcher::new(vec![BackendDescriptor::new("local", QuotaCeilings::default())]);

        for _ in 0..1000 {
            let reservation = dispatcher.select_backend(1_000_000, &none()).unwrap();
            dispatcher.record_usage(reservation, 1_000_000, 0);
        }

        assert_eq!(dispatcher.snapshot()[0].minute.requests, 1000);
    }

    #[test]
    fn reservation_counts_before_it_is_settled() {
        let dispatcher = dispatcher();

        let a = dispatcher.select_backend(100, &none()).unwrap();
        let b = dispatcher.select_backend(100, &none()).unwrap();
        let c = dispatcher.select_backend(100, &none()).unwrap();

        assert_eq!(a.backend_id(), "versatile");
        assert_eq!(b.backend_id(), "versatile");
        assert_eq!(c.backend_id(), "instant");
    }

    #[test]
    fn dropped_reservation_is_released() {
        let dispatcher = dispatcher();

        {
            let _a = dispatcher.select_backend(3500, &none()).unwrap();
            let _b = dispatcher.select_backend(3500, &none()).unwrap();
        }

        let usage = &dispatcher.snapshot()[0];
        assert_eq!(usage.minute.requests, 0);
        assert_eq!(usage.minute.tokens, 0);

        let again = dispatcher.select_backend(3500, &none()).unwrap();
        assert_eq!(again.backend_id(), "versatile");
        dispatcher.release(again);
        assert_eq!(dispatcher.snapshot()[0].day.requests, 0);
    }

    #[test]
    fn record_usage_uses_actual_tokens() {
        let dispatcher = dispatcher();

        let reservation = dispatcher.select_backend(3500, &none()).unwrap();
        dispatcher.record_usage(reservation, 800, 400);

        let usage = &dispatcher.snapshot()[0];
        assert_eq!(usage.minute.requests, 1);
        assert_eq!(usage.minute.tokens, 1200);
        assert_eq!(usage.day.tokens, 1200);
    }

    #[test]
    fn cooldown_excludes_backend_for_its_duration() {
        let dispatcher = dispatcher();
        let t0 = Instant::now();
        let cooldown = Duration::from_secs(120);

        dispatcher.mark_cooldown_at("versatile", cooldown, t0);

        for offset in [0, 1, 60, 119] {
            let reservation = dispatcher
                .select_backend_at(10, &none(), t0 + Duration::from_secs(offset))
                .unwrap();
            assert_eq!(reservation.backend_id(), "instant", "selected during cooldown at +{offset}s");
        }

        let after = dispatcher.select_backend_at(10, &none(), t0 + cooldown).unwrap();
        assert_eq!(after.backend_id(), "versatile");
    }

    #[test]
    fn minute_window_frees_capacity_after_it_elapses() {
        let dispatcher = QuotaDispatcher::new(vec![BackendDescriptor::new("only", ceilings(1, 10_000))]);
        let t0 = Instant::now();

        let first = dispatcher.select_backend_at(10, &none(), t0).unwrap();
        first.settle(10, t0);

        let err = dispatcher
            .select_backend_at(10, &none(), t0 + Duration::from_secs(59))
            .unwrap_err();
        assert_eq!(err, QuotaError::Exhausted { retry_after: 1 });

        assert!(dispatcher.select_backend_at(10, &none(), t0 + Duration::from_secs(60)).is_ok());
    }

    #[test]
    fn exhausted_reports_earliest_retry() {
        let dispatcher = dispatcher();
        let t0 = Instant::now();

        dispatcher.mark_cooldown_at("versatile", Duration::from_secs(120), t0);
        dispatcher.mark_cooldown_at("instant", Duration::from_secs(30), t0);

        let err = dispatcher.select_backend_at(10, &none(), t0).unwrap_err();
        assert_eq!(err, QuotaError::Exhausted { retry_after: 30 });
    }

    #[test]
    fn reserve_named_backend() {
        let dispatcher = dispatcher();

        let reservation = dispatcher.reserve("instant", 500).unwrap();
        assert_eq!(reservation.backend_id(), "instant");

        let err = dispatcher.reserve("missing", 500).unwrap_err();
        assert_eq!(err, QuotaError::UnknownBackend("missing".to_string()));

        dispatcher.mark_cooldown("instant", Duration::from_secs(60));
        assert!(matches!(
            dispatcher.reserve("instant", 500),
            Err(QuotaError::Exhausted { .. })
        ));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let dispatcher = dispatcher();
        dispatcher.mark_cooldown("instant", Duration::from_secs(90));

        let json = serde_json::to_value(dispatcher.snapshot()).unwrap();
        assert_eq!(json[0]["backendId"], "versatile");
        assert_eq!(json[0]["minute"]["requestLimit"], 2);
        assert!(json[0].get("cooldownRemainingSecs").is_none());
        assert_eq!(json[1]["cooldownRemainingSecs"], 90);
    }

    #[test]
    fn concurrent_reservations_never_exceed_ceilings() {
        let dispatcher = Arc::new(QuotaDispatcher::new(vec![
            BackendDescriptor::new(
                "a",
                QuotaCeilings {
                    requests_per_minute: Some(40),
                    requests_per_day: Some(60),
                    tokens_per_minute: Some(50_000),
                    tokens_per_day: Some(80_000),
                },
            ),
            BackendDescriptor::new(
                "b",
                QuotaCeilings {
                    requests_per_minute: Some(25),
                    requests_per_day: None,
                    tokens_per_minute: Some(30_000),
                    tokens_per_day: None,
                },
            ),
        ]));

        let limits = [("a", 40, 50_000), ("b", 25, 30_000)];

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    let mut rng = rand::rng();
                    for _ in 0..200 {
                        let estimate = rng.random_range(100..=2_500);
                        let Ok(reservation) = dispatcher.select_backend(estimate, &HashSet::new()) else {
                            continue;
                        };

                        for usage in dispatcher.snapshot() {
                            let (_, rpm, tpm) = limits.iter().find(|(id, ..)| *id == usage.backend_id).unwrap();
                            assert!(usage.minute.requests <= *rpm);
                            assert!(usage.minute.tokens <= *tpm);
                        }

                        if rng.random_bool(0.2) {
                            dispatcher.release(reservation);
                        } else {
                            let actual = rng.random_range(0..=estimate);
                            dispatcher.record_usage(reservation, actual / 2, actual - actual / 2);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        let snapshot = dispatcher.snapshot();
        assert!(snapshot[0].minute.requests <= 40);
        assert!(snapshot[0].day.requests <= 60);
        assert!(snapshot[0].minute.tokens <= 50_000);
        assert!(snapshot[0].day.tokens <= 80_000);
        assert!(snapshot[1].minute.requests <= 25);
        assert!(snapshot[1].minute.tokens <= 30_000);
    }
}
