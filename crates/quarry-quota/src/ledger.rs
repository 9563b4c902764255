use std::time::{Duration, Instant};

use quarry_config::QuotaCeilings;

use crate::window::{DAY, MINUTE, UsageWindow};

/// Window epochs captured when capacity was reserved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReservationMark {
    pub(crate) minute_epoch: u64,
    pub(crate) day_epoch: u64,
    pub(crate) estimated_tokens: u64,
}

/// Mutable usage state of one backend
#[derive(Debug, Clone)]
pub struct BackendLedger {
    minute: UsageWindow,
    day: UsageWindow,
    cooldown_until: Option<Instant>,
}

impl BackendLedger {
    pub const fn new(now: Instant) -> Self {
        Self {
            minute: UsageWindow::new(MINUTE, now),
            day: UsageWindow::new(DAY, now),
            cooldown_until: None,
        }
    }

    pub const fn minute(&self) -> &UsageWindow {
        &self.minute
    }

    pub const fn day(&self) -> &UsageWindow {
        &self.day
    }

    /// Lazily reset elapsed windows and clear an expired cooldown
    pub fn refresh(&mut self, now: Instant) {
        if self.minute.refresh(now) {
            tracing::trace!("minute usage window reset");
        }

        if self.day.refresh(now) {
            tracing::trace!("day usage window reset");
        }

        if self.cooldown_until.is_some_and(|until| now >= until) {
            self.cooldown_until = None;
        }
    }

    pub fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        self.cooldown_until
            .filter(|until| now < *until)
            .map(|until| until.saturating_duration_since(now))
    }

    /// Whether a request of `tokens` fits all four ceilings right now
    pub fn has_capacity(&self, ceilings: &QuotaCeilings, tokens: u64, now: Instant) -> bool {
        !self.in_cooldown(now)
            && self
                .minute
                .fits(ceilings.requests_per_minute, ceilings.tokens_per_minute, tokens)
            && self.day.fits(ceilings.requests_per_day, ceilings.tokens_per_day, tokens)
    }

    /// Earliest time a request of `tokens` could be admitted, assuming no other traffic
    pub fn available_in(&self, ceilings: &QuotaCeilings, tokens: u64, now: Instant) -> Duration {
        if let Some(remaining) = self.cooldown_remaining(now) {
            return remaining;
        }

        if !self.day.fits(ceilings.requests_per_day, ceilings.tokens_per_day, tokens) {
            return self.day.resets_in(now);
        }

        if !self
            .minute
            .fits(ceilings.requests_per_minute, ceilings.tokens_per_minute, tokens)
        {
            return self.minute.resets_in(now);
        }

        Duration::ZERO
    }

    /// Charge one request and the estimated tokens to both windows
    pub(crate) const fn reserve(&mut self, estimated_tokens: u64) -> ReservationMark {
        self.minute.charge(1, estimated_tokens);
        self.day.charge(1, estimated_tokens);

        ReservationMark {
            minute_epoch: self.minute.epoch(),
            day_epoch: self.day.epoch(),
            estimated_tokens,
        }
    }

    /// Replace a reservation's estimate with the reported token usage
    ///
    /// A window that rolled over since the reservation no longer holds the
    /// estimate; the actual request lands in the fresh window instead.
    pub(crate) fn settle(&mut self, mark: ReservationMark, actual_tokens: u64, now: Instant) {
        self.refresh(now);

        for (window, epoch) in [(&mut self.minute, mark.minute_epoch), (&mut self.day, mark.day_epoch)] {
            if window.epoch() == epoch {
                window.correct_tokens(mark.estimated_tokens, actual_tokens);
            } else {
                window.charge(1, actual_tokens);
            }
        }
    }

    /// Undo a reservation that never completed
    pub(crate) fn release(&mut self, mark: ReservationMark, now: Instant) {
        self.refresh(now);

        for (window, epoch) in [(&mut self.minute, mark.minute_epoch), (&mut self.day, mark.day_epoch)] {
            if window.epoch() == epoch {
                window.refund(1, mark.estimated_tokens);
            }
        }
    }

    pub(crate) fn mark_cooldown(&mut self, until: Instant) {
        // A shorter cooldown never cuts an existing one short
        if self.cooldown_until.is_none_or(|current| until > current) {
            self.cooldown_until = Some(until);
        }
    }
}
