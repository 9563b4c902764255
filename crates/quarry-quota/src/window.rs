use std::time::{Duration, Instant};

/// Length of the per-minute window
pub const MINUTE: Duration = Duration::from_secs(60);

/// Length of the per-day window
pub const DAY: Duration = Duration::from_secs(86_400);

/// Request and token counters over one fixed-length window
///
/// The window resets lazily: whenever it is observed at least `length`
/// after it started, counters drop to zero and the window restarts at the
/// observation instant. Elapsed periods never stack up, so a window idle
/// for three minutes resets once, not three times.
#[derive(Debug, Clone)]
pub struct UsageWindow {
    length: Duration,
    start: Instant,
    epoch: u64,
    requests: u64,
    tokens: u64,
}

impl UsageWindow {
    pub const fn new(length: Duration, now: Instant) -> Self {
        Self {
            length,
            start: now,
            epoch: 0,
            requests: 0,
            tokens: 0,
        }
    }

    /// Reset the counters if the window has elapsed; returns whether it did
    pub fn refresh(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.start) < self.length {
            return false;
        }

        self.start = now;
        self.epoch += 1;
        self.requests = 0;
        self.tokens = 0;

        true
    }

    pub const fn requests(&self) -> u64 {
        self.requests
    }

    pub const fn tokens(&self) -> u64 {
        self.tokens
    }

    /// Number of resets this window has gone through
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Time left until the window next resets
    pub fn resets_in(&self, now: Instant) -> Duration {
        self.length.saturating_sub(now.saturating_duration_since(self.start))
    }

    /// Whether one more request costing `tokens` stays within both ceilings
    pub fn fits(&self, request_ceiling: Option<u64>, token_ceiling: Option<u64>, tokens: u64) -> bool {
        let requests_ok = request_ceiling.is_none_or(|limit| self.requests.saturating_add(1) <= limit);
        let tokens_ok = token_ceiling.is_none_or(|limit| self.tokens.saturating_add(tokens) <= limit);

        requests_ok && tokens_ok
    }

    pub(crate) const fn charge(&mut self, requests: u64, tokens: u64) {
        self.requests = self.requests.saturating_add(requests);
        self.tokens = self.tokens.saturating_add(tokens);
    }

    pub(crate) const fn refund(&mut self, requests: u64, tokens: u64) {
        self.requests = self.requests.saturating_sub(requests);
        self.tokens = self.tokens.saturating_sub(tokens);
    }

    /// Swap an estimated token charge for the actual figure
    pub(crate) const fn correct_tokens(&mut self, estimated: u64, actual: u64) {
        self.tokens = self.tokens.saturating_sub(estimated).saturating_add(actual);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_stable_before_the_window_elapses() {
        let t0 = Instant::now();
        let mut window = UsageWindow::new(MINUTE, t0);
        window.charge(3, 900);

        for offset in [0, 1, 30, 59] {
            assert!(!window.refresh(t0 + Duration::from_secs(offset)));
            assert_eq!(window.requests(), 3);
            assert_eq!(window.tokens(), 900);
        }

        assert!(!window.refresh(t0 + MINUTE - Duration::from_millis(1)));
        assert_eq!(window.epoch(), 0);
    }

    #[test]
    fn resets_exactly_once_after_the_window_elapses() {
        let t0 = Instant::now();
        let mut window = UsageWindow::new(MINUTE, t0);
        window.charge(3, 900);

        let late = t0 + Duration::from_secs(185);
        assert!(window.refresh(late));
        assert_eq!(window.requests(), 0);
        assert_eq!(window.tokens(), 0);
        assert_eq!(window.epoch(), 1);

        // The new window starts at the observation, so later checks inside it
        // do not reset again even though several periods passed since t0.
        assert!(!window.refresh(late + Duration::from_secs(10)));
        assert_eq!(window.epoch(), 1);
    }

    #[test]
    fn reset_on_the_boundary() {
        let t0 = Instant::now();
        let mut window = UsageWindow::new(MINUTE, t0);
        window.charge(1, 10);

        assert!(window.refresh(t0 + MINUTE));
        assert_eq!(window.tokens(), 0);
    }

    #[test]
    fn fits_checks_both_ceilings() {
        let t0 = Instant::now();
        let mut window = UsageWindow::new(MINUTE, t0);
        window.charge(29, 11_000);

        assert!(window.fits(Some(30), Some(12_000), 1000));
        assert!(!window.fits(Some(30), Some(12_000), 1001));
        assert!(window.fits(None, None, u64::MAX));

        window.charge(1, 0);
        assert!(!window.fits(Some(30), None, 0));
    }

    #[test]
    fn correction_replaces_the_estimate() {
        let mut window = UsageWindow::new(MINUTE, Instant::now());
        window.charge(1, 3500);
        window.correct_tokens(3500, 1200);

        assert_eq!(window.requests(), 1);
        assert_eq!(window.tokens(), 1200);
    }

    #[test]
    fn resets_in_counts_down() {
        let t0 = Instant::now();
        let window = UsageWindow::new(MINUTE, t0);

        assert_eq!(window.resets_in(t0 + Duration::from_secs(45)), Duration::from_secs(15));
        assert_eq!(window.resets_in(t0 + Duration::from_secs(90)), Duration::ZERO);
    }
}
