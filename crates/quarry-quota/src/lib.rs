//! Per-backend usage ledgers and quota-aware backend selection
//!
//! Each backend has a minute and a day [`UsageWindow`] plus a cooldown
//! deadline, all behind one mutex per backend. [`QuotaDispatcher`] picks
//! the first backend in priority order with room for an estimated cost and
//! reserves that room immediately, so concurrent callers cannot both pass
//! a stale capacity check.

#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

mod dispatcher;
mod error;
mod ledger;
mod window;

pub use dispatcher::{BackendDescriptor, BackendUsage, QuotaDispatcher, Reservation, WindowUsage};
pub use error::QuotaError;
pub use ledger::BackendLedger;
pub use quarry_config::QuotaCeilings;
pub use window::{DAY, MINUTE, UsageWindow};
