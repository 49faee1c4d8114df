//! Injectable source of "today" (UTC).
//!
//! Key derivation never reads the wall clock itself; the client and receiver
//! ask a [`Clock`] for the current date and pass it down explicitly.

use chrono::Utc;
use parking_lot::Mutex;

use crate::types::KeyDate;

pub trait Clock: Send + Sync {
    /// Current UTC calendar date.
    fn today(&self) -> KeyDate;
}

/// Wall-clock UTC date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> KeyDate {
        KeyDate::from_naive(Utc::now().date_naive())
    }
}

/// A clock pinned to a date, advanced manually. Used in tests and by the CLI
/// when an explicit `--date` is given.
#[derive(Debug)]
pub struct FixedClock {
    date: Mutex<KeyDate>,
}

impl FixedClock {
    pub fn new(date: KeyDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: KeyDate) {
        *self.date.lock() = date;
    }

    /// Move forward one day (no-op at the end of the calendar).
    pub fn advance_day(&self) {
        let mut date = self.date.lock();
        if let Some(next) = date.next_day() {
            *date = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> KeyDate {
        *self.date.lock()
    }
}
