//! `last_modified` maintenance.
//!
//! Inserts take the clock's time as the column default. Updates go through
//! the `StampLastModified` trigger, which overwrites whatever the caller sent.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};

use crate::model::SiteRecord;

/// Source of wall-clock time for stamping.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that returns a settable instant. Used in tests.
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Stamp `last_modified` for an update.
///
/// The stored value never moves backwards: if the clock reads earlier than
/// the previous stamp, the previous stamp is kept.
pub(crate) fn stamp_update(
    record: &mut SiteRecord,
    previous: DateTime<Utc>,
    now: DateTime<Utc>,
) {
    record.last_modified = now.max(previous);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(at: DateTime<Utc>) -> SiteRecord {
        SiteRecord {
            id: "s1".into(),
            site_number: None,
            full_name: None,
            short_name: None,
            latitude: None,
            longitude: None,
            elevation: None,
            description: None,
            last_modified: at,
        }
    }

    #[test]
    fn update_overwrites_caller_value() {
        let prev = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let mut r = record(Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap());
        stamp_update(&mut r, prev, now);
        assert_eq!(r.last_modified, now);
    }

    #[test]
    fn update_never_moves_backwards() {
        let prev = Utc.with_ymd_and_hms(2024, 5, 2, 0, 0, 0).unwrap();
        let skewed = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let mut r = record(prev);
        stamp_update(&mut r, prev, skewed);
        assert_eq!(r.last_modified, prev);
    }

    #[test]
    fn fixed_clock_is_settable() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let clock = FixedClock::new(a);
        assert_eq!(clock.now(), a);
        clock.set(b);
        assert_eq!(clock.now(), b);
    }
}
