//! Wall-clock abstraction in a named market timezone.
//!
//! Everything that needs "now" (cache snapshot stamps, prediction-mode checks,
//! warm-up windows) takes an injected `Clock` so tests can pin time.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Source of the current date and time in the market timezone.
pub trait Clock: Send + Sync {
    /// Current instant, expressed in the market timezone.
    fn now(&self) -> DateTime<Tz>;

    /// Current calendar date in the market timezone.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    /// Current wall time in the market timezone, without zone information.
    fn now_naive(&self) -> NaiveDateTime {
        self.now().naive_local()
    }
}

/// Real clock backed by the system time.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    tz: Tz,
}

impl SystemClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// System clock in US Eastern time, where the NYSE trades.
    pub fn new_york() -> Self {
        Self::new(chrono_tz::America::New_York)
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Tz> {
        Utc::now().with_timezone(&self.tz)
    }
}

/// Clock frozen at a single instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Tz>,
}

impl FixedClock {
    pub fn new(at: DateTime<Tz>) -> Self {
        Self { at }
    }

    /// Pin the clock to a local wall time in `tz`.
    ///
    /// Returns `None` when the wall time does not exist in `tz` (DST gap).
    pub fn at_local(tz: Tz, local: NaiveDateTime) -> Option<Self> {
        tz.from_local_datetime(&local).earliest().map(Self::new)
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Tz> {
        self.at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn fixed_clock_reports_local_date() {
        let local = NaiveDate::from_ymd_opt(2024, 7, 1)
            .unwrap()
            .and_hms_opt(23, 30, 0)
            .unwrap();
        let clock = FixedClock::at_local(chrono_tz::America::New_York, local).unwrap();
        // 23:30 in New York is already July 2nd in UTC; the local date must win.
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2024, 7, 1).unwrap());
        assert_eq!(clock.now_naive(), local);
    }

    #[test]
    fn system_clock_uses_configured_zone() {
        let clock = SystemClock::new(chrono_tz::Asia::Tokyo);
        assert_eq!(clock.now().timezone(), chrono_tz::Asia::Tokyo);
    }
}
