//! NYSE trading calendar.
//!
//! Weekends and the exchange's full-day holidays are closed. Holidays are
//! derived by rule rather than from a table, so any year works:
//! New Year's Day, Martin Luther King Jr. Day, Presidents' Day, Good Friday,
//! Memorial Day, Juneteenth (from 2022), Independence Day, Labor Day,
//! Thanksgiving and Christmas. Fixed-date holidays falling on a Saturday are
//! observed the Friday before, on a Sunday the Monday after. New Year's Day on
//! a Saturday is not observed.

use crate::clock::Clock;
use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};

/// Trading calendar with the regular session close used for prediction mode.
#[derive(Debug, Clone, Copy)]
pub struct MarketCalendar {
    close_time: NaiveTime,
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self {
            close_time: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl MarketCalendar {
    pub fn new(close_time: NaiveTime) -> Self {
        Self { close_time }
    }

    pub fn close_time(&self) -> NaiveTime {
        self.close_time
    }

    /// True when the exchange holds a regular session on `date`.
    pub fn is_market_open(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !is_holiday(date)
    }

    /// Latest session strictly before `date`.
    pub fn previous_market_open(&self, date: NaiveDate) -> NaiveDate {
        self.open_on_or_before(date - Duration::days(1))
    }

    /// Earliest session strictly after `date`.
    pub fn next_market_open(&self, date: NaiveDate) -> NaiveDate {
        self.open_on_or_after(date + Duration::days(1))
    }

    /// `date` itself if it is a session, otherwise the latest session before it.
    pub fn open_on_or_before(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_market_open(d) {
            d -= Duration::days(1);
        }
        d
    }

    /// `date` itself if it is a session, otherwise the earliest session after it.
    pub fn open_on_or_after(&self, date: NaiveDate) -> NaiveDate {
        let mut d = date;
        while !self.is_market_open(d) {
            d += Duration::days(1);
        }
        d
    }

    /// Whether `date`'s close has not happened yet according to `clock`.
    ///
    /// Future dates, and today before the session close, are predictions: no
    /// same-day outcome can be observed for them.
    pub fn does_date_refer_to_prediction(&self, date: NaiveDate, clock: &dyn Clock) -> bool {
        let now = clock.now_naive();
        let today = now.date();
        date > today || (date == today && now.time() < self.close_time)
    }
}

fn is_holiday(date: NaiveDate) -> bool {
    holidays(date.year()).contains(&date)
}

/// Observed full-day holidays for `year`.
pub fn holidays(year: i32) -> Vec<NaiveDate> {
    let mut out = Vec::with_capacity(10);

    // New Year's Day: Saturday is not observed (would fall in the previous year).
    if let Some(ny) = NaiveDate::from_ymd_opt(year, 1, 1) {
        match ny.weekday() {
            Weekday::Sat => {}
            Weekday::Sun => out.push(ny + Duration::days(1)),
            _ => out.push(ny),
        }
    }

    out.extend(nth_weekday(year, 1, Weekday::Mon, 3));
    out.extend(nth_weekday(year, 2, Weekday::Mon, 3));
    out.extend(easter_sunday(year).map(|e| e - Duration::days(2)));
    out.extend(last_weekday(year, 5, Weekday::Mon));
    if year >= 2022 {
        out.extend(observed(year, 6, 19));
    }
    out.extend(observed(year, 7, 4));
    out.extend(nth_weekday(year, 9, Weekday::Mon, 1));
    out.extend(nth_weekday(year, 11, Weekday::Thu, 4));
    out.extend(observed(year, 12, 25));

    out
}

fn observed(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(match date.weekday() {
        Weekday::Sat => date - Duration::days(1),
        Weekday::Sun => date + Duration::days(1),
        _ => date,
    })
}

fn nth_weekday(year: i32, month: u32, weekday: Weekday, n: u8) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, n)
}

fn last_weekday(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    nth_weekday(year, month, weekday, 5).or_else(|| nth_weekday(year, month, weekday, 4))
}

/// Gregorian Easter Sunday (anonymous Gregorian computus).
fn easter_sunday(year: i32) -> Option<NaiveDate> {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekends_are_closed() {
        let cal = MarketCalendar::default();
        assert!(!cal.is_market_open(d(2024, 3, 9)));
        assert!(!cal.is_market_open(d(2024, 3, 10)));
        assert!(cal.is_market_open(d(2024, 3, 11)));
    }

    #[test]
    fn known_2024_holidays() {
        let cal = MarketCalendar::default();
        for h in [
            d(2024, 1, 1),
            d(2024, 1, 15),
            d(2024, 2, 19),
            d(2024, 3, 29),
            d(2024, 5, 27),
            d(2024, 6, 19),
            d(2024, 7, 4),
            d(2024, 9, 2),
            d(2024, 11, 28),
            d(2024, 12, 25),
        ] {
            assert!(!cal.is_market_open(h), "{h} should be a holiday");
        }
    }

    #[test]
    fn easter_dates() {
        assert_eq!(easter_sunday(2024), Some(d(2024, 3, 31)));
        assert_eq!(easter_sunday(2025), Some(d(2025, 4, 20)));
        assert_eq!(easter_sunday(2019), Some(d(2019, 4, 21)));
    }

    #[test]
    fn weekend_holidays_are_observed() {
        let cal = MarketCalendar::default();
        // July 4th 2026 is a Saturday; observed Friday July 3rd.
        assert!(!cal.is_market_open(d(2026, 7, 3)));
        // Christmas 2022 is a Sunday; observed Monday December 26th.
        assert!(!cal.is_market_open(d(2022, 12, 26)));
        // New Year's Day 2022 is a Saturday and is not observed on Dec 31st 2021.
        assert!(cal.is_market_open(d(2021, 12, 31)));
    }

    #[test]
    fn juneteenth_only_from_2022() {
        let cal = MarketCalendar::default();
        assert!(cal.is_market_open(d(2021, 6, 18)));
        assert!(!cal.is_market_open(d(2023, 6, 19)));
    }

    #[test]
    fn previous_market_open_skips_weekend_and_holiday() {
        let cal = MarketCalendar::default();
        // Tuesday after MLK day -> previous session is the Friday before.
        assert_eq!(cal.previous_market_open(d(2024, 1, 16)), d(2024, 1, 12));
        assert_eq!(cal.open_on_or_before(d(2024, 3, 10)), d(2024, 3, 8));
        assert_eq!(cal.open_on_or_after(d(2024, 3, 9)), d(2024, 3, 11));
        assert_eq!(cal.next_market_open(d(2024, 3, 28)), d(2024, 4, 1));
    }

    #[test]
    fn prediction_mode_boundaries() {
        let cal = MarketCalendar::default();
        let tz = chrono_tz::America::New_York;
        let before_close =
            FixedClock::at_local(tz, d(2024, 3, 12).and_hms_opt(15, 59, 0).unwrap()).unwrap();
        let after_close =
            FixedClock::at_local(tz, d(2024, 3, 12).and_hms_opt(16, 0, 0).unwrap()).unwrap();

        assert!(cal.does_date_refer_to_prediction(d(2024, 3, 12), &before_close));
        assert!(!cal.does_date_refer_to_prediction(d(2024, 3, 12), &after_close));
        assert!(cal.does_date_refer_to_prediction(d(2024, 3, 13), &after_close));
        assert!(!cal.does_date_refer_to_prediction(d(2024, 3, 11), &before_close));
    }
}
