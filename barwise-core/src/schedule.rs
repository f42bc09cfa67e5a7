//! Cash injection schedule and dividend reinvestment.
//!
//! Cadences are five-field cron expressions (`minute hour day-of-month month
//! day-of-week`). `M` and `W` are shorthands for the first of every month and
//! every Monday at midnight. Advancing the schedule is a pure function of the
//! previous fire time: [`CashCadence::next_after`] walks the calendar field by
//! field and never consults a clock.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

use crate::domain::Bar;

/// Longest gap searched for the next fire time. Eight years covers every
/// leap-day expression across a skipped century leap year.
const SEARCH_HORIZON_DAYS: i64 = 8 * 366;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Errors from parsing a cadence expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronError {
    #[error("expected 5 fields in cron expression '{expr}', found {found}")]
    FieldCount { expr: String, found: usize },
    #[error("invalid {field} field '{value}'")]
    InvalidField { field: &'static str, value: String },
    #[error("{field} value {value} outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("cron expression '{0}' never fires")]
    Unsatisfiable(String),
}

/// Allowed values of one cron field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet {
    bits: u64,
    /// False when the field was written as a bare `*`.
    restricted: bool,
}

impl FieldSet {
    fn single(value: u32) -> Self {
        Self {
            bits: 1u64 << value,
            restricted: true,
        }
    }

    fn every(spec: &FieldSpec) -> Self {
        let mut bits = 0u64;
        for v in spec.min..=spec.max {
            bits |= 1u64 << v;
        }
        Self {
            bits,
            restricted: false,
        }
    }

    fn contains(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    names: Option<&'static [&'static str]>,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    names: None,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    names: None,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    names: None,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    names: Some(&MONTH_NAMES),
};
// 7 is accepted as an alias for Sunday and folded onto 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    names: Some(&DAY_NAMES),
};
const DAYS_OF_WEEK_FOLDED: FieldSpec = FieldSpec { max: 6, ..DAY_OF_WEEK };

impl FieldSpec {
    fn invalid(&self, value: &str) -> CronError {
        CronError::InvalidField {
            field: self.name,
            value: value.to_string(),
        }
    }

    fn parse_value(&self, token: &str) -> Result<u32, CronError> {
        let value = match token.parse::<u32>() {
            Ok(v) => v,
            Err(_) => {
                let lower = token.to_ascii_lowercase();
                let names = self.names.ok_or_else(|| self.invalid(token))?;
                let pos = names
                    .iter()
                    .position(|n| *n == lower)
                    .ok_or_else(|| self.invalid(token))?;
                // Month names are 1-based, day names 0-based.
                pos as u32 + self.min
            }
        };
        if value < self.min || value > self.max {
            return Err(CronError::OutOfRange {
                field: self.name,
                value,
                min: self.min,
                max: self.max,
            });
        }
        Ok(value)
    }

    fn parse(&self, field: &str) -> Result<FieldSet, CronError> {
        let mut bits = 0u64;
        for part in field.split(',') {
            let (range, step) = match part.split_once('/') {
                Some((r, s)) => {
                    let step: u32 = s.parse().map_err(|_| self.invalid(part))?;
                    if step == 0 {
                        return Err(self.invalid(part));
                    }
                    (r, step)
                }
                None => (part, 1),
            };

            let (lo, hi) = if range == "*" {
                (self.min, self.max)
            } else if let Some((a, b)) = range.split_once('-') {
                let lo = self.parse_value(a)?;
                let hi = self.parse_value(b)?;
                if lo > hi {
                    return Err(self.invalid(part));
                }
                (lo, hi)
            } else {
                let v = self.parse_value(range)?;
                // `5/15` means "from 5 to the end, every 15".
                if step > 1 {
                    (v, self.max)
                } else {
                    (v, v)
                }
            };

            let mut v = lo;
            while v <= hi {
                bits |= 1u64 << v;
                v += step;
            }
        }
        if bits == 0 {
            return Err(self.invalid(field));
        }
        Ok(FieldSet {
            bits,
            restricted: field != "*",
        })
    }
}

/// A parsed cash-injection cadence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashCadence {
    expression: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
}

impl CashCadence {
    /// Midnight on the first of every month (`0 0 1 * *`).
    pub fn monthly() -> Self {
        Self {
            expression: "0 0 1 * *".to_string(),
            minutes: FieldSet::single(0),
            hours: FieldSet::single(0),
            days_of_month: FieldSet::single(1),
            months: FieldSet::every(&MONTH),
            days_of_week: FieldSet::every(&DAYS_OF_WEEK_FOLDED),
        }
    }

    /// Midnight every Monday (`0 0 * * 1`).
    pub fn weekly() -> Self {
        Self {
            expression: "0 0 * * 1".to_string(),
            minutes: FieldSet::single(0),
            hours: FieldSet::single(0),
            days_of_month: FieldSet::every(&DAY_OF_MONTH),
            months: FieldSet::every(&MONTH),
            days_of_week: FieldSet::single(1),
        }
    }

    /// Parse `M`, `W` or a five-field cron expression.
    pub fn parse(s: &str) -> Result<Self, CronError> {
        match s.trim() {
            "M" => Ok(Self::monthly()),
            "W" => Ok(Self::weekly()),
            other => Self::parse_cron(other),
        }
    }

    fn parse_cron(expr: &str) -> Result<Self, CronError> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronError::FieldCount {
                expr: expr.to_string(),
                found: fields.len(),
            });
        }

        let mut days_of_week = DAY_OF_WEEK.parse(fields[4])?;
        if days_of_week.contains(7) {
            days_of_week.bits = (days_of_week.bits & !(1 << 7)) | 1;
        }

        let cadence = Self {
            expression: fields.join(" "),
            minutes: MINUTE.parse(fields[0])?,
            hours: HOUR.parse(fields[1])?,
            days_of_month: DAY_OF_MONTH.parse(fields[2])?,
            months: MONTH.parse(fields[3])?,
            days_of_week,
        };

        let probe = NaiveDate::from_ymd_opt(2000, 1, 1).and_then(|d| d.and_hms_opt(0, 0, 0));
        match probe.and_then(|t| cadence.next_after(t)) {
            Some(_) => Ok(cadence),
            None => Err(CronError::Unsatisfiable(expr.to_string())),
        }
    }

    /// Normalized cron expression.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Standard cron rule: when both day fields are restricted a day matches
    /// if either does.
    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (self.days_of_month.restricted, self.days_of_week.restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// First fire time strictly after `after`, or `None` if nothing matches
    /// within the search horizon.
    ///
    /// # Example
    /// ```
    /// use barwise_core::schedule::CashCadence;
    /// use chrono::NaiveDate;
    ///
    /// let start = NaiveDate::from_ymd_opt(2022, 1, 1).unwrap().and_hms_opt(0, 0, 0).unwrap();
    /// let next = CashCadence::monthly().next_after(start).unwrap();
    /// assert_eq!(next.date(), NaiveDate::from_ymd_opt(2022, 2, 1).unwrap());
    /// ```
    pub fn next_after(&self, after: NaiveDateTime) -> Option<NaiveDateTime> {
        let limit = after + Duration::days(SEARCH_HORIZON_DAYS);
        let mut t = after.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        while t <= limit {
            if !self.months.contains(t.month()) {
                t = start_of_next_month(t.date())?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t);
        }
        None
    }
}

fn start_of_next_month(date: NaiveDate) -> Option<NaiveDateTime> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

impl FromStr for CashCadence {
    type Err = CronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CashCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

/// Cash credited at the start of a bar.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CashFlow {
    pub dividend: f64,
    pub injected: f64,
    /// Next scheduled injection after this bar, once the schedule is seeded.
    pub next_injection: Option<NaiveDateTime>,
}

impl CashFlow {
    pub fn total(&self) -> f64 {
        self.dividend + self.injected
    }
}

/// Tracks the injection schedule and the running total of external deposits.
///
/// The schedule is seeded from the first bar it sees: the first injection is
/// the first fire time strictly after that bar. A bar whose timestamp reaches
/// the scheduled time receives one injection and the schedule advances by one
/// tick from the previous fire time, so a long gap in the feed is caught up
/// one injection per bar.
#[derive(Debug, Clone)]
pub struct CashScheduler {
    amount: f64,
    cadence: CashCadence,
    invest_dividends: bool,
    next: Option<NaiveDateTime>,
    seeded: bool,
    total_added: f64,
}

impl CashScheduler {
    pub fn new(amount: f64, cadence: CashCadence, invest_dividends: bool) -> Self {
        Self {
            amount,
            cadence,
            invest_dividends,
            next: None,
            seeded: false,
            total_added: 0.0,
        }
    }

    /// Whether scheduled injections are enabled at all.
    pub fn is_active(&self) -> bool {
        self.amount > 0.0
    }

    pub fn total_added(&self) -> f64 {
        self.total_added
    }

    pub fn next_injection(&self) -> Option<NaiveDateTime> {
        self.next
    }

    pub fn cadence(&self) -> &CashCadence {
        &self.cadence
    }

    /// Dividend to reinvest for `bar`, if enabled.
    pub fn dividend(&self, bar: &Bar) -> f64 {
        if self.invest_dividends {
            bar.positive_dividend().unwrap_or(0.0)
        } else {
            0.0
        }
    }

    /// Injection due at `timestamp`. Advances the schedule when it fires.
    pub fn injection_due(&mut self, timestamp: DateTime<Utc>) -> f64 {
        if !self.is_active() {
            return 0.0;
        }
        let now = timestamp.naive_utc();
        if !self.seeded {
            self.seeded = true;
            self.next = self.cadence.next_after(now);
        }
        match self.next {
            Some(due) if now >= due => {
                self.next = self.cadence.next_after(due);
                self.total_added += self.amount;
                self.amount
            }
            _ => 0.0,
        }
    }

    /// All cash credited at the start of `bar`.
    pub fn on_bar(&mut self, bar: &Bar) -> CashFlow {
        let dividend = self.dividend(bar);
        let injected = self.injection_due(bar.timestamp);
        CashFlow {
            dividend,
            injected,
            next_injection: self.next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    fn bar_on(y: i32, m: u32, d: u32) -> Bar {
        Bar::new(
            Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap(),
            100.0,
            101.0,
            99.0,
            100.0,
            1000.0,
        )
    }

    #[test]
    fn shorthands_expand() {
        assert_eq!(CashCadence::parse("M").unwrap().expression(), "0 0 1 * *");
        assert_eq!(CashCadence::parse("W").unwrap().expression(), "0 0 * * 1");
    }

    #[test]
    fn monthly_is_strictly_after() {
        let m = CashCadence::monthly();
        assert_eq!(m.next_after(at(2022, 1, 1, 0, 0)), Some(at(2022, 2, 1, 0, 0)));
        assert_eq!(m.next_after(at(2022, 1, 15, 9, 30)), Some(at(2022, 2, 1, 0, 0)));
        assert_eq!(m.next_after(at(2022, 12, 3, 0, 0)), Some(at(2023, 1, 1, 0, 0)));
    }

    #[test]
    fn weekly_fires_on_monday() {
        // 2022-01-01 is a Saturday.
        let w = CashCadence::weekly();
        let next = w.next_after(at(2022, 1, 1, 0, 0)).unwrap();
        assert_eq!(next, at(2022, 1, 3, 0, 0));
        assert_eq!(w.next_after(next), Some(at(2022, 1, 10, 0, 0)));
    }

    #[test]
    fn steps_ranges_and_lists() {
        let c = CashCadence::parse("*/15 9-10 * * mon-fri").unwrap();
        assert_eq!(c.next_after(at(2022, 1, 3, 9, 0)), Some(at(2022, 1, 3, 9, 15)));
        assert_eq!(c.next_after(at(2022, 1, 3, 10, 45)), Some(at(2022, 1, 4, 9, 0)));
        // Friday evening rolls to Monday.
        assert_eq!(c.next_after(at(2022, 1, 7, 11, 0)), Some(at(2022, 1, 10, 9, 0)));

        let q = CashCadence::parse("30 12 15 jan,apr,jul,oct *").unwrap();
        assert_eq!(q.next_after(at(2022, 2, 1, 0, 0)), Some(at(2022, 4, 15, 12, 30)));
    }

    #[test]
    fn day_fields_use_or_rule_when_both_restricted() {
        // The 10th of the month or any Sunday.
        let c = CashCadence::parse("0 0 10 * 0").unwrap();
        // 2022-01-02 is a Sunday.
        assert_eq!(c.next_after(at(2022, 1, 1, 0, 0)), Some(at(2022, 1, 2, 0, 0)));
        assert_eq!(c.next_after(at(2022, 1, 9, 0, 0)), Some(at(2022, 1, 10, 0, 0)));
    }

    #[test]
    fn sunday_as_seven() {
        let c = CashCadence::parse("0 0 * * 7").unwrap();
        assert_eq!(c.next_after(at(2022, 1, 1, 0, 0)), Some(at(2022, 1, 2, 0, 0)));
    }

    #[test]
    fn leap_day_is_found() {
        let c = CashCadence::parse("0 0 29 2 *").unwrap();
        assert_eq!(c.next_after(at(2022, 3, 1, 0, 0)), Some(at(2024, 2, 29, 0, 0)));
    }

    #[test]
    fn rejects_bad_expressions() {
        assert!(matches!(
            CashCadence::parse("0 0 1 *"),
            Err(CronError::FieldCount { found: 4, .. })
        ));
        assert!(matches!(
            CashCadence::parse("61 0 1 * *"),
            Err(CronError::OutOfRange { field: "minute", .. })
        ));
        assert!(matches!(
            CashCadence::parse("0 0 1 foo *"),
            Err(CronError::InvalidField { field: "month", .. })
        ));
        assert!(CashCadence::parse("*/0 * * * *").is_err());
        assert!(CashCadence::parse("0 0 5-1 * *").is_err());
        assert!(matches!(
            CashCadence::parse("0 0 31 2 *"),
            Err(CronError::Unsatisfiable(_))
        ));
        assert!(CashCadence::parse("").is_err());
    }

    #[test]
    fn monthly_injection_scenario() {
        let mut s = CashScheduler::new(500.0, CashCadence::monthly(), true);

        assert_eq!(s.on_bar(&bar_on(2022, 1, 1)).injected, 0.0);
        assert_eq!(s.next_injection(), Some(at(2022, 2, 1, 0, 0)));
        assert_eq!(s.on_bar(&bar_on(2022, 1, 31)).injected, 0.0);

        let flow = s.on_bar(&bar_on(2022, 2, 1));
        assert_eq!(flow.injected, 500.0);
        assert_eq!(s.total_added(), 500.0);
        assert_eq!(flow.next_injection, Some(at(2022, 3, 1, 0, 0)));

        assert_eq!(s.on_bar(&bar_on(2022, 2, 2)).injected, 0.0);
        // First trading day of March is after the 1st; still fires once.
        assert_eq!(s.on_bar(&bar_on(2022, 3, 2)).injected, 500.0);
        assert_eq!(s.total_added(), 1000.0);
    }

    #[test]
    fn gap_catches_up_one_tick_per_bar() {
        let mut s = CashScheduler::new(100.0, CashCadence::monthly(), false);
        s.on_bar(&bar_on(2022, 1, 1));
        assert_eq!(s.on_bar(&bar_on(2022, 5, 10)).injected, 100.0);
        assert_eq!(s.next_injection(), Some(at(2022, 3, 1, 0, 0)));
        assert_eq!(s.on_bar(&bar_on(2022, 5, 11)).injected, 100.0);
        assert_eq!(s.total_added(), 200.0);
    }

    #[test]
    fn zero_amount_disables_schedule() {
        let mut s = CashScheduler::new(0.0, CashCadence::weekly(), true);
        for d in 1..=20 {
            assert_eq!(s.on_bar(&bar_on(2022, 1, d)).injected, 0.0);
        }
        assert_eq!(s.total_added(), 0.0);
        assert_eq!(s.next_injection(), None);
    }

    #[test]
    fn dividends_follow_flag() {
        let bar = bar_on(2022, 1, 3).with_dividend(0.42);
        let on = CashScheduler::new(0.0, CashCadence::monthly(), true);
        let off = CashScheduler::new(0.0, CashCadence::monthly(), false);
        assert_eq!(on.dividend(&bar), 0.42);
        assert_eq!(off.dividend(&bar), 0.0);
        // Dividends never count as external deposits.
        let mut s = on.clone();
        assert_eq!(s.on_bar(&bar).total(), 0.42);
        assert_eq!(s.total_added(), 0.0);
    }
}
