//! Occurrence generation: expanding a cadence specification into an ordered
//! sequence of calendar dates.

use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use coffers_core::{DomainError, DomainResult};

/// Cadence vocabulary.
///
/// `Biweekly` and `Quarterly` are fixed multiples of `Weekly` and `Monthly`;
/// a caller-supplied interval on them is ignored in favor of the fixed
/// multiplier. `Custom` repeats every `interval` days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Biweekly,
    Monthly,
    Quarterly,
    Annually,
    Custom,
}

/// Termination bound of a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    /// Generate through this date, inclusive.
    Until(NaiveDate),
    /// Generate exactly this many occurrences, regardless of calendar span.
    Count(u32),
    /// No explicit bound: a moving one-year horizon from "today".
    Open,
}

impl Bound {
    /// Normalize the caller's optional end date and occurrence count into a
    /// bound. When both are supplied the count wins.
    pub fn from_parts(end_date: Option<NaiveDate>, occurrence_count: Option<u32>) -> Self {
        match (occurrence_count, end_date) {
            (Some(count), _) => Bound::Count(count),
            (None, Some(end)) => Bound::Until(end),
            (None, None) => Bound::Open,
        }
    }
}

/// Effective step after cadence normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Days(u32),
    Months(u32),
}

/// A recurring cadence: frequency and interval anchored at a start date,
/// with a termination bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    /// Multiplier on the base cadence. Ignored for biweekly/quarterly.
    pub interval: u32,
    pub start_date: NaiveDate,
    pub bound: Bound,
}

impl Schedule {
    pub fn new(
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        bound: Bound,
    ) -> DomainResult<Self> {
        if interval == 0 {
            return Err(DomainError::validation("interval must be at least 1"));
        }
        match bound {
            Bound::Count(0) => {
                return Err(DomainError::validation("occurrence count must be at least 1"));
            }
            Bound::Until(end) if end < start_date => {
                return Err(DomainError::validation("end date precedes start date"));
            }
            _ => {}
        }
        Ok(Self {
            frequency,
            interval,
            start_date,
            bound,
        })
    }

    fn step(&self) -> Step {
        match self.frequency {
            Frequency::Daily => Step::Days(self.interval),
            Frequency::Weekly => Step::Days(self.interval * 7),
            Frequency::Biweekly => Step::Days(14),
            Frequency::Monthly => Step::Months(self.interval),
            Frequency::Quarterly => Step::Months(3),
            Frequency::Annually => Step::Months(self.interval * 12),
            Frequency::Custom => Step::Days(self.interval),
        }
    }

    /// Date of the `n`-th occurrence (0-based).
    ///
    /// Month-family steps add whole months from the anchor and clamp to the
    /// last valid day of the target month, so a schedule anchored on the
    /// 31st lands on Feb 28 and Apr 30 rather than skipping those months.
    fn nth(&self, n: u32) -> Option<NaiveDate> {
        match self.step() {
            Step::Days(days) => self
                .start_date
                .checked_add_days(Days::new(u64::from(days) * u64::from(n))),
            Step::Months(months) => self
                .start_date
                .checked_add_months(Months::new(months.checked_mul(n)?)),
        }
    }

    /// Expand the schedule into its full ordered date sequence, starting at
    /// `start_date`.
    ///
    /// `today` only matters for [`Bound::Open`], which terminates at
    /// `today + 1 year`; with an explicit bound the output is a pure
    /// function of the schedule, so re-derivation is stable.
    pub fn occurrences(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        match self.bound {
            Bound::Count(count) => {
                for n in 0..count {
                    match self.nth(n) {
                        Some(date) => dates.push(date),
                        None => break,
                    }
                }
            }
            Bound::Until(end) => self.push_until(&mut dates, end),
            Bound::Open => {
                let horizon = today
                    .checked_add_months(Months::new(12))
                    .unwrap_or(NaiveDate::MAX);
                self.push_until(&mut dates, horizon);
            }
        }
        dates
    }

    fn push_until(&self, dates: &mut Vec<NaiveDate>, end: NaiveDate) {
        for n in 0u32.. {
            match self.nth(n) {
                Some(date) if date <= end => dates.push(date),
                _ => break,
            }
        }
    }

    /// Occurrences restricted to `[from, to]`, inclusive.
    ///
    /// Bounds still apply to the whole sequence: a count bound counts from
    /// `start_date`, not from `from`.
    pub fn occurrences_between(
        &self,
        today: NaiveDate,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Vec<NaiveDate> {
        self.occurrences(today)
            .into_iter()
            .filter(|date| *date >= from && *date <= to)
            .collect()
    }
}
