use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coffers_core::{DomainResult, RuleId, UserId};

use crate::schedule::{Bound, Frequency, Schedule};
use crate::template::{EntryTemplate, TemplateChanges};

/// A recurring rule: the specification a stream of ledger entries derives
/// from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringRule {
    pub id: RuleId,
    pub user_id: UserId,
    pub name: String,
    pub schedule: Schedule,
    pub template: EntryTemplate,
    /// Inactive rules generate nothing: materialization and forecasts both
    /// skip them.
    pub is_active: bool,
    /// Bumped on every template or schedule mutation.
    pub version: u64,
    /// High-water mark of historical coverage. Only ever advanced.
    pub last_materialized: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringRule {
    /// Record a template or schedule mutation.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }

    /// Advance the materialization watermark; never moves backwards.
    pub fn advance_watermark(&mut self, to: NaiveDate) {
        if self.last_materialized.map_or(true, |current| current < to) {
            self.last_materialized = Some(to);
        }
    }
}

fn default_active() -> bool {
    true
}

/// Caller payload for creating a rule.
///
/// `end_date` and `occurrence_count` are both optional; supplying both is
/// not an error — the count wins (see `Bound::from_parts`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRule {
    pub name: String,
    pub frequency: Frequency,
    pub interval: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub occurrence_count: Option<u32>,
    pub template: EntryTemplate,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

impl NewRule {
    pub fn new(
        name: impl Into<String>,
        frequency: Frequency,
        interval: u32,
        start_date: NaiveDate,
        template: EntryTemplate,
    ) -> Self {
        Self {
            name: name.into(),
            frequency,
            interval,
            start_date,
            end_date: None,
            occurrence_count: None,
            template,
            is_active: true,
        }
    }

    pub fn until(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    pub fn count(mut self, occurrence_count: u32) -> Self {
        self.occurrence_count = Some(occurrence_count);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn bound(&self) -> Bound {
        Bound::from_parts(self.end_date, self.occurrence_count)
    }

    /// Validate and promote the payload into a rule record.
    pub fn into_rule(
        self,
        id: RuleId,
        user_id: UserId,
        now: DateTime<Utc>,
    ) -> DomainResult<RecurringRule> {
        let schedule = Schedule::new(self.frequency, self.interval, self.start_date, self.bound())?;
        self.template.validate()?;
        Ok(RecurringRule {
            id,
            user_id,
            name: self.name,
            schedule,
            template: self.template,
            is_active: self.is_active,
            version: 1,
            last_materialized: None,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Partial update of a rule. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdate {
    pub name: Option<String>,
    pub is_active: Option<bool>,
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub start_date: Option<NaiveDate>,
    /// `Some(None)` clears the end date.
    pub end_date: Option<Option<NaiveDate>>,
    /// `Some(None)` clears the occurrence count.
    pub occurrence_count: Option<Option<u32>>,
    #[serde(default)]
    pub template: TemplateChanges,
}

impl RuleUpdate {
    pub fn reschedules(&self) -> bool {
        self.frequency.is_some()
            || self.interval.is_some()
            || self.start_date.is_some()
            || self.end_date.is_some()
            || self.occurrence_count.is_some()
    }

    /// The schedule after this update, re-validated; the count-wins rule
    /// applies to the combined bound parts.
    pub(crate) fn apply_schedule(&self, current: &Schedule) -> DomainResult<Schedule> {
        let (current_end, current_count) = match current.bound {
            Bound::Until(end) => (Some(end), None),
            Bound::Count(count) => (None, Some(count)),
            Bound::Open => (None, None),
        };
        let bound = Bound::from_parts(
            self.end_date.unwrap_or(current_end),
            self.occurrence_count.unwrap_or(current_count),
        );
        Schedule::new(
            self.frequency.unwrap_or(current.frequency),
            self.interval.unwrap_or(current.interval),
            self.start_date.unwrap_or(current.start_date),
            bound,
        )
    }
}
