//! Field-level override tracking.
//!
//! A user editing one generated entry pins the changed fields on that entry:
//! later template syncs skip pinned fields, and the pre-edit template value
//! is kept so the edit can be audited or unwound.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use coffers_core::{CategoryId, DomainError, DomainResult, EntryId, LiabilityId};
use coffers_ledger::{LedgerEntry, OverridableField};

use crate::template::{EntryTemplate, TemplateChanges};

/// A typed field value, used to compare proposals against the template and
/// to record override history.
///
/// Tags compare structurally; everything else compares by value. One variant
/// per comparator, no reflection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Money(i64),
    Date(NaiveDate),
    Category(Option<CategoryId>),
    Liability(Option<LiabilityId>),
    Text(Option<String>),
    Tags(Vec<String>),
}

/// A per-entry edit restricted to the overridable field set.
///
/// The struct is the allow-list: anything not representable here cannot be
/// overridden. `Some(None)` clears an optional value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryChanges {
    pub amount_cents: Option<i64>,
    pub date: Option<NaiveDate>,
    pub category: Option<Option<CategoryId>>,
    pub subcategory: Option<Option<CategoryId>>,
    pub description: Option<Option<String>>,
    pub memo: Option<Option<String>>,
    pub tags: Option<Vec<String>>,
    pub liability_id: Option<Option<LiabilityId>>,
}

impl EntryChanges {
    pub fn is_empty(&self) -> bool {
        self.amount_cents.is_none()
            && self.date.is_none()
            && self.category.is_none()
            && self.subcategory.is_none()
            && self.description.is_none()
            && self.memo.is_none()
            && self.tags.is_none()
            && self.liability_id.is_none()
    }

    /// Proposed value per touched field, in allow-list order.
    fn proposals(&self) -> Vec<(OverridableField, FieldValue)> {
        let mut out = Vec::new();
        if let Some(amount) = self.amount_cents {
            out.push((OverridableField::Amount, FieldValue::Money(amount)));
        }
        if let Some(date) = self.date {
            out.push((OverridableField::Date, FieldValue::Date(date)));
        }
        if let Some(category) = self.category {
            out.push((OverridableField::Category, FieldValue::Category(category)));
        }
        if let Some(subcategory) = self.subcategory {
            out.push((
                OverridableField::Subcategory,
                FieldValue::Category(subcategory),
            ));
        }
        if let Some(description) = &self.description {
            out.push((
                OverridableField::Description,
                FieldValue::Text(description.clone()),
            ));
        }
        if let Some(memo) = &self.memo {
            out.push((OverridableField::Memo, FieldValue::Text(memo.clone())));
        }
        if let Some(tags) = &self.tags {
            out.push((OverridableField::Tags, FieldValue::Tags(tags.clone())));
        }
        if let Some(liability) = self.liability_id {
            out.push((
                OverridableField::LinkedLiability,
                FieldValue::Liability(liability),
            ));
        }
        out
    }

    /// The template-level equivalent of this edit. The date has no template
    /// counterpart and must be absent when calling this.
    pub(crate) fn to_template_changes(&self) -> TemplateChanges {
        TemplateChanges {
            name: None,
            amount_cents: self.amount_cents,
            category: self.category,
            subcategory: self.subcategory,
            liability_id: self.liability_id,
            description: self.description.clone(),
            memo: self.memo.clone(),
            tags: self.tags.clone(),
            metadata: None,
        }
    }
}

/// One field a proposed edit moves away from the template.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedOverride {
    pub field: OverridableField,
    /// Template-side value at detection time.
    pub template_value: FieldValue,
    pub proposed: FieldValue,
}

/// Durable record of one pinned field on one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverrideRecord {
    pub entry_id: EntryId,
    pub field: OverridableField,
    /// Template value at the time of the first override. Re-overriding the
    /// same field keeps this untouched.
    pub original: FieldValue,
    pub overridden: FieldValue,
    pub recorded_at: DateTime<Utc>,
}

/// Template-side value for an overridable field.
///
/// The template carries no date of its own; an entry's template date is the
/// cadence date it was generated for.
pub fn template_value(
    template: &EntryTemplate,
    occurrence_date: NaiveDate,
    field: OverridableField,
) -> FieldValue {
    match field {
        OverridableField::Amount => FieldValue::Money(template.amount_cents),
        OverridableField::Date => FieldValue::Date(occurrence_date),
        OverridableField::Category => FieldValue::Category(template.kind.category()),
        OverridableField::Subcategory => FieldValue::Category(template.kind.subcategory()),
        OverridableField::Description => FieldValue::Text(template.description.clone()),
        OverridableField::Memo => FieldValue::Text(template.memo.clone()),
        OverridableField::Tags => FieldValue::Tags(template.tags.clone()),
        OverridableField::LinkedLiability => FieldValue::Liability(template.kind.liability_id()),
    }
}

/// Compare a proposed edit against the rule's current template.
///
/// A field counts as overridden when the proposal differs from the template
/// value, regardless of what the entry currently holds. Link fields that are
/// invalid for the template's kind are rejected outright.
pub fn detect_overrides(
    template: &EntryTemplate,
    occurrence_date: NaiveDate,
    changes: &EntryChanges,
) -> DomainResult<Vec<DetectedOverride>> {
    if (changes.category.is_some() || changes.subcategory.is_some())
        && !template.kind.supports_category()
    {
        return Err(DomainError::validation(
            "transfer entries do not carry a category",
        ));
    }
    if changes.liability_id.is_some() && !template.kind.supports_liability() {
        return Err(DomainError::validation(
            "only expense entries can link a liability",
        ));
    }

    let mut detected = Vec::new();
    for (field, proposed) in changes.proposals() {
        let current = template_value(template, occurrence_date, field);
        if proposed != current {
            detected.push(DetectedOverride {
                field,
                template_value: current,
                proposed,
            });
        }
    }
    Ok(detected)
}

/// Write an edit's values onto the entry itself. Pinning is the caller's
/// concern.
pub fn apply_entry_changes(entry: &mut LedgerEntry, changes: &EntryChanges, now: DateTime<Utc>) {
    if let Some(amount) = changes.amount_cents {
        entry.amount_cents = amount;
    }
    if let Some(date) = changes.date {
        entry.date = date;
    }
    if let Some(category) = changes.category {
        entry.category = category;
    }
    if let Some(subcategory) = changes.subcategory {
        entry.subcategory = subcategory;
    }
    if let Some(description) = &changes.description {
        entry.description = description.clone();
    }
    if let Some(memo) = &changes.memo {
        entry.memo = memo.clone();
    }
    if let Some(tags) = &changes.tags {
        entry.tags = tags.clone();
    }
    if let Some(liability) = changes.liability_id {
        entry.liability_id = liability;
    }
    entry.updated_at = now;
}

/// Reset one entry field back to the template.
pub fn restore_field(entry: &mut LedgerEntry, template: &EntryTemplate, field: OverridableField) {
    match field {
        OverridableField::Amount => entry.amount_cents = template.amount_cents,
        OverridableField::Date => entry.date = entry.occurrence_date,
        OverridableField::Category => entry.category = template.kind.category(),
        OverridableField::Subcategory => entry.subcategory = template.kind.subcategory(),
        OverridableField::Description => entry.description = template.description.clone(),
        OverridableField::Memo => entry.memo = template.memo.clone(),
        OverridableField::Tags => entry.tags = template.tags.clone(),
        OverridableField::LinkedLiability => entry.liability_id = template.kind.liability_id(),
    }
}
