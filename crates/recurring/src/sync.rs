//! Propagating template changes into already-materialized entries.
//!
//! Editing a generated entry is dispatched by scope: pin the fields on the
//! one entry, or fold the edit back into the template and re-sync the
//! historical entries it governs. Future projections are never touched here;
//! they are re-derived from the updated template on the next read.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use coffers_core::{DomainError, DomainResult, EntryId};
use coffers_ledger::{LedgerEntry, OverridableField};

use crate::overrides::{EntryChanges, OverrideRecord, apply_entry_changes, detect_overrides};
use crate::rule::RecurringRule;
use crate::store::StoreTx;
use crate::template::TemplateChanges;

/// How far an edit to one generated entry should propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditScope {
    /// Pin the changed fields on this entry only; the template is untouched.
    ThisOnly,
    /// Fold the edit into the template and re-sync every entry of the rule,
    /// dropping all pins.
    All,
    /// Fold the edit into the template and re-sync entries from this
    /// entry's date forward, dropping their pins; earlier entries are left
    /// alone.
    AllForward,
}

/// Dispatch an entry edit by scope. Returns the number of entries whose
/// values changed.
pub fn apply_scope(
    tx: &mut impl StoreTx,
    rule: &mut RecurringRule,
    entry: &mut LedgerEntry,
    changes: &EntryChanges,
    scope: EditScope,
    now: DateTime<Utc>,
) -> DomainResult<usize> {
    match scope {
        EditScope::ThisOnly => pin_entry(tx, rule, entry, changes, now),
        EditScope::All => fold_into_template(tx, rule, changes, None, now),
        EditScope::AllForward => {
            // The boundary is always the edited entry's own date; an
            // arbitrary caller-supplied date could drift away from the entry
            // it was meant to split at.
            fold_into_template(tx, rule, changes, Some(entry.date), now)
        }
    }
}

fn pin_entry(
    tx: &mut impl StoreTx,
    rule: &RecurringRule,
    entry: &mut LedgerEntry,
    changes: &EntryChanges,
    now: DateTime<Utc>,
) -> DomainResult<usize> {
    let detected = detect_overrides(&rule.template, entry.occurrence_date, changes)?;

    let existing = tx.overrides_for_entry(entry.id)?;
    for item in detected {
        // The first recording captures the pre-override template value;
        // re-overriding only replaces the overridden side.
        let original = existing
            .iter()
            .find(|record| record.field == item.field)
            .map(|record| record.original.clone())
            .unwrap_or(item.template_value);
        tx.put_override(OverrideRecord {
            entry_id: entry.id,
            field: item.field,
            original,
            overridden: item.proposed,
            recorded_at: now,
        })?;
        entry.overridden_fields.insert(item.field);
    }

    apply_entry_changes(entry, changes, now);
    tx.update_entry(entry)?;
    Ok(1)
}

fn fold_into_template(
    tx: &mut impl StoreTx,
    rule: &mut RecurringRule,
    changes: &EntryChanges,
    from: Option<NaiveDate>,
    now: DateTime<Utc>,
) -> DomainResult<usize> {
    if changes.date.is_some() {
        return Err(DomainError::validation(
            "a date change applies to a single occurrence only",
        ));
    }

    changes.to_template_changes().apply(&mut rule.template)?;
    rule.touch(now);
    tx.update_rule(rule)?;

    // Pins in the affected window are dropped, so the affected entries are
    // brought back to the whole template, not only to the edited fields.
    propagate(tx, rule, &TemplateChanges::resync(&rule.template), from, true, now)
}

/// Push a template change-set into a rule's materialized entries.
///
/// `from` restricts the affected set to entries dated on or after it. With
/// `clear_pins` (the entry-edit scopes) every pin in the affected set is
/// deleted before syncing; without it (a rule-level update) pinned fields
/// are skipped and survive. Returns the number of entries whose values
/// changed.
pub fn propagate(
    tx: &mut impl StoreTx,
    rule: &RecurringRule,
    changes: &TemplateChanges,
    from: Option<NaiveDate>,
    clear_pins: bool,
    now: DateTime<Utc>,
) -> DomainResult<usize> {
    let mut entries = tx.entries_for_rule(rule.id, from)?;

    if clear_pins {
        let ids: Vec<EntryId> = entries.iter().map(|entry| entry.id).collect();
        tx.delete_overrides(&ids)?;
    }

    let mut updated = 0;
    for entry in &mut entries {
        let unpinned = clear_pins && !entry.overridden_fields.is_empty();
        if unpinned {
            entry.overridden_fields.clear();
        }
        let changed = sync_entry(entry, changes, now);
        if changed {
            updated += 1;
        }
        if changed || unpinned {
            tx.update_entry(entry)?;
        }
    }

    debug!(rule_id = %rule.id, updated, "propagated template changes");
    Ok(updated)
}

/// Write the changed template fields onto one entry, skipping pinned
/// fields. Returns whether any value actually moved.
fn sync_entry(entry: &mut LedgerEntry, changes: &TemplateChanges, now: DateTime<Utc>) -> bool {
    let mut touched = false;

    if let Some(name) = &changes.name {
        if entry.name != *name {
            entry.name = name.clone();
            touched = true;
        }
    }
    if let Some(amount) = changes.amount_cents {
        if !entry.is_overridden(OverridableField::Amount) && entry.amount_cents != amount {
            entry.amount_cents = amount;
            touched = true;
        }
    }
    if let Some(category) = changes.category {
        if !entry.is_overridden(OverridableField::Category) && entry.category != category {
            entry.category = category;
            touched = true;
        }
    }
    if let Some(subcategory) = changes.subcategory {
        if !entry.is_overridden(OverridableField::Subcategory) && entry.subcategory != subcategory {
            entry.subcategory = subcategory;
            touched = true;
        }
    }
    if let Some(liability) = changes.liability_id {
        if !entry.is_overridden(OverridableField::LinkedLiability) && entry.liability_id != liability
        {
            entry.liability_id = liability;
            touched = true;
        }
    }
    if let Some(description) = &changes.description {
        if !entry.is_overridden(OverridableField::Description) && entry.description != *description
        {
            entry.description = description.clone();
            touched = true;
        }
    }
    if let Some(memo) = &changes.memo {
        if !entry.is_overridden(OverridableField::Memo) && entry.memo != *memo {
            entry.memo = memo.clone();
            touched = true;
        }
    }
    if let Some(tags) = &changes.tags {
        if !entry.is_overridden(OverridableField::Tags) && entry.tags != *tags {
            entry.tags = tags.clone();
            touched = true;
        }
    }
    if let Some(metadata) = &changes.metadata {
        if entry.metadata != *metadata {
            entry.metadata = metadata.clone();
            touched = true;
        }
    }

    if touched {
        entry.updated_at = now;
    }
    touched
}
