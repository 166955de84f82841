//! Entry points exposed to calling code.
//!
//! `RecurringService` is the facade the rest of the system talks to. Every
//! multi-step sequence (create + materialize, template update + re-sync)
//! runs inside one store transaction, so a failure leaves no partial state
//! behind.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use coffers_core::{CategoryId, Clock, DomainError, DomainResult, EntryId, RuleId, UserId};
use coffers_ledger::LedgerEntry;

use crate::forecast::{ForecastedEntry, forecast_user};
use crate::materialize::materialize_historical;
use crate::overrides::{EntryChanges, OverrideRecord, restore_field};
use crate::rule::{NewRule, RecurringRule, RuleUpdate};
use crate::schedule::{Bound, Frequency, Schedule};
use crate::store::{AccountCatalog, Store, StoreTx};
use crate::sync::{EditScope, apply_scope, propagate};
use crate::template::{EntryTemplate, TemplateChanges};

/// Default number of dates returned by a preview.
pub const DEFAULT_PREVIEW: usize = 10;
/// Hard ceiling on preview size.
pub const MAX_PREVIEW: usize = 100;

/// The recurring-obligation engine's service facade.
pub struct RecurringService<S, A, C> {
    store: S,
    accounts: A,
    clock: C,
}

/// Result of creating a rule: the stored record plus how many historical
/// entries were materialized alongside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedRule {
    pub rule: RecurringRule,
    pub materialized: usize,
}

/// Result of a rule update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleUpdateOutcome {
    pub rule: RecurringRule,
    /// Entries whose values changed during propagation.
    pub updated_entries: usize,
}

/// Result of an entry edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryEditOutcome {
    /// The edited entry as stored after the edit.
    pub entry: LedgerEntry,
    /// Entries whose values changed, the edited one included.
    pub updated_entries: usize,
}

/// An as-yet-uncreated configuration to preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewRequest {
    pub frequency: Frequency,
    pub interval: u32,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub occurrence_count: Option<u32>,
}

impl<S: Store, A: AccountCatalog, C: Clock> RecurringService<S, A, C> {
    pub fn new(store: S, accounts: A, clock: C) -> Self {
        Self {
            store,
            accounts,
            clock,
        }
    }

    /// Create a rule and materialize its historical window as one unit.
    ///
    /// Validation runs before anything is written, so a failed creation
    /// leaves neither a rule without entries nor entries without a rule.
    pub fn create_rule(&self, user_id: UserId, new_rule: NewRule) -> DomainResult<CreatedRule> {
        let now = self.clock.now();
        self.check_template(user_id, &new_rule.template)?;
        let rule = new_rule.into_rule(RuleId::new(), user_id, now)?;

        self.store.transact(move |tx| {
            let mut rule = rule;
            tx.insert_rule(rule.clone())?;
            let materialized = materialize_historical(tx, &mut rule, now)?;
            info!(rule_id = %rule.id, materialized, "created recurring rule");
            Ok(CreatedRule { rule, materialized })
        })
    }

    pub fn list_rules(&self, user_id: UserId) -> DomainResult<Vec<RecurringRule>> {
        self.store.transact(|tx| tx.rules_for_user(user_id))
    }

    pub fn get_rule(&self, user_id: UserId, rule_id: RuleId) -> DomainResult<RecurringRule> {
        self.store.transact(|tx| load_rule(tx, user_id, rule_id))
    }

    /// Update a rule: rename, (de)activate, reschedule, and/or change the
    /// template. Template changes are pushed into materialized entries for
    /// every field they do not individually pin.
    pub fn update_rule(
        &self,
        user_id: UserId,
        rule_id: RuleId,
        update: RuleUpdate,
    ) -> DomainResult<RuleUpdateOutcome> {
        let now = self.clock.now();
        self.check_template_changes(user_id, &update.template)?;

        self.store.transact(move |tx| {
            let mut rule = load_rule(tx, user_id, rule_id)?;
            let mut mutated = false;

            if let Some(name) = &update.name {
                rule.name = name.clone();
            }
            if let Some(active) = update.is_active {
                rule.is_active = active;
            }

            let mut updated_entries = 0;
            if !update.template.is_empty() {
                update.template.apply(&mut rule.template)?;
                mutated = true;
                updated_entries = propagate(tx, &rule, &update.template, None, false, now)?;
            }

            if update.reschedules() {
                rule.schedule = update.apply_schedule(&rule.schedule)?;
                mutated = true;
            }

            if mutated {
                rule.touch(now);
            } else {
                rule.updated_at = now;
            }
            tx.update_rule(&rule)?;
            info!(rule_id = %rule.id, updated_entries, "updated recurring rule");
            Ok(RuleUpdateOutcome {
                rule,
                updated_entries,
            })
        })
    }

    /// Edit one generated entry, propagating by scope.
    pub fn edit_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
        changes: EntryChanges,
        scope: EditScope,
    ) -> DomainResult<EntryEditOutcome> {
        if changes.is_empty() {
            return Err(DomainError::validation("no changes supplied"));
        }
        let now = self.clock.now();
        self.check_entry_changes(user_id, &changes)?;

        self.store.transact(move |tx| {
            let (mut entry, rule_id) = load_generated_entry(tx, user_id, entry_id)?;
            let mut rule = load_rule(tx, user_id, rule_id)?;

            let updated_entries = apply_scope(tx, &mut rule, &mut entry, &changes, scope, now)?;

            // Wider scopes rewrite the entry through propagation; hand back
            // what is actually stored.
            let entry = tx
                .entry(entry_id)?
                .ok_or(DomainError::NotFound)?;
            Ok(EntryEditOutcome {
                entry,
                updated_entries,
            })
        })
    }

    /// Unpin every overridden field on an entry and re-sync those fields to
    /// the current template.
    pub fn clear_entry_overrides(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> DomainResult<LedgerEntry> {
        let now = self.clock.now();
        self.store.transact(move |tx| {
            let (mut entry, rule_id) = load_generated_entry(tx, user_id, entry_id)?;
            let rule = load_rule(tx, user_id, rule_id)?;

            if entry.overridden_fields.is_empty() {
                return Ok(entry);
            }

            tx.delete_overrides(&[entry.id])?;
            let pinned: Vec<_> = entry.overridden_fields.iter().copied().collect();
            entry.overridden_fields.clear();
            for field in pinned {
                restore_field(&mut entry, &rule.template, field);
            }
            entry.updated_at = now;
            tx.update_entry(&entry)?;
            Ok(entry)
        })
    }

    /// Delete a rule. Generated entries are detached, not deleted: they
    /// survive as standalone records.
    pub fn delete_rule(&self, user_id: UserId, rule_id: RuleId) -> DomainResult<usize> {
        let now = self.clock.now();
        self.store.transact(move |tx| {
            let rule = load_rule(tx, user_id, rule_id)?;

            let entries = tx.entries_for_rule(rule.id, None)?;
            let mut detached = Vec::with_capacity(entries.len());
            for mut entry in entries {
                entry.detach(now);
                tx.update_entry(&entry)?;
                detached.push(entry.id);
            }
            tx.delete_overrides(&detached)?;
            tx.delete_rule(rule.id)?;
            info!(rule_id = %rule.id, detached = detached.len(), "deleted recurring rule");
            Ok(detached.len())
        })
    }

    /// Preview the dates a configuration would produce, without creating
    /// anything. Defaults to [`DEFAULT_PREVIEW`] dates, capped at
    /// [`MAX_PREVIEW`].
    pub fn preview_occurrences(
        &self,
        request: PreviewRequest,
        limit: Option<usize>,
    ) -> DomainResult<Vec<NaiveDate>> {
        let limit = limit.unwrap_or(DEFAULT_PREVIEW).min(MAX_PREVIEW);
        let bound = Bound::from_parts(request.end_date, request.occurrence_count);
        let schedule = Schedule::new(request.frequency, request.interval, request.start_date, bound)?;
        let mut dates = schedule.occurrences(self.clock.today());
        dates.truncate(limit);
        Ok(dates)
    }

    /// Materialize one rule's historical window.
    pub fn materialize_rule(&self, user_id: UserId, rule_id: RuleId) -> DomainResult<usize> {
        let now = self.clock.now();
        self.store.transact(move |tx| {
            let mut rule = load_rule(tx, user_id, rule_id)?;
            materialize_historical(tx, &mut rule, now)
        })
    }

    /// Materialize every active rule of a user. Intended to run once per
    /// day; repeated runs create nothing new.
    pub fn materialize_user(&self, user_id: UserId) -> DomainResult<usize> {
        let now = self.clock.now();
        self.store.transact(move |tx| {
            let mut total = 0;
            for mut rule in tx.rules_for_user(user_id)? {
                total += materialize_historical(tx, &mut rule, now)?;
            }
            info!(user_id = %user_id, created = total, "materialized active rules");
            Ok(total)
        })
    }

    /// Ephemeral projections for the user's active rules across a range.
    pub fn forecast(
        &self,
        user_id: UserId,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> DomainResult<Vec<ForecastedEntry>> {
        let today = self.clock.today();
        self.store
            .transact(|tx| forecast_user(tx, user_id, range_start, range_end, today))
    }

    /// Generated entries currently attached to a rule.
    pub fn entries_for_rule(
        &self,
        user_id: UserId,
        rule_id: RuleId,
    ) -> DomainResult<Vec<LedgerEntry>> {
        self.store.transact(|tx| {
            let rule = load_rule(tx, user_id, rule_id)?;
            tx.entries_for_rule(rule.id, None)
        })
    }

    /// Override records for one entry.
    pub fn overrides_for_entry(
        &self,
        user_id: UserId,
        entry_id: EntryId,
    ) -> DomainResult<Vec<OverrideRecord>> {
        self.store.transact(|tx| {
            let (entry, _) = load_generated_entry(tx, user_id, entry_id)?;
            tx.overrides_for_entry(entry.id)
        })
    }

    fn check_template(&self, user_id: UserId, template: &EntryTemplate) -> DomainResult<()> {
        template.validate()?;
        if !self.accounts.account_exists(user_id, template.account_id)? {
            return Err(DomainError::validation("target account does not exist"));
        }
        if let Some(to_account) = template.kind.to_account_id() {
            if !self.accounts.account_exists(user_id, to_account)? {
                return Err(DomainError::validation(
                    "destination account does not exist",
                ));
            }
        }
        for category in [template.kind.category(), template.kind.subcategory()]
            .into_iter()
            .flatten()
        {
            self.check_category(user_id, category)?;
        }
        Ok(())
    }

    fn check_template_changes(
        &self,
        user_id: UserId,
        changes: &TemplateChanges,
    ) -> DomainResult<()> {
        for category in [changes.category, changes.subcategory]
            .into_iter()
            .flatten()
            .flatten()
        {
            self.check_category(user_id, category)?;
        }
        Ok(())
    }

    fn check_entry_changes(&self, user_id: UserId, changes: &EntryChanges) -> DomainResult<()> {
        for category in [changes.category, changes.subcategory]
            .into_iter()
            .flatten()
            .flatten()
        {
            self.check_category(user_id, category)?;
        }
        Ok(())
    }

    fn check_category(&self, user_id: UserId, category: CategoryId) -> DomainResult<()> {
        if !self.accounts.category_exists(user_id, category)? {
            return Err(DomainError::validation("category does not exist"));
        }
        Ok(())
    }
}

fn load_rule<T: StoreTx>(tx: &T, user_id: UserId, rule_id: RuleId) -> DomainResult<RecurringRule> {
    match tx.rule(rule_id)? {
        Some(rule) if rule.user_id == user_id => Ok(rule),
        _ => Err(DomainError::NotFound),
    }
}

fn load_generated_entry<T: StoreTx>(
    tx: &T,
    user_id: UserId,
    entry_id: EntryId,
) -> DomainResult<(LedgerEntry, RuleId)> {
    let entry = match tx.entry(entry_id)? {
        Some(entry) if entry.user_id == user_id => entry,
        _ => return Err(DomainError::NotFound),
    };
    let rule_id = entry.rule_id.ok_or_else(|| {
        DomainError::validation("entry is not attached to a recurring rule")
    })?;
    Ok((entry, rule_id))
}
