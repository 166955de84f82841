//! In-memory backing store and account catalog.
//!
//! Reference implementations of the engine's collaborator traits, used by
//! tests and embedding callers that do not bring their own persistence.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::NaiveDate;

use coffers_core::{AccountId, CategoryId, DomainError, DomainResult, EntryId, RuleId, UserId};
use coffers_ledger::{LedgerEntry, OverridableField};
use coffers_recurring::overrides::OverrideRecord;
use coffers_recurring::rule::RecurringRule;
use coffers_recurring::store::{AccountCatalog, Store, StoreTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rules: HashMap<RuleId, RecurringRule>,
    entries: HashMap<EntryId, LedgerEntry>,
    /// Unique index: one generated entry per (rule, cadence date).
    occurrence_index: HashSet<(RuleId, NaiveDate)>,
    overrides: HashMap<(EntryId, OverridableField), OverrideRecord>,
}

/// In-memory backing store.
///
/// A transaction holds the single write lock for its whole lifetime, so
/// concurrent callers serialize and never observe a half-applied sequence.
/// On error the pre-transaction snapshot is restored.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

/// Transaction handle over the locked state.
pub struct MemoryTx<'a> {
    state: &'a mut MemoryState,
}

impl Store for MemoryStore {
    type Tx<'a> = MemoryTx<'a>;

    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Self::Tx<'_>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        let mut guard = self
            .state
            .write()
            .map_err(|_| DomainError::storage("backing store lock poisoned"))?;
        let snapshot = guard.clone();

        let result = {
            let mut tx = MemoryTx { state: &mut guard };
            f(&mut tx)
        };

        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = snapshot;
                Err(err)
            }
        }
    }
}

impl StoreTx for MemoryTx<'_> {
    fn insert_rule(&mut self, rule: RecurringRule) -> DomainResult<()> {
        if self.state.rules.contains_key(&rule.id) {
            return Err(DomainError::conflict(format!(
                "rule {} already exists",
                rule.id
            )));
        }
        self.state.rules.insert(rule.id, rule);
        Ok(())
    }

    fn rule(&self, id: RuleId) -> DomainResult<Option<RecurringRule>> {
        Ok(self.state.rules.get(&id).cloned())
    }

    fn rules_for_user(&self, user_id: UserId) -> DomainResult<Vec<RecurringRule>> {
        let mut rules: Vec<_> = self
            .state
            .rules
            .values()
            .filter(|rule| rule.user_id == user_id)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| (rule.created_at, *rule.id.as_uuid()));
        Ok(rules)
    }

    fn update_rule(&mut self, rule: &RecurringRule) -> DomainResult<()> {
        match self.state.rules.get_mut(&rule.id) {
            Some(slot) => {
                *slot = rule.clone();
                Ok(())
            }
            None => Err(DomainError::NotFound),
        }
    }

    fn delete_rule(&mut self, id: RuleId) -> DomainResult<()> {
        self.state
            .rules
            .remove(&id)
            .map(|_| ())
            .ok_or(DomainError::NotFound)
    }

    fn entry(&self, id: EntryId) -> DomainResult<Option<LedgerEntry>> {
        Ok(self.state.entries.get(&id).cloned())
    }

    fn update_entry(&mut self, entry: &LedgerEntry) -> DomainResult<()> {
        let slot = match self.state.entries.get_mut(&entry.id) {
            Some(slot) => slot,
            None => return Err(DomainError::NotFound),
        };
        // Detaching frees the (rule, date) slot in the unique index.
        if let Some(old_rule) = slot.rule_id {
            if entry.rule_id.is_none() {
                self.state
                    .occurrence_index
                    .remove(&(old_rule, slot.occurrence_date));
            }
        }
        *slot = entry.clone();
        Ok(())
    }

    fn insert_generated(&mut self, entries: Vec<LedgerEntry>) -> DomainResult<usize> {
        let mut inserted = 0;
        for entry in entries {
            let rule_id = entry.rule_id.ok_or_else(|| {
                DomainError::invariant("generated entry must reference its rule")
            })?;
            if !self
                .state
                .occurrence_index
                .insert((rule_id, entry.occurrence_date))
            {
                // Another materialization already claimed this date.
                continue;
            }
            if self.state.entries.contains_key(&entry.id) {
                return Err(DomainError::conflict(format!(
                    "entry {} already exists",
                    entry.id
                )));
            }
            self.state.entries.insert(entry.id, entry);
            inserted += 1;
        }
        Ok(inserted)
    }

    fn entries_for_rule(
        &self,
        rule_id: RuleId,
        from: Option<NaiveDate>,
    ) -> DomainResult<Vec<LedgerEntry>> {
        let mut entries: Vec<_> = self
            .state
            .entries
            .values()
            .filter(|entry| {
                entry.rule_id == Some(rule_id)
                    && from.map_or(true, |boundary| entry.date >= boundary)
            })
            .cloned()
            .collect();
        entries.sort_by_key(|entry| (entry.date, *entry.id.as_uuid()));
        Ok(entries)
    }

    fn occurrence_dates(&self, rule_id: RuleId) -> DomainResult<BTreeSet<NaiveDate>> {
        Ok(self
            .state
            .occurrence_index
            .iter()
            .filter(|(rule, _)| *rule == rule_id)
            .map(|(_, date)| *date)
            .collect())
    }

    fn put_override(&mut self, record: OverrideRecord) -> DomainResult<()> {
        self.state
            .overrides
            .insert((record.entry_id, record.field), record);
        Ok(())
    }

    fn overrides_for_entry(&self, entry_id: EntryId) -> DomainResult<Vec<OverrideRecord>> {
        let mut records: Vec<_> = self
            .state
            .overrides
            .values()
            .filter(|record| record.entry_id == entry_id)
            .cloned()
            .collect();
        records.sort_by_key(|record| record.field);
        Ok(records)
    }

    fn delete_overrides(&mut self, entry_ids: &[EntryId]) -> DomainResult<()> {
        let ids: HashSet<&EntryId> = entry_ids.iter().collect();
        self.state
            .overrides
            .retain(|(entry_id, _), _| !ids.contains(entry_id));
        Ok(())
    }
}

/// In-memory account/category registry.
#[derive(Debug, Default)]
pub struct MemoryAccountCatalog {
    accounts: RwLock<HashSet<(UserId, AccountId)>>,
    categories: RwLock<HashSet<(UserId, CategoryId)>>,
}

impl MemoryAccountCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, user_id: UserId, account_id: AccountId) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert((user_id, account_id));
        }
    }

    pub fn add_category(&self, user_id: UserId, category_id: CategoryId) {
        if let Ok(mut categories) = self.categories.write() {
            categories.insert((user_id, category_id));
        }
    }
}

impl AccountCatalog for MemoryAccountCatalog {
    fn account_exists(&self, user_id: UserId, account_id: AccountId) -> DomainResult<bool> {
        let accounts = self
            .accounts
            .read()
            .map_err(|_| DomainError::storage("account catalog lock poisoned"))?;
        Ok(accounts.contains(&(user_id, account_id)))
    }

    fn category_exists(&self, user_id: UserId, category_id: CategoryId) -> DomainResult<bool> {
        let categories = self
            .categories
            .read()
            .map_err(|_| DomainError::storage("account catalog lock poisoned"))?;
        Ok(categories.contains(&(user_id, category_id)))
    }
}
