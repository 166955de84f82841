//! Collaborator interfaces the engine drives.
//!
//! The engine owns no persistence of its own: rules, entries, and override
//! records live behind [`Store`], and account/category existence checks
//! behind [`AccountCatalog`]. Both are implemented by the surrounding
//! system; `coffers-infra` ships in-memory reference implementations.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::NaiveDate;

use coffers_core::{AccountId, CategoryId, DomainResult, EntryId, RuleId, UserId};
use coffers_ledger::LedgerEntry;

use crate::overrides::OverrideRecord;
use crate::rule::RecurringRule;

/// Transactional access to the backing store.
///
/// `transact` runs the closure against a transaction handle. Every mutation
/// performed through the handle is applied atomically on success and
/// discarded on error; a concurrent transaction never observes a partially
/// applied sequence.
pub trait Store: Send + Sync {
    type Tx<'a>: StoreTx
    where
        Self: 'a;

    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Self::Tx<'_>) -> DomainResult<T>,
    ) -> DomainResult<T>;
}

impl<S: Store + 'static> Store for Arc<S> {
    type Tx<'a>
        = S::Tx<'a>
    where
        Self: 'a;

    fn transact<T>(
        &self,
        f: impl FnOnce(&mut Self::Tx<'_>) -> DomainResult<T>,
    ) -> DomainResult<T> {
        (**self).transact(f)
    }
}

/// The narrow operations the engine needs from the backing store.
pub trait StoreTx {
    // Rule records.
    fn insert_rule(&mut self, rule: RecurringRule) -> DomainResult<()>;
    fn rule(&self, id: RuleId) -> DomainResult<Option<RecurringRule>>;
    /// All rules owned by a user, in a stable order.
    fn rules_for_user(&self, user_id: UserId) -> DomainResult<Vec<RecurringRule>>;
    fn update_rule(&mut self, rule: &RecurringRule) -> DomainResult<()>;
    fn delete_rule(&mut self, id: RuleId) -> DomainResult<()>;

    // Ledger entries.
    fn entry(&self, id: EntryId) -> DomainResult<Option<LedgerEntry>>;
    fn update_entry(&mut self, entry: &LedgerEntry) -> DomainResult<()>;
    /// Insert generated entries, skipping any whose `(rule, occurrence
    /// date)` pair already exists, and report how many were actually
    /// inserted. The uniqueness check belongs to the storage layer, so two
    /// racing materializations cannot double-create a date.
    fn insert_generated(&mut self, entries: Vec<LedgerEntry>) -> DomainResult<usize>;
    /// Generated entries still attached to a rule, ascending by date.
    /// `from` restricts to entries dated on or after it.
    fn entries_for_rule(
        &self,
        rule_id: RuleId,
        from: Option<NaiveDate>,
    ) -> DomainResult<Vec<LedgerEntry>>;
    /// Occurrence dates already materialized for a rule.
    fn occurrence_dates(&self, rule_id: RuleId) -> DomainResult<BTreeSet<NaiveDate>>;

    // Override records.
    /// Insert or replace the record for `(entry, field)`.
    fn put_override(&mut self, record: OverrideRecord) -> DomainResult<()>;
    /// Records for one entry, in a stable field order.
    fn overrides_for_entry(&self, entry_id: EntryId) -> DomainResult<Vec<OverrideRecord>>;
    fn delete_overrides(&mut self, entry_ids: &[EntryId]) -> DomainResult<()>;
}

/// Existence checks against the account/category subsystems.
pub trait AccountCatalog: Send + Sync {
    fn account_exists(&self, user_id: UserId, account_id: AccountId) -> DomainResult<bool>;
    fn category_exists(&self, user_id: UserId, category_id: CategoryId) -> DomainResult<bool>;
}

impl<A: AccountCatalog + ?Sized> AccountCatalog for Arc<A> {
    fn account_exists(&self, user_id: UserId, account_id: AccountId) -> DomainResult<bool> {
        (**self).account_exists(user_id, account_id)
    }

    fn category_exists(&self, user_id: UserId, category_id: CategoryId) -> DomainResult<bool> {
        (**self).category_exists(user_id, category_id)
    }
}
