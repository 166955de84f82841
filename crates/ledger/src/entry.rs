use std::collections::BTreeSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use coffers_core::{AccountId, CategoryId, EntryId, LiabilityId, RuleId, UserId};

/// Monetary direction of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
    Transfer,
}

/// Entry fields a user may pin on a single generated entry.
///
/// A pinned field is skipped by template syncs until explicitly unpinned.
/// Identity, ownership, the posting account, the kind, and the rule linkage
/// are never overridable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OverridableField {
    Amount,
    Date,
    Category,
    Subcategory,
    Description,
    Memo,
    Tags,
    LinkedLiability,
}

impl OverridableField {
    pub const ALL: [OverridableField; 8] = [
        OverridableField::Amount,
        OverridableField::Date,
        OverridableField::Category,
        OverridableField::Subcategory,
        OverridableField::Description,
        OverridableField::Memo,
        OverridableField::Tags,
        OverridableField::LinkedLiability,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverridableField::Amount => "amount",
            OverridableField::Date => "date",
            OverridableField::Category => "category",
            OverridableField::Subcategory => "subcategory",
            OverridableField::Description => "description",
            OverridableField::Memo => "memo",
            OverridableField::Tags => "tags",
            OverridableField::LinkedLiability => "linked_liability",
        }
    }
}

impl core::fmt::Display for OverridableField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete ledger entry.
///
/// Generated entries keep a back-reference to the rule that produced them.
/// The reference is cleared when the rule is deleted; the entry lives on as
/// a standalone record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub name: String,
    /// Positive amount in the smallest currency unit; direction comes from
    /// `kind`.
    pub amount_cents: i64,
    /// User-visible posting date. Overridable.
    pub date: NaiveDate,
    /// Cadence date the entry was generated for. Immutable; together with
    /// `rule_id` it is the materialization idempotency key.
    pub occurrence_date: NaiveDate,
    pub category: Option<CategoryId>,
    pub subcategory: Option<CategoryId>,
    pub liability_id: Option<LiabilityId>,
    /// Destination account, for transfers.
    pub to_account_id: Option<AccountId>,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<JsonValue>,
    pub is_generated: bool,
    pub rule_id: Option<RuleId>,
    /// Fields locally pinned on this entry.
    pub overridden_fields: BTreeSet<OverridableField>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn is_overridden(&self, field: OverridableField) -> bool {
        self.overridden_fields.contains(&field)
    }

    /// Detach the entry from its rule. It keeps its current values but is a
    /// standalone record afterwards: nothing pins it and nothing syncs it.
    pub fn detach(&mut self, now: DateTime<Utc>) {
        self.rule_id = None;
        self.overridden_fields.clear();
        self.updated_at = now;
    }
}
