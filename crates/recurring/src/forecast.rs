//! On-demand projection of future occurrences.
//!
//! Nothing here persists. Forecasts are re-derived from the current
//! templates on every call, which is what keeps them correct across
//! template edits without any background recomputation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use coffers_core::{AccountId, CategoryId, DomainResult, LiabilityId, RuleId, UserId};
use coffers_ledger::EntryKind;

use crate::rule::RecurringRule;
use crate::store::StoreTx;

/// An ephemeral future entry.
///
/// Deliberately carries no entry id and no storage path; it exists only in
/// the response that computed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastedEntry {
    pub rule_id: RuleId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub kind: EntryKind,
    pub name: String,
    pub amount_cents: i64,
    pub date: NaiveDate,
    pub category: Option<CategoryId>,
    pub subcategory: Option<CategoryId>,
    pub liability_id: Option<LiabilityId>,
    pub to_account_id: Option<AccountId>,
    pub description: Option<String>,
    pub memo: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Option<JsonValue>,
}

impl ForecastedEntry {
    fn project(rule: &RecurringRule, date: NaiveDate) -> Self {
        let template = &rule.template;
        Self {
            rule_id: rule.id,
            user_id: rule.user_id,
            account_id: template.account_id,
            kind: template.kind.entry_kind(),
            name: template.name.clone(),
            amount_cents: template.amount_cents,
            date,
            category: template.kind.category(),
            subcategory: template.kind.subcategory(),
            liability_id: template.kind.liability_id(),
            to_account_id: template.kind.to_account_id(),
            description: template.description.clone(),
            memo: template.memo.clone(),
            tags: template.tags.clone(),
            metadata: template.metadata.clone(),
        }
    }
}

/// Forecast every active rule of a user across `[range_start, range_end]`.
///
/// Only dates strictly after `today` appear; on and before that boundary the
/// persisted entries are the record. Output is ordered by date, then rule,
/// so two calls with unchanged rules return identical sequences.
pub fn forecast_user(
    tx: &impl StoreTx,
    user_id: UserId,
    range_start: NaiveDate,
    range_end: NaiveDate,
    today: NaiveDate,
) -> DomainResult<Vec<ForecastedEntry>> {
    let from = match today.succ_opt() {
        Some(tomorrow) => range_start.max(tomorrow),
        None => return Ok(Vec::new()),
    };
    if from > range_end {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for rule in tx.rules_for_user(user_id)? {
        if !rule.is_active {
            continue;
        }
        for date in rule.schedule.occurrences_between(today, from, range_end) {
            out.push(ForecastedEntry::project(&rule, date));
        }
    }
    out.sort_by(|a, b| {
        (a.date, a.rule_id.as_uuid()).cmp(&(b.date, b.rule_id.as_uuid()))
    });
    Ok(out)
}
