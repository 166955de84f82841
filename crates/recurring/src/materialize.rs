//! Historical materialization: expanding a rule's past occurrences into
//! persisted ledger entries.

use chrono::{DateTime, Utc};
use tracing::debug;

use coffers_core::{DomainResult, EntryId};
use coffers_ledger::LedgerEntry;

use crate::rule::RecurringRule;
use crate::store::StoreTx;

/// Materialize the historical window `[start_date, today]` for one rule and
/// return the number of entries newly created.
///
/// Dates already materialized are skipped without being touched, so repeated
/// runs are no-ops and a template change never leaks into existing entries
/// from here — propagation is the sync engine's job. The per-date
/// uniqueness check lives in the store, which keeps concurrent runs from
/// double-creating.
pub fn materialize_historical(
    tx: &mut impl StoreTx,
    rule: &mut RecurringRule,
    now: DateTime<Utc>,
) -> DomainResult<usize> {
    if !rule.is_active {
        return Ok(0);
    }

    let today = now.date_naive();
    let due = rule
        .schedule
        .occurrences_between(today, rule.schedule.start_date, today);
    let existing = tx.occurrence_dates(rule.id)?;

    let fresh: Vec<LedgerEntry> = due
        .into_iter()
        .filter(|date| !existing.contains(date))
        .map(|date| {
            rule.template
                .build_entry(EntryId::new(), rule.user_id, rule.id, date, now)
        })
        .collect();

    let created = if fresh.is_empty() {
        0
    } else {
        tx.insert_generated(fresh)?
    };

    rule.advance_watermark(today);
    tx.update_rule(rule)?;

    debug!(rule_id = %rule.id, created, "materialized historical window");
    Ok(created)
}
