//! `coffers-recurring` — the recurring-obligation engine.
//!
//! Turns a recurring rule (rent, salary, subscriptions) into a stream of
//! concrete ledger entries. Historical occurrences are materialized through
//! the backing store exactly once per (rule, date); future occurrences are
//! forecast on demand and never persisted; edits to single entries are
//! reconciled against later template changes through field-level overrides
//! and three propagation scopes.

pub mod forecast;
pub mod materialize;
pub mod overrides;
pub mod rule;
pub mod schedule;
pub mod service;
pub mod store;
pub mod sync;
pub mod template;

pub use forecast::ForecastedEntry;
pub use materialize::materialize_historical;
pub use overrides::{DetectedOverride, EntryChanges, FieldValue, OverrideRecord};
pub use rule::{NewRule, RecurringRule, RuleUpdate};
pub use schedule::{Bound, Frequency, Schedule};
pub use service::{
    CreatedRule, EntryEditOutcome, PreviewRequest, RecurringService, RuleUpdateOutcome,
};
pub use store::{AccountCatalog, Store, StoreTx};
pub use sync::EditScope;
pub use template::{EntryTemplate, TemplateChanges, TemplateKind};
