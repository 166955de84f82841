//! `coffers-ledger` — the concrete ledger-entry model.
//!
//! Entries are what the rest of the system reports on; the recurring engine
//! is one producer of them. This crate holds the entry record itself and the
//! vocabulary of fields a user may pin on a single generated entry.

pub mod entry;

pub use entry::{EntryKind, LedgerEntry, OverridableField};
