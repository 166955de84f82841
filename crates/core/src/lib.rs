//! `coffers-core` — domain foundation building blocks.
//!
//! Pure primitives shared by every crate in the workspace: strongly-typed
//! identifiers, the domain error model, and the injected clock. No
//! infrastructure concerns live here.

pub mod clock;
pub mod error;
pub mod id;

pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, CategoryId, EntryId, LiabilityId, RuleId, UserId};
