//! Infrastructure layer: reference implementations of the engine's
//! collaborator interfaces.

pub mod memory;

mod integration_tests;

pub use memory::{MemoryAccountCatalog, MemoryStore};
