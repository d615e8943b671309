//! Conversation state, finalized records, and persistence backends.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod model;
pub mod store;

pub use libsql_backend::LibSqlStore;
pub use memory::MemoryStore;
pub use model::*;
pub use store::{IntakeStore, LogDirection, ScopeKey, ScopeLocks};
