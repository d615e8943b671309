//! Conversation workflows — one state machine per role.

pub mod contractor;
pub mod field_worker;

pub use contractor::ContractorWorkflow;
pub use field_worker::FieldWorkerWorkflow;
