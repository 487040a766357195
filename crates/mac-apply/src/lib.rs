//! macshift apply
//!
//! Transactional MAC address changes: a bounded transaction log with
//! per-action rollback handlers, and the applier that drives the
//! validate / snapshot / apply / verify / commit protocol for single
//! interfaces and batches.

pub mod applier;
pub mod settings;
pub mod transaction;

#[cfg(test)]
mod tests;

pub use applier::{ChangeResult, ChangeState, FailureKind, MacApplier, CANCELLED_MESSAGE};
pub use settings::{ApplySettings, RollbackScope};
pub use transaction::{
    Action, FailedRollback, LogSummary, RollbackHandler, RollbackReport, Transaction,
    TransactionId, TransactionLog, TransactionStatus,
};
