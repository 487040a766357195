//! Transaction log with per-action rollback handlers

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use macshift_core::error::ChangeError;
use macshift_core::Result;

/// Handle of a transaction inside the log
pub type TransactionId = u64;

/// Kind of change a transaction records, used to look up rollback handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    SpoofMac,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::SpoofMac => write!(f, "spoof_mac"),
        }
    }
}

/// Lifecycle of a transaction. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Committed,
    RolledBack,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Committed => "committed",
            TransactionStatus::RolledBack => "rolled_back",
        };
        f.write_str(label)
    }
}

/// One recorded attempt to change a value on a target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub action: Action,
    pub target: String,
    pub previous_value: String,
    pub new_value: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
}

/// Reverts one transaction. Receives a copy of the transaction being undone.
pub type RollbackHandler = Arc<dyn Fn(Transaction) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A transaction that no handler managed to revert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedRollback {
    pub action: Action,
    pub target: String,
    pub previous_value: String,
    pub new_value: String,
}

impl From<&Transaction> for FailedRollback {
    fn from(txn: &Transaction) -> Self {
        Self {
            action: txn.action,
            target: txn.target.clone(),
            previous_value: txn.previous_value.clone(),
            new_value: txn.new_value.clone(),
        }
    }
}

/// Outcome of a rollback pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackReport {
    pub success: bool,
    pub rolled_back_count: usize,
    pub failed_count: usize,
    pub failed_transactions: Vec<FailedRollback>,
}

impl Default for RollbackReport {
    fn default() -> Self {
        Self {
            success: true,
            rolled_back_count: 0,
            failed_count: 0,
            failed_transactions: Vec::new(),
        }
    }
}

impl RollbackReport {
    fn record_success(&mut self) {
        self.rolled_back_count += 1;
    }

    fn record_failure(&mut self, txn: &Transaction) {
        self.failed_count += 1;
        self.failed_transactions.push(FailedRollback::from(txn));
        self.success = false;
    }
}

/// Counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub total: usize,
    pub pending: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

impl fmt::Display for LogSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} transactions ({} pending, {} committed, {} rolled back)",
            self.total, self.pending, self.committed, self.rolled_back
        )
    }
}

/// Bounded, ordered record of changes and the handlers that undo them
pub struct TransactionLog {
    entries: VecDeque<Transaction>,
    capacity: usize,
    next_id: TransactionId,
    handlers: HashMap<Action, Vec<RollbackHandler>>,
}

impl TransactionLog {
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Create an empty log holding at most `capacity` transactions
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY)),
            capacity,
            next_id: 1,
            handlers: HashMap::new(),
        }
    }

    /// Append a new pending transaction, evicting the oldest one when full
    pub fn record(
        &mut self,
        action: Action,
        target: &str,
        previous_value: &str,
        new_value: &str,
    ) -> Transaction {
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                debug!(
                    "Transaction log full, evicting transaction {} ({})",
                    evicted.id, evicted.status
                );
            }
        }

        let txn = Transaction {
            id: self.next_id,
            action,
            target: target.to_string(),
            previous_value: previous_value.to_string(),
            new_value: new_value.to_string(),
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
        };
        self.next_id += 1;

        debug!(
            "Recorded transaction {}: {} {} {} -> {}",
            txn.id, txn.action, txn.target, txn.previous_value, txn.new_value
        );
        self.entries.push_back(txn.clone());
        txn
    }

    /// Mark a pending transaction as committed
    pub fn commit(&mut self, id: TransactionId) -> Result<()> {
        let txn = self
            .entries
            .iter_mut()
            .find(|txn| txn.id == id)
            .ok_or(ChangeError::UnknownTransaction { id })?;

        if txn.status != TransactionStatus::Pending {
            return Err(ChangeError::InvalidTransition {
                id,
                from: txn.status.to_string(),
                to: TransactionStatus::Committed.to_string(),
            }
            .into());
        }

        txn.status = TransactionStatus::Committed;
        info!("Committed transaction {}", id);
        Ok(())
    }

    /// Append a handler to the list tried for `action`
    pub fn register_rollback_handler(&mut self, action: Action, handler: RollbackHandler) {
        self.handlers.entry(action).or_default().push(handler);
    }

    /// Register an async closure as a rollback handler
    pub fn register_rollback_fn<F, Fut>(&mut self, action: Action, handler: F)
    where
        F: Fn(Transaction) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let wrapped: RollbackHandler =
            Arc::new(move |txn: Transaction| -> BoxFuture<'static, Result<()>> {
                Box::pin(handler(txn))
            });
        self.register_rollback_handler(action, wrapped);
    }

    /// Roll back one transaction, or every committed one when `id` is `None`
    pub async fn rollback(&mut self, id: Option<TransactionId>) -> Result<RollbackReport> {
        match id {
            Some(id) => {
                if self.get(id).is_none() {
                    return Err(ChangeError::UnknownTransaction { id }.into());
                }
                Ok(self.revert(vec![id]).await)
            }
            None => Ok(self.rollback_committed().await),
        }
    }

    /// Roll back every committed transaction, newest first
    pub async fn rollback_committed(&mut self) -> RollbackReport {
        let ids: Vec<TransactionId> = self
            .entries
            .iter()
            .rev()
            .filter(|txn| txn.status == TransactionStatus::Committed)
            .map(|txn| txn.id)
            .collect();

        info!("Rolling back {} committed transactions", ids.len());
        self.revert(ids).await
    }

    /// Roll back the given transactions that are still committed, newest first
    pub async fn rollback_only(&mut self, ids: &[TransactionId]) -> RollbackReport {
        let mut selected = Vec::with_capacity(ids.len());
        for &id in ids {
            match self.get(id) {
                Some(txn) if txn.status == TransactionStatus::Committed => selected.push(id),
                Some(txn) => debug!("Skipping transaction {} ({})", id, txn.status),
                None => warn!("Transaction {} is no longer in the log, skipping", id),
            }
        }

        // Ids grow with log position.
        selected.sort_unstable_by(|a, b| b.cmp(a));
        selected.dedup();
        self.revert(selected).await
    }

    async fn revert(&mut self, ids: Vec<TransactionId>) -> RollbackReport {
        let mut report = RollbackReport::default();

        for id in ids {
            let txn = match self.get(id) {
                Some(txn) => txn.clone(),
                None => continue,
            };
            if txn.status == TransactionStatus::RolledBack {
                debug!("Transaction {} already rolled back", id);
                continue;
            }

            info!(
                "Rolling back transaction {}: {} on {} ({} -> {})",
                txn.id, txn.action, txn.target, txn.new_value, txn.previous_value
            );

            if self.run_handlers(&txn).await {
                if let Some(entry) = self.entries.iter_mut().find(|entry| entry.id == id) {
                    entry.status = TransactionStatus::RolledBack;
                }
                info!("Rolled back transaction {}", id);
                report.record_success();
            } else {
                error!("Failed to roll back transaction {}", id);
                report.record_failure(&txn);
            }
        }

        report
    }

    async fn run_handlers(&self, txn: &Transaction) -> bool {
        let handlers = match self.handlers.get(&txn.action) {
            Some(handlers) if !handlers.is_empty() => handlers,
            _ => {
                warn!("No rollback handler registered for action {}", txn.action);
                return false;
            }
        };

        for (index, handler) in handlers.iter().enumerate() {
            match handler(txn.clone()).await {
                Ok(()) => return true,
                Err(e) => error!(
                    "Rollback handler {} for transaction {} failed: {}",
                    index, txn.id, e
                ),
            }
        }
        false
    }

    /// All transactions, oldest first
    pub fn history(&self) -> Vec<Transaction> {
        self.entries.iter().cloned().collect()
    }

    pub fn pending(&self) -> Vec<Transaction> {
        self.entries
            .iter()
            .filter(|txn| txn.status == TransactionStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn get(&self, id: TransactionId) -> Option<&Transaction> {
        self.entries.iter().find(|txn| txn.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn summary(&self) -> LogSummary {
        let mut summary = LogSummary {
            total: self.entries.len(),
            ..LogSummary::default()
        };
        for txn in &self.entries {
            match txn.status {
                TransactionStatus::Pending => summary.pending += 1,
                TransactionStatus::Committed => summary.committed += 1,
                TransactionStatus::RolledBack => summary.rolled_back += 1,
            }
        }
        summary
    }

    /// Drop every transaction regardless of status. Handlers stay registered.
    pub fn clear(&mut self) {
        info!("Clearing {} transactions", self.entries.len());
        self.entries.clear();
    }

    /// Write the history as pretty-printed JSON
    pub async fn export_history(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(&self.history())?;
        fs::write(path, data).await?;
        info!("Exported {} transactions to {}", self.entries.len(), path.display());
        Ok(())
    }
}

impl Default for TransactionLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl fmt::Debug for TransactionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionLog")
            .field("entries", &self.entries)
            .field("capacity", &self.capacity)
            .field("next_id", &self.next_id)
            .field(
                "handlers",
                &self
                    .handlers
                    .iter()
                    .map(|(action, list)| (*action, list.len()))
                    .collect::<HashMap<_, _>>(),
            )
            .finish()
    }
}
