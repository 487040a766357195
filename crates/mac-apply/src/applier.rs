//! Change orchestrator
//!
//! Drives one MAC change through validate, snapshot, apply, verify and
//! commit, reverting through the transaction log when a step after the
//! snapshot fails. Batches run the same protocol target by target.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::timeout;

use macshift_core::error::{ChangeError, SystemError};
use macshift_core::{InterfaceInfo, MacError, Result};
use macshift_platform::MacBackend;
use macshift_validate::{generate_random, generate_realistic, normalize, vendor_for};
use macshift_validate::{MacValidator, SyntaxValidator, UNKNOWN_VENDOR};

use crate::settings::{ApplySettings, RollbackScope};
use crate::transaction::{
    Action, LogSummary, RollbackHandler, RollbackReport, Transaction, TransactionId,
    TransactionLog, TransactionStatus,
};

/// Message carried by batch targets that were never attempted
pub const CANCELLED_MESSAGE: &str = "Cancelled due to partial failure";

/// Where a change ended up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeState {
    Validating,
    Snapshotting,
    Applying,
    Verifying,
    /// Applied, verified and committed
    Committed,
    /// Requested value was already in effect
    Unchanged,
    /// Failed and reverted to the previous value
    RolledBack,
    /// Failed without a successful revert
    Failed,
    /// Committed, then reverted because a later batch target failed
    Reverted,
    /// Never attempted because an earlier batch target failed
    Cancelled,
}

impl fmt::Display for ChangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChangeState::Validating => "validating",
            ChangeState::Snapshotting => "snapshotting",
            ChangeState::Applying => "applying",
            ChangeState::Verifying => "verifying",
            ChangeState::Committed => "committed",
            ChangeState::Unchanged => "unchanged",
            ChangeState::RolledBack => "rolled back",
            ChangeState::Failed => "failed",
            ChangeState::Reverted => "reverted",
            ChangeState::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Why a change did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    UnreachableResource,
    Apply,
    VerificationMismatch,
    Rollback,
    Cancelled,
}

/// Per-target outcome of a change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub target: String,
    /// The requested value is in effect
    pub success: bool,
    pub message: String,
    pub state: ChangeState,
    /// Set when this target's own change failed or was cancelled
    pub failure: Option<FailureKind>,
    pub transaction: Option<TransactionId>,
}

impl ChangeResult {
    fn succeeded(
        target: &str,
        state: ChangeState,
        message: String,
        transaction: Option<TransactionId>,
    ) -> Self {
        Self {
            target: target.to_string(),
            success: true,
            message,
            state,
            failure: None,
            transaction,
        }
    }

    fn failed(
        target: &str,
        state: ChangeState,
        failure: FailureKind,
        message: String,
        transaction: Option<TransactionId>,
    ) -> Self {
        Self {
            target: target.to_string(),
            success: false,
            message,
            state,
            failure: Some(failure),
            transaction,
        }
    }

    fn cancelled(target: &str) -> Self {
        Self::failed(
            target,
            ChangeState::Cancelled,
            FailureKind::Cancelled,
            CANCELLED_MESSAGE.to_string(),
            None,
        )
    }
}

/// Applies MAC changes through a platform backend and owns their transaction log
pub struct MacApplier {
    backend: Arc<dyn MacBackend>,
    validator: MacValidator,
    settings: ApplySettings,
    log: Mutex<TransactionLog>,
}

impl MacApplier {
    /// Create an applier whose validator follows the settings' policy
    pub fn new(backend: Arc<dyn MacBackend>, settings: ApplySettings) -> Self {
        let validator = MacValidator::new(settings.validation_policy());
        Self::with_validator(backend, validator, settings)
    }

    /// Create an applier with an explicit validator
    pub fn with_validator(
        backend: Arc<dyn MacBackend>,
        validator: MacValidator,
        settings: ApplySettings,
    ) -> Self {
        let mut log = TransactionLog::new(settings.max_transactions);

        let restore_backend = backend.clone();
        let deadline = settings.operation_timeout();
        log.register_rollback_fn(Action::SpoofMac, move |txn: Transaction| {
            restore_previous(restore_backend.clone(), txn, deadline)
        });

        info!(
            "MAC applier ready (backend: {}, log capacity: {})",
            backend.name(),
            log.capacity()
        );

        Self {
            backend,
            validator,
            settings,
            log: Mutex::new(log),
        }
    }

    pub fn settings(&self) -> &ApplySettings {
        &self.settings
    }

    pub fn validator(&self) -> &MacValidator {
        &self.validator
    }

    pub fn backend(&self) -> Arc<dyn MacBackend> {
        self.backend.clone()
    }

    /// Add a rollback handler tried after the built-in ones
    pub async fn register_rollback_handler(&self, action: Action, handler: RollbackHandler) {
        self.log
            .lock()
            .await
            .register_rollback_handler(action, handler);
    }

    /// Interfaces reported by the backend, with driver and vendor filled in
    pub async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        let mut interfaces = self
            .bounded("list interfaces", self.backend.list_interfaces())
            .await?;
        let syntax = SyntaxValidator::new();

        for iface in &mut interfaces {
            if iface.driver.is_none() {
                match self
                    .bounded("read driver", self.backend.driver_name(&iface.name))
                    .await
                {
                    Ok(driver) => iface.driver = driver,
                    Err(e) => debug!("No driver information for {}: {}", iface.name, e),
                }
            }

            if iface.vendor.is_none() {
                if let Some(mac) = iface
                    .mac_address
                    .as_deref()
                    .and_then(|mac| syntax.parse(mac).ok())
                {
                    let vendor = vendor_for(&mac).unwrap_or(UNKNOWN_VENDOR);
                    iface.vendor = Some(vendor.to_string());
                }
            }
        }

        Ok(interfaces)
    }

    /// Change the MAC of one interface. Never fails outright: every outcome
    /// is reported in the returned result.
    pub async fn apply_change(&self, target: &str, new_value: &str, force: bool) -> ChangeResult {
        info!("Changing MAC on {} to {}", target, new_value);

        trace_state(target, ChangeState::Validating);
        let requested = if force {
            warn!("Skipping validation of {} for {}", new_value, target);
            normalize(new_value)
        } else {
            match self.validator.validate(new_value) {
                Ok(validation) => validation.mac.to_string(),
                Err(e) => {
                    error!("Rejected MAC for {}: {}", target, e);
                    return ChangeResult::failed(
                        target,
                        ChangeState::Failed,
                        FailureKind::Validation,
                        format!("Invalid MAC: {}", e),
                        None,
                    );
                }
            }
        };

        trace_state(target, ChangeState::Snapshotting);
        let current = match self.read_mac(target).await {
            Ok(mac) => mac,
            Err(e) => {
                let err = ChangeError::Unreachable {
                    interface: target.to_string(),
                    reason: e.to_string(),
                };
                error!("{}", err);
                return ChangeResult::failed(
                    target,
                    ChangeState::Failed,
                    FailureKind::UnreachableResource,
                    err.to_string(),
                    None,
                );
            }
        };

        if current == requested {
            info!("{} already has MAC {}", target, requested);
            return ChangeResult::succeeded(
                target,
                ChangeState::Unchanged,
                format!("{} already uses {}", target, requested),
                None,
            );
        }

        let txn = self
            .log
            .lock()
            .await
            .record(Action::SpoofMac, target, &current, &requested);

        trace_state(target, ChangeState::Applying);
        if let Err(e) = self.write_mac(target, &requested).await {
            return self.abort(txn.id, target, FailureKind::Apply, e.to_string()).await;
        }

        trace_state(target, ChangeState::Verifying);
        let observed = match self.read_mac(target).await {
            Ok(mac) => mac,
            Err(e) => {
                let err = ChangeError::Unreachable {
                    interface: target.to_string(),
                    reason: e.to_string(),
                };
                return self
                    .abort(txn.id, target, FailureKind::UnreachableResource, err.to_string())
                    .await;
            }
        };
        if observed != requested {
            let err = ChangeError::VerificationMismatch {
                interface: target.to_string(),
                expected: requested,
                observed,
            };
            return self
                .abort(txn.id, target, FailureKind::VerificationMismatch, err.to_string())
                .await;
        }

        let committed = self.log.lock().await.commit(txn.id);
        if let Err(e) = committed {
            return self
                .abort(txn.id, target, FailureKind::Apply, format!("Commit failed: {}", e))
                .await;
        }

        info!("Changed MAC on {}: {} -> {}", target, current, requested);
        ChangeResult::succeeded(
            target,
            ChangeState::Committed,
            format!(
                "Successfully changed MAC on {}: {} -> {}",
                target, current, requested
            ),
            Some(txn.id),
        )
    }

    /// Generate an address and apply it to `target`
    pub async fn apply_random(&self, target: &str, realistic: bool) -> ChangeResult {
        let generated = {
            let mut rng = rand::thread_rng();
            if realistic {
                generate_realistic(&mut rng, None)
            } else {
                Ok(generate_random(&mut rng))
            }
        };

        match generated {
            Ok(mac) => {
                info!("Generated MAC {} for {}", mac, target);
                self.apply_change(target, &mac.to_string(), false).await
            }
            Err(e) => ChangeResult::failed(
                target,
                ChangeState::Failed,
                FailureKind::Validation,
                format!("Could not generate MAC: {}", e),
                None,
            ),
        }
    }

    /// Apply several changes in order. With `rollback_on_partial_failure`
    /// the first failure reverts the batch and cancels the remaining targets.
    pub async fn apply_batch(
        &self,
        changes: &IndexMap<String, String>,
        rollback_on_partial_failure: bool,
    ) -> IndexMap<String, ChangeResult> {
        info!("Starting batch change of {} interfaces", changes.len());
        let mut results = IndexMap::with_capacity(changes.len());

        for (index, (target, new_value)) in changes.iter().enumerate() {
            let result = self.apply_change(target, new_value, false).await;
            let failed = !result.success;
            results.insert(target.clone(), result);

            if failed && rollback_on_partial_failure {
                error!("Failure detected on {}, rolling back batch", target);
                self.revert_batch(target, &mut results).await;

                for (remaining, _) in changes.iter().skip(index + 1) {
                    results
                        .entry(remaining.clone())
                        .or_insert_with(|| ChangeResult::cancelled(remaining));
                }
                break;
            }
        }

        let succeeded = results.values().filter(|r| r.success).count();
        info!("Batch finished: {}/{} succeeded", succeeded, changes.len());
        results
    }

    async fn revert_batch(&self, failed_target: &str, results: &mut IndexMap<String, ChangeResult>) {
        let committed: Vec<TransactionId> = results
            .values()
            .filter(|r| r.state == ChangeState::Committed)
            .filter_map(|r| r.transaction)
            .collect();

        let mut log = self.log.lock().await;
        let report = match self.settings.batch_rollback_scope {
            RollbackScope::Batch => log.rollback_only(&committed).await,
            RollbackScope::Log => log.rollback_committed().await,
        };
        warn!(
            "Batch rollback: {} reverted, {} failed",
            report.rolled_back_count, report.failed_count
        );

        for result in results.values_mut() {
            if result.state != ChangeState::Committed {
                continue;
            }
            let txn = match result.transaction.and_then(|id| log.get(id)) {
                Some(txn) => txn,
                None => continue,
            };

            match txn.status {
                TransactionStatus::RolledBack => {
                    result.success = false;
                    result.state = ChangeState::Reverted;
                    result.message = format!(
                        "Reverted to {} after failure on {}",
                        txn.previous_value, failed_target
                    );
                }
                TransactionStatus::Committed => {
                    result.success = false;
                    result.state = ChangeState::Failed;
                    result.failure = Some(FailureKind::Rollback);
                    result.message = format!(
                        "Could not revert after failure on {}; {} still uses {}",
                        failed_target, result.target, txn.new_value
                    );
                }
                TransactionStatus::Pending => {}
            }
        }

        if self.settings.batch_rollback_scope != RollbackScope::Log {
            return;
        }

        // Earlier changes that stayed committed failed to revert.
        let stranded: Vec<Transaction> = log
            .history()
            .into_iter()
            .filter(|txn| {
                txn.status == TransactionStatus::Committed && !committed.contains(&txn.id)
            })
            .collect();

        for txn in stranded {
            let message = format!(
                "Could not revert earlier change after failure on {}; {} still uses {}",
                failed_target, txn.target, txn.new_value
            );
            error!("{}", message);

            match results.get_mut(&txn.target) {
                Some(result) => {
                    result.success = false;
                    result.state = ChangeState::Failed;
                    result.failure = Some(FailureKind::Rollback);
                    result.message = format!("{}; {}", result.message, message);
                }
                None => {
                    results.insert(
                        txn.target.clone(),
                        ChangeResult::failed(
                            &txn.target,
                            ChangeState::Failed,
                            FailureKind::Rollback,
                            message,
                            Some(txn.id),
                        ),
                    );
                }
            }
        }
    }

    /// Revert the failed transaction if configured to, and describe the outcome
    async fn abort(
        &self,
        id: TransactionId,
        target: &str,
        kind: FailureKind,
        message: String,
    ) -> ChangeResult {
        error!("{}", message);

        if !self.settings.auto_rollback_on_error {
            return ChangeResult::failed(
                target,
                ChangeState::Failed,
                kind,
                format!("{}; transaction {} left pending", message, id),
                Some(id),
            );
        }

        warn!("Auto-rollback triggered for {} ({:?})", target, kind);
        let report = self.log.lock().await.rollback(Some(id)).await;

        match report {
            Ok(report) if report.success && report.rolled_back_count == 1 => ChangeResult::failed(
                target,
                ChangeState::RolledBack,
                kind,
                format!("{}; change rolled back", message),
                Some(id),
            ),
            Ok(_) | Err(_) => {
                error!("Rollback of transaction {} on {} failed", id, target);
                ChangeResult::failed(
                    target,
                    ChangeState::Failed,
                    FailureKind::Rollback,
                    format!(
                        "{}; rollback failed, {} may be left in an unintended state",
                        message, target
                    ),
                    Some(id),
                )
            }
        }
    }

    async fn read_mac(&self, target: &str) -> Result<String> {
        let mac = self.bounded("read MAC", self.backend.get_mac(target)).await?;
        Ok(normalize(&mac))
    }

    async fn write_mac(&self, target: &str, mac: &str) -> Result<()> {
        let accepted = self
            .bounded("set MAC", self.backend.set_mac(target, mac))
            .await
            .map_err(|e| ChangeError::ApplyFailed {
                interface: target.to_string(),
                reason: e.to_string(),
            })?;

        if accepted {
            Ok(())
        } else {
            Err(ChangeError::ApplyFailed {
                interface: target.to_string(),
                reason: "platform refused the change".to_string(),
            }
            .into())
        }
    }

    async fn bounded<T>(
        &self,
        operation: &str,
        call: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        with_deadline(self.settings.operation_timeout(), operation, call).await
    }

    /// Every transaction, oldest first
    pub async fn history(&self) -> Vec<Transaction> {
        self.log.lock().await.history()
    }

    pub async fn pending(&self) -> Vec<Transaction> {
        self.log.lock().await.pending()
    }

    /// Revert every committed change, newest first
    pub async fn rollback_all(&self) -> RollbackReport {
        self.log.lock().await.rollback_committed().await
    }

    pub async fn rollback_transaction(&self, id: TransactionId) -> Result<RollbackReport> {
        self.log.lock().await.rollback(Some(id)).await
    }

    pub async fn status(&self) -> LogSummary {
        self.log.lock().await.summary()
    }

    pub async fn export_history(&self, path: impl AsRef<Path>) -> Result<()> {
        self.log.lock().await.export_history(path).await
    }

    pub async fn clear_history(&self) {
        self.log.lock().await.clear();
    }
}

fn trace_state(target: &str, state: ChangeState) {
    debug!("{}: {}", target, state);
}

async fn with_deadline<T>(
    deadline: Duration,
    operation: &str,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(SystemError::Timeout {
            operation: operation.to_string(),
            seconds: deadline.as_secs(),
        }
        .into()),
    }
}

/// Set the recorded previous value back and check that it took
async fn restore_previous(
    backend: Arc<dyn MacBackend>,
    txn: Transaction,
    deadline: Duration,
) -> Result<()> {
    let rollback_failed = || -> MacError {
        ChangeError::RollbackFailed {
            action: txn.action.to_string(),
            interface: txn.target.clone(),
        }
        .into()
    };

    let accepted = with_deadline(
        deadline,
        "restore MAC",
        backend.set_mac(&txn.target, &txn.previous_value),
    )
    .await?;
    if !accepted {
        return Err(rollback_failed());
    }

    let observed = with_deadline(deadline, "read MAC", backend.get_mac(&txn.target)).await?;
    if normalize(&observed) != normalize(&txn.previous_value) {
        warn!(
            "{} reports {} after restoring {}",
            txn.target, observed, txn.previous_value
        );
        return Err(rollback_failed());
    }

    info!("Restored MAC {} on {}", txn.previous_value, txn.target);
    Ok(())
}
