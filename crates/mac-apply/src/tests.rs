//! Tests for transactional MAC changes

#[cfg(test)]
mod tests {
    use crate::{
        ApplySettings, ChangeState, FailureKind, MacApplier, RollbackScope, TransactionStatus,
        CANCELLED_MESSAGE,
    };
    use async_trait::async_trait;
    use indexmap::IndexMap;
    use macshift_core::error::{ChangeError, SystemError};
    use macshift_core::{InterfaceInfo, MacError, Result};
    use macshift_platform::{MacBackend, MemoryBackend};
    use macshift_validate::{normalize, vendor_for, SyntaxValidator, UNKNOWN_VENDOR};
    use mockall::mock;
    use std::sync::Arc;
    use std::time::Duration;

    const OLD: &str = "00:11:22:33:44:55";
    const NEW: &str = "00:25:86:AA:BB:CC";
    const OTHER: &str = "00:1A:A0:12:34:56";

    mock! {
        pub Backend {}

        #[async_trait]
        impl MacBackend for Backend {
            fn name(&self) -> &'static str;
            async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>>;
            async fn get_mac(&self, interface: &str) -> Result<String>;
            async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool>;
            async fn driver_name(&self, interface: &str) -> Result<Option<String>>;
        }
    }

    /// Backend whose reads never finish in time
    struct StalledBackend;

    #[async_trait]
    impl MacBackend for StalledBackend {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
            Ok(Vec::new())
        }

        async fn get_mac(&self, _interface: &str) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(OLD.to_string())
        }

        async fn set_mac(&self, _interface: &str, _mac: &str) -> Result<bool> {
            panic!("set_mac must not be reached");
        }

        async fn driver_name(&self, _interface: &str) -> Result<Option<String>> {
            Ok(None)
        }
    }

    fn backend(names: &[&str]) -> Arc<MemoryBackend> {
        let backend = names
            .iter()
            .fold(MemoryBackend::new(), |backend, name| {
                backend.with_interface(name, OLD)
            });
        Arc::new(backend)
    }

    fn applier(backend: &Arc<MemoryBackend>, settings: ApplySettings) -> MacApplier {
        MacApplier::new(backend.clone(), settings)
    }

    fn quiet_mock() -> MockBackend {
        let mut mock = MockBackend::new();
        mock.expect_name().return_const("mock");
        mock
    }

    fn changes(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(target, mac)| (target.to_string(), mac.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_successful_change_commits() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", "00-25-86-aa-bb-cc", false).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(result.state, ChangeState::Committed);
        assert!(result.message.contains(OLD));
        assert!(result.message.contains(NEW));
        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(NEW));

        let history = applier.history().await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].previous_value, OLD);
        assert_eq!(history[0].new_value, NEW);
        assert_eq!(history[0].status, TransactionStatus::Committed);
        assert_eq!(Some(history[0].id), result.transaction);
    }

    #[tokio::test]
    async fn test_unchanged_value_makes_no_mutating_call() {
        let mut mock = quiet_mock();
        mock.expect_get_mac()
            .times(1)
            .returning(|_| Ok("00-11-22-33-44-55".to_string()));
        mock.expect_set_mac().never();

        let applier = MacApplier::new(Arc::new(mock), ApplySettings::default());
        let result = applier.apply_change("eth0", "00:11:22:33:44:55", false).await;

        assert!(result.success);
        assert_eq!(result.state, ChangeState::Unchanged);
        assert_eq!(result.transaction, None);
        assert!(applier.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_mac_touches_nothing() {
        let mut mock = quiet_mock();
        mock.expect_get_mac().never();
        mock.expect_set_mac().never();

        let applier = MacApplier::new(Arc::new(mock), ApplySettings::default());

        let malformed = applier.apply_change("eth0", "not-a-mac", false).await;
        assert_eq!(malformed.failure, Some(FailureKind::Validation));

        let multicast = applier.apply_change("eth0", "01:00:5E:00:00:01", false).await;
        assert!(!multicast.success);
        assert_eq!(multicast.failure, Some(FailureKind::Validation));
        assert!(applier.history().await.is_empty());
    }

    #[tokio::test]
    async fn test_strict_settings_require_known_vendor() {
        let backend = backend(&["eth0"]);
        let settings = ApplySettings {
            strict_validation: true,
            ..ApplySettings::default()
        };
        let applier = applier(&backend, settings);

        let unknown = applier.apply_change("eth0", "0E:AB:CD:00:00:01", false).await;
        assert_eq!(unknown.failure, Some(FailureKind::Validation));

        let known = applier.apply_change("eth0", NEW, false).await;
        assert!(known.success);
    }

    #[tokio::test]
    async fn test_unreachable_interface_records_nothing() {
        let backend = backend(&[]);
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth9", NEW, false).await;

        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::UnreachableResource));
        assert!(result.message.contains("eth9"));
        assert!(applier.history().await.is_empty());
        assert!(backend.set_calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_is_bounded_by_deadline() {
        let settings = ApplySettings {
            operation_timeout_secs: 1,
            ..ApplySettings::default()
        };
        let applier = MacApplier::new(Arc::new(StalledBackend), settings);

        let result = applier.apply_change("eth0", NEW, false).await;

        assert_eq!(result.failure, Some(FailureKind::UnreachableResource));
        assert!(result.message.contains("timed out"));
    }

    #[tokio::test]
    async fn test_verification_mismatch_rolls_back() {
        let backend = backend(&["eth0"]);
        backend.ignore_next_sets("eth0", 1).await;
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", NEW, false).await;

        assert!(!result.success);
        assert_eq!(result.state, ChangeState::RolledBack);
        assert_eq!(result.failure, Some(FailureKind::VerificationMismatch));
        assert!(result.message.contains("Expected 00:25:86:AA:BB:CC"));

        let history = applier.history().await;
        assert_eq!(history[0].status, TransactionStatus::RolledBack);
        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
    }

    #[tokio::test]
    async fn test_unreadable_after_apply_is_unreachable() {
        let mut mock = quiet_mock();
        let mut reads = 0;
        mock.expect_get_mac().returning(move |_| {
            reads += 1;
            if reads == 2 {
                Err(SystemError::InterfaceNotFound {
                    interface: "eth0".to_string(),
                }
                .into())
            } else {
                Ok(OLD.to_string())
            }
        });
        mock.expect_set_mac().times(2).returning(|_, _| Ok(true));
        let applier = MacApplier::new(Arc::new(mock), ApplySettings::default());

        let result = applier.apply_change("eth0", NEW, false).await;

        assert!(!result.success);
        assert_eq!(result.state, ChangeState::RolledBack);
        assert_eq!(result.failure, Some(FailureKind::UnreachableResource));
        assert_eq!(applier.history().await[0].status, TransactionStatus::RolledBack);
    }

    #[tokio::test]
    async fn test_failure_without_auto_rollback_stays_pending() {
        let backend = backend(&["eth0"]);
        backend.ignore_next_sets("eth0", 1).await;
        let settings = ApplySettings {
            auto_rollback_on_error: false,
            ..ApplySettings::default()
        };
        let applier = applier(&backend, settings);

        let result = applier.apply_change("eth0", NEW, false).await;

        assert_eq!(result.state, ChangeState::Failed);
        assert_eq!(result.failure, Some(FailureKind::VerificationMismatch));
        assert_eq!(applier.pending().await.len(), 1);
        assert_eq!(backend.set_calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_rejected_apply_rolls_back() {
        let backend = backend(&["eth0"]);
        backend.reject_next_sets("eth0", 1).await;
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", NEW, false).await;

        assert_eq!(result.state, ChangeState::RolledBack);
        assert_eq!(result.failure, Some(FailureKind::Apply));
        assert_eq!(
            backend.set_calls().await,
            vec![
                ("eth0".to_string(), NEW.to_string()),
                ("eth0".to_string(), OLD.to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_apply_error_rolls_back() {
        let backend = backend(&["eth0"]);
        backend.error_next_sets("eth0", 1).await;
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", NEW, false).await;

        assert_eq!(result.state, ChangeState::RolledBack);
        assert_eq!(result.failure, Some(FailureKind::Apply));
        assert!(result.message.contains("injected failure"));
    }

    #[tokio::test]
    async fn test_failed_rollback_is_surfaced() {
        let backend = backend(&["eth0"]);
        backend.reject_next_sets("eth0", 2).await;
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", NEW, false).await;

        assert!(!result.success);
        assert_eq!(result.state, ChangeState::Failed);
        assert_eq!(result.failure, Some(FailureKind::Rollback));
        assert!(result.message.contains("unintended state"));

        let history = applier.history().await;
        assert_eq!(history[0].status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_force_skips_validation() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_change("eth0", "01:00:5e:00:00:01", true).await;

        assert!(result.success, "{}", result.message);
        assert_eq!(
            backend.current_mac("eth0").await.as_deref(),
            Some("01:00:5E:00:00:01")
        );
    }

    #[tokio::test]
    async fn test_rollback_all_is_lifo_and_runs_once() {
        let backend = backend(&["eth0", "eth1"]);
        let applier = applier(&backend, ApplySettings::default());

        assert!(applier.apply_change("eth0", NEW, false).await.success);
        assert!(applier.apply_change("eth1", OTHER, false).await.success);

        let report = applier.rollback_all().await;
        assert!(report.success);
        assert_eq!(report.rolled_back_count, 2);

        let calls = backend.set_calls().await;
        assert_eq!(
            calls[2..].to_vec(),
            vec![
                ("eth1".to_string(), OLD.to_string()),
                ("eth0".to_string(), OLD.to_string()),
            ]
        );

        let again = applier.rollback_all().await;
        assert_eq!(again.rolled_back_count, 0);
        assert_eq!(backend.set_calls().await.len(), 4);

        let summary = applier.status().await;
        assert_eq!(summary.rolled_back, 2);
        assert_eq!(summary.committed, 0);
    }

    #[tokio::test]
    async fn test_rollback_transaction_by_id() {
        let backend = backend(&["eth0", "eth1"]);
        let applier = applier(&backend, ApplySettings::default());

        let first = applier.apply_change("eth0", NEW, false).await;
        applier.apply_change("eth1", OTHER, false).await;

        let id = first.transaction.unwrap();
        let report = applier.rollback_transaction(id).await.unwrap();
        assert_eq!(report.rolled_back_count, 1);
        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
        assert_eq!(backend.current_mac("eth1").await.as_deref(), Some(OTHER));

        assert!(matches!(
            applier.rollback_transaction(9999).await,
            Err(MacError::Change(ChangeError::UnknownTransaction { id: 9999 }))
        ));
    }

    #[tokio::test]
    async fn test_rollback_failure_leaves_committed() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());
        applier.apply_change("eth0", NEW, false).await;

        backend.error_next_sets("eth0", 1).await;
        let report = applier.rollback_all().await;

        assert!(!report.success);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.failed_transactions[0].previous_value, OLD);
        assert_eq!(applier.history().await[0].status, TransactionStatus::Committed);
    }

    #[tokio::test]
    async fn test_batch_success() {
        let backend = backend(&["eth0", "eth1"]);
        let applier = applier(&backend, ApplySettings::default());

        let results = applier
            .apply_batch(&changes(&[("eth0", NEW), ("eth1", OTHER)]), true)
            .await;

        assert_eq!(results.len(), 2);
        assert!(results.values().all(|r| r.success));
        assert_eq!(
            results.keys().cloned().collect::<Vec<_>>(),
            vec!["eth0", "eth1"]
        );
    }

    #[tokio::test]
    async fn test_batch_partial_failure_reverts_and_cancels() {
        let backend = backend(&["eth0", "eth2"]);
        let applier = applier(&backend, ApplySettings::default());

        let results = applier
            .apply_batch(
                &changes(&[("eth0", NEW), ("eth1", OTHER), ("eth2", OTHER)]),
                true,
            )
            .await;

        let eth0 = &results["eth0"];
        assert!(!eth0.success);
        assert_eq!(eth0.state, ChangeState::Reverted);
        assert!(eth0.message.contains("eth1"));

        let eth1 = &results["eth1"];
        assert_eq!(eth1.failure, Some(FailureKind::UnreachableResource));

        let eth2 = &results["eth2"];
        assert_eq!(eth2.state, ChangeState::Cancelled);
        assert_eq!(eth2.failure, Some(FailureKind::Cancelled));
        assert_eq!(eth2.message, CANCELLED_MESSAGE);

        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
        assert_eq!(backend.current_mac("eth2").await.as_deref(), Some(OLD));
        assert!(backend
            .set_calls()
            .await
            .iter()
            .all(|(target, _)| target == "eth0"));
        assert_eq!(
            applier.history().await[0].status,
            TransactionStatus::RolledBack
        );
    }

    #[tokio::test]
    async fn test_batch_scope_keeps_earlier_changes() {
        let backend = backend(&["eth0", "eth2"]);
        let applier = applier(&backend, ApplySettings::default());

        assert!(applier.apply_change("eth2", OTHER, false).await.success);
        applier
            .apply_batch(&changes(&[("eth0", NEW), ("eth1", NEW)]), true)
            .await;

        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
        assert_eq!(backend.current_mac("eth2").await.as_deref(), Some(OTHER));
    }

    #[tokio::test]
    async fn test_log_scope_reverts_everything_committed() {
        let backend = backend(&["eth0", "eth2"]);
        let settings = ApplySettings {
            batch_rollback_scope: RollbackScope::Log,
            ..ApplySettings::default()
        };
        let applier = applier(&backend, settings);

        assert!(applier.apply_change("eth2", OTHER, false).await.success);
        applier
            .apply_batch(&changes(&[("eth0", NEW), ("eth1", NEW)]), true)
            .await;

        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
        assert_eq!(backend.current_mac("eth2").await.as_deref(), Some(OLD));
    }

    #[tokio::test]
    async fn test_log_scope_reports_earlier_change_it_could_not_revert() {
        let backend = backend(&["eth0", "eth2"]);
        let settings = ApplySettings {
            batch_rollback_scope: RollbackScope::Log,
            ..ApplySettings::default()
        };
        let applier = applier(&backend, settings);

        assert!(applier.apply_change("eth2", OTHER, false).await.success);
        backend.error_next_sets("eth2", 1).await;
        let results = applier
            .apply_batch(&changes(&[("eth0", NEW), ("eth1", NEW)]), true)
            .await;

        assert_eq!(results["eth0"].state, ChangeState::Reverted);
        assert_eq!(results["eth1"].state, ChangeState::Failed);
        let stranded = &results["eth2"];
        assert!(!stranded.success);
        assert_eq!(stranded.state, ChangeState::Failed);
        assert_eq!(stranded.failure, Some(FailureKind::Rollback));
        assert!(stranded.message.contains("failure on eth1"));

        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
        assert_eq!(backend.current_mac("eth2").await.as_deref(), Some(OTHER));
    }

    #[tokio::test]
    async fn test_batch_without_rollback_attempts_every_target() {
        let backend = backend(&["eth0", "eth2"]);
        let applier = applier(&backend, ApplySettings::default());

        let results = applier
            .apply_batch(
                &changes(&[("eth0", NEW), ("eth1", OTHER), ("eth2", OTHER)]),
                false,
            )
            .await;

        assert!(results["eth0"].success);
        assert!(!results["eth1"].success);
        assert!(results["eth2"].success);
        assert_eq!(backend.current_mac("eth0").await.as_deref(), Some(NEW));
        assert_eq!(backend.current_mac("eth2").await.as_deref(), Some(OTHER));
    }

    #[tokio::test]
    async fn test_history_is_bounded() {
        let backend = backend(&["eth0", "eth1", "eth2"]);
        let settings = ApplySettings {
            max_transactions: 2,
            ..ApplySettings::default()
        };
        let applier = applier(&backend, settings);

        for name in ["eth0", "eth1", "eth2"] {
            applier.apply_change(name, NEW, false).await;
        }

        let targets: Vec<String> = applier
            .history()
            .await
            .into_iter()
            .map(|txn| txn.target)
            .collect();
        assert_eq!(targets, vec!["eth1", "eth2"]);
    }

    #[tokio::test]
    async fn test_apply_random_realistic_uses_known_vendor() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_random("eth0", true).await;
        assert!(result.success, "{}", result.message);

        let current = backend.current_mac("eth0").await.unwrap();
        let mac = SyntaxValidator::new().parse(&current).unwrap();
        assert!(vendor_for(&mac).is_some());
        assert!(mac.is_unicast());
    }

    #[tokio::test]
    async fn test_apply_random_changes_address() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());

        let result = applier.apply_random("eth0", false).await;
        assert!(result.success, "{}", result.message);
        assert_ne!(backend.current_mac("eth0").await.as_deref(), Some(OLD));
    }

    #[tokio::test]
    async fn test_list_interfaces_fills_vendor() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_interface("eth0", NEW)
                .with_interface("eth1", "0e:ab:cd:00:00:01"),
        );
        let applier = applier(&backend, ApplySettings::default());

        let interfaces = applier.list_interfaces().await.unwrap();
        assert_eq!(interfaces.len(), 2);
        assert_eq!(interfaces[0].vendor.as_deref(), Some("Intel Corporate"));
        assert_eq!(interfaces[1].vendor.as_deref(), Some(UNKNOWN_VENDOR));
    }

    #[tokio::test]
    async fn test_list_interfaces_propagates_backend_error() {
        let mut mock = quiet_mock();
        mock.expect_list_interfaces().times(1).returning(|| {
            Err(SystemError::UnsupportedPlatform {
                os: "plan9".to_string(),
            }
            .into())
        });

        let applier = MacApplier::new(Arc::new(mock), ApplySettings::default());
        assert!(matches!(
            applier.list_interfaces().await,
            Err(MacError::System(SystemError::UnsupportedPlatform { .. }))
        ));
    }

    #[tokio::test]
    async fn test_export_history() {
        let backend = backend(&["eth0"]);
        let applier = applier(&backend, ApplySettings::default());
        applier.apply_change("eth0", NEW, false).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        applier.export_history(&path).await.unwrap();

        let data = std::fs::read_to_string(&path).unwrap();
        let exported: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(exported[0]["target"], "eth0");
        assert_eq!(exported[0]["status"], "committed");
        assert_eq!(exported[0]["new_value"], normalize(NEW));

        applier.clear_history().await;
        assert!(applier.history().await.is_empty());
    }
}
