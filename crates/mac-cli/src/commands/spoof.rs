//! Spoof, batch and random commands

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use macshift_apply::{ChangeResult, ChangeState, RollbackReport};

use crate::cli::ChangeOptions;
use crate::context::AppContext;

/// Commands that change addresses through the applier
pub struct SpoofCommand {
    context: Arc<AppContext>,
}

impl SpoofCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Change one interface
    pub async fn execute(
        &self,
        interface: &str,
        mac: &str,
        force: bool,
        options: &ChangeOptions,
    ) -> Result<()> {
        self.announce();
        let result = self
            .context
            .applier
            .apply_change(interface, mac, force)
            .await;
        self.finish(vec![result], options).await
    }

    /// Change several interfaces in order
    pub async fn execute_batch(
        &self,
        changes: &[(String, String)],
        rollback_on_failure: bool,
        options: &ChangeOptions,
    ) -> Result<()> {
        let changes = collect_changes(changes)?;

        self.announce();
        println!("Changing {} interfaces", changes.len());
        let results = self
            .context
            .applier
            .apply_batch(&changes, rollback_on_failure)
            .await;
        self.finish(results.into_values().collect(), options).await
    }

    /// Apply a generated address to one interface
    pub async fn execute_random(
        &self,
        interface: &str,
        no_realistic: bool,
        options: &ChangeOptions,
    ) -> Result<()> {
        let realistic = self.context.settings.realistic_mac_only && !no_realistic;

        self.announce();
        let result = self
            .context
            .applier
            .apply_random(interface, realistic)
            .await;
        self.finish(vec![result], options).await
    }

    fn announce(&self) {
        if self.context.simulated {
            println!("Simulation mode: host interfaces are not modified");
        }
    }

    async fn finish(&self, results: Vec<ChangeResult>, options: &ChangeOptions) -> Result<()> {
        for result in &results {
            println!("{}", render_result(result));
        }

        let failed = results.iter().filter(|r| !r.success).count();
        let applied = results
            .iter()
            .any(|r| r.state == ChangeState::Committed);

        if let Some(seconds) = options.revert_after {
            if applied {
                self.revert_after(seconds).await?;
            }
        }

        let applier = &self.context.applier;
        if options.history {
            let history = applier.history().await;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        if let Some(path) = &options.export_history {
            applier
                .export_history(path)
                .await
                .with_context(|| format!("Failed to export history to {}", path.display()))?;
            println!("History written to {}", path.display());
        }

        if failed > 0 {
            bail!("{} of {} changes failed", failed, results.len());
        }
        Ok(())
    }

    async fn revert_after(&self, seconds: u64) -> Result<()> {
        println!("Keeping changes for {} seconds", seconds);
        tokio::time::sleep(Duration::from_secs(seconds)).await;

        info!("Trial period over, reverting changes");
        let report = self.context.applier.rollback_all().await;
        println!("{}", render_report(&report));

        if !report.success {
            bail!(
                "Could not revert {} of {} changes",
                report.failed_count,
                report.failed_count + report.rolled_back_count
            );
        }
        Ok(())
    }
}

/// Build the ordered change set, refusing repeated interfaces
pub fn collect_changes(changes: &[(String, String)]) -> Result<IndexMap<String, String>> {
    let mut collected = IndexMap::with_capacity(changes.len());
    for (interface, mac) in changes {
        if collected.insert(interface.clone(), mac.clone()).is_some() {
            bail!("Interface {} given more than once", interface);
        }
    }
    Ok(collected)
}

pub fn render_result(result: &ChangeResult) -> String {
    let mark = if result.success { "✓" } else { "✗" };
    format!(
        "{} {} [{}]: {}",
        mark, result.target, result.state, result.message
    )
}

pub fn render_report(report: &RollbackReport) -> String {
    let mut out = format!(
        "Rollback: {} reverted, {} failed",
        report.rolled_back_count, report.failed_count
    );
    for failed in &report.failed_transactions {
        out.push_str(&format!(
            "\n  ✗ {} on {}: still {}, expected {}",
            failed.action, failed.target, failed.new_value, failed.previous_value
        ));
    }
    out
}
