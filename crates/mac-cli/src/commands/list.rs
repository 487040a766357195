//! List command

use anyhow::{bail, Context, Result};
use macshift_core::InterfaceInfo;
use std::sync::Arc;

use crate::context::AppContext;

/// List command implementation
pub struct ListCommand {
    context: Arc<AppContext>,
}

impl ListCommand {
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// Print interfaces in the requested format
    pub async fn execute(&self, format: &str) -> Result<()> {
        let interfaces = self
            .context
            .applier
            .list_interfaces()
            .await
            .context("Failed to list network interfaces")?;

        match format {
            "text" => {
                if interfaces.is_empty() {
                    println!("No network interfaces found");
                } else {
                    print!("{}", render_table(&interfaces));
                }
            }
            "json" => println!("{}", serde_json::to_string_pretty(&interfaces)?),
            other => bail!("Unsupported output format: {}", other),
        }

        Ok(())
    }
}

/// Fixed-width table of interfaces
pub fn render_table(interfaces: &[InterfaceInfo]) -> String {
    let width = interfaces
        .iter()
        .map(|iface| iface.name.len())
        .max()
        .unwrap_or(0)
        .max("INTERFACE".len());

    let mut out = format!(
        "{:<width$}  {:<17}  {:<7}  {:<12}  {}\n",
        "INTERFACE",
        "MAC",
        "STATUS",
        "DRIVER",
        "VENDOR",
        width = width
    );
    for iface in interfaces {
        out.push_str(&format!(
            "{:<width$}  {:<17}  {:<7}  {:<12}  {}\n",
            iface.name,
            iface.mac_address.as_deref().unwrap_or("-"),
            iface.status.to_string(),
            iface.driver.as_deref().unwrap_or("-"),
            iface.vendor.as_deref().unwrap_or("-"),
            width = width
        ));
    }
    out
}
