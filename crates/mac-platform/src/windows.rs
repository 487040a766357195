//! Windows backend driving the NetAdapter PowerShell cmdlets
//!
//! The address is written to the adapter's `NetworkAddress` advanced
//! property and the adapter is restarted so the driver picks it up.

use async_trait::async_trait;
use log::{debug, error, info, warn};

use macshift_core::error::SystemError;
use macshift_core::{InterfaceInfo, LinkStatus, Result};

use crate::command::{CommandOutput, CommandRunner};
use crate::MacBackend;

const FIELD_SEPARATOR: char = '|';

/// PowerShell `Get-NetAdapter` based backend
pub struct WindowsBackend {
    runner: CommandRunner,
}

impl WindowsBackend {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    async fn powershell(&self, script: &str, privileged: bool) -> Result<CommandOutput> {
        self.runner
            .run(
                "powershell",
                &["-NoProfile", "-NonInteractive", "-Command", script],
                privileged,
            )
            .await
    }

    /// Parse `Name|MacAddress|Status|InterfaceDescription` lines
    pub fn parse_adapter_list(output: &str) -> Vec<InterfaceInfo> {
        output
            .lines()
            .filter_map(|line| {
                let fields: Vec<&str> = line.trim().split(FIELD_SEPARATOR).collect();
                if fields.len() < 3 || fields[0].is_empty() {
                    return None;
                }

                let mac = Some(fields[1].replace('-', ":")).filter(|mac| !mac.is_empty());
                let status = match fields[2] {
                    "Up" => LinkStatus::Up,
                    "Disconnected" | "Disabled" | "Not Present" => LinkStatus::Down,
                    _ => LinkStatus::Unknown,
                };

                let mut info = InterfaceInfo::new(fields[0], mac, status);
                info.description = fields
                    .get(3)
                    .map(|d| d.to_string())
                    .filter(|d| !d.is_empty());
                Some(info)
            })
            .collect()
    }
}

/// Quote for a single-quoted PowerShell string
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn is_not_found(output: &CommandOutput) -> bool {
    output.stderr.contains("No MSFT_NetAdapter objects found")
}

#[async_trait]
impl MacBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        debug!("Listing adapters with Get-NetAdapter");
        let script = "Get-NetAdapter | ForEach-Object { \
            \"$($_.Name)|$($_.MacAddress)|$($_.Status)|$($_.InterfaceDescription)\" }";
        let output = self.powershell(script, false).await?;

        if !output.success {
            return Err(SystemError::CommandFailed {
                command: "Get-NetAdapter".to_string(),
                stderr: output.stderr,
            }
            .into());
        }

        Ok(Self::parse_adapter_list(&output.stdout))
    }

    async fn get_mac(&self, interface: &str) -> Result<String> {
        let script = format!(
            "(Get-NetAdapter -Name {} -ErrorAction Stop).MacAddress",
            quote(interface)
        );
        let output = self.powershell(&script, false).await?;

        if !output.success || output.stdout.trim().is_empty() {
            if is_not_found(&output) {
                return Err(SystemError::InterfaceNotFound {
                    interface: interface.to_string(),
                }
                .into());
            }
            return Err(SystemError::CommandFailed {
                command: format!("Get-NetAdapter -Name {}", interface),
                stderr: output.stderr,
            }
            .into());
        }

        Ok(output.stdout.trim().replace('-', ":"))
    }

    async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool> {
        let registry_value: String = mac.chars().filter(|c| c.is_ascii_hexdigit()).collect();
        let script = format!(
            "Set-NetAdapterAdvancedProperty -Name {name} -RegistryKeyword NetworkAddress \
             -RegistryValue {value} -ErrorAction Stop",
            name = quote(interface),
            value = quote(&registry_value)
        );

        let output = self.powershell(&script, true).await?;
        if !output.success {
            error!("Failed to set MAC on {}: {}", interface, output.stderr.trim());
            return Ok(false);
        }

        let restart = format!(
            "Restart-NetAdapter -Name {} -Confirm:$false -ErrorAction Stop",
            quote(interface)
        );
        let restarted = self.powershell(&restart, true).await?;
        if !restarted.success {
            warn!(
                "Adapter {} not restarted, new MAC may not be active: {}",
                interface,
                restarted.stderr.trim()
            );
        }

        info!("Set MAC on {} to {} (NetworkAddress)", interface, mac);
        Ok(true)
    }

    async fn driver_name(&self, interface: &str) -> Result<Option<String>> {
        let script = format!(
            "(Get-NetAdapter -Name {} -ErrorAction Stop).DriverFileName",
            quote(interface)
        );
        let output = self.powershell(&script, false).await?;
        let driver = output.stdout.trim();

        if !output.success || driver.is_empty() {
            return Ok(None);
        }
        Ok(Some(driver.to_string()))
    }
}
