//! Linux backend driving iproute2 (`ip link`) and `ethtool`

use async_trait::async_trait;
use log::{debug, error, info, warn};
use regex::Regex;

use macshift_core::error::SystemError;
use macshift_core::{InterfaceInfo, LinkStatus, Result};

use crate::command::{CommandOutput, CommandRunner};
use crate::{flags_contain_up, MacBackend};

/// `ip link` based backend
pub struct LinuxBackend {
    runner: CommandRunner,
    ip_path: String,
    ethtool_path: String,
    header_regex: Regex,
    ether_regex: Regex,
}

impl LinuxBackend {
    pub fn new(runner: CommandRunner) -> Self {
        Self::with_paths(runner, "ip".to_string(), "ethtool".to_string())
    }

    /// Create with custom tool paths
    pub fn with_paths(runner: CommandRunner, ip_path: String, ethtool_path: String) -> Self {
        Self {
            runner,
            ip_path,
            ethtool_path,
            // "2: eth0: <BROADCAST,MULTICAST,UP,LOWER_UP> mtu 1500 ..."
            // "5: veth1@if4: <...>" for paired links
            header_regex: Regex::new(r"^\d+:\s+([^:@\s]+)(?:@[^:\s]+)?:\s+<([^>]*)>")
                .expect("ip link header pattern is valid"),
            ether_regex: Regex::new(r"link/ether\s+([0-9a-fA-F:]{17})")
                .expect("link/ether pattern is valid"),
        }
    }

    /// Parse `ip link show` output into interfaces
    pub fn parse_link_list(&self, output: &str) -> Vec<InterfaceInfo> {
        let mut interfaces: Vec<InterfaceInfo> = Vec::new();

        for line in output.lines() {
            if let Some(caps) = self.header_regex.captures(line) {
                let status = if flags_contain_up(&caps[2]) {
                    LinkStatus::Up
                } else {
                    LinkStatus::Down
                };
                interfaces.push(InterfaceInfo::new(&caps[1], None, status));
            } else if let Some(caps) = self.ether_regex.captures(line) {
                if let Some(current) = interfaces.last_mut() {
                    current.mac_address = Some(caps[1].to_string());
                }
            }
        }

        interfaces
    }

    /// Extract the hardware address from `ip link show dev <iface>`
    pub fn parse_mac(&self, output: &str) -> Option<String> {
        self.ether_regex
            .captures(output)
            .map(|caps| caps[1].to_string())
    }

    /// Extract `driver:` from `ethtool -i` output
    pub fn parse_driver(output: &str) -> Option<String> {
        output
            .lines()
            .find_map(|line| line.strip_prefix("driver:"))
            .map(|driver| driver.trim().to_string())
            .filter(|driver| !driver.is_empty())
    }

    async fn link_set(&self, interface: &str, args: &[&str]) -> Result<CommandOutput> {
        let mut full = vec!["link", "set", "dev", interface];
        full.extend_from_slice(args);
        self.runner.run(&self.ip_path, &full, true).await
    }
}

fn not_found(output: &CommandOutput) -> bool {
    output.stderr.contains("does not exist") || output.stderr.contains("Cannot find device")
}

#[async_trait]
impl MacBackend for LinuxBackend {
    fn name(&self) -> &'static str {
        "linux"
    }

    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        debug!("Listing interfaces with ip link");
        let output = self.runner.run(&self.ip_path, &["link", "show"], false).await?;

        if !output.success {
            return Err(SystemError::CommandFailed {
                command: "ip link show".to_string(),
                stderr: output.stderr,
            }
            .into());
        }

        Ok(self.parse_link_list(&output.stdout))
    }

    async fn get_mac(&self, interface: &str) -> Result<String> {
        let output = self
            .runner
            .run(&self.ip_path, &["link", "show", "dev", interface], false)
            .await?;

        if !output.success {
            if not_found(&output) {
                return Err(SystemError::InterfaceNotFound {
                    interface: interface.to_string(),
                }
                .into());
            }
            return Err(SystemError::CommandFailed {
                command: format!("ip link show dev {}", interface),
                stderr: output.stderr,
            }
            .into());
        }

        self.parse_mac(&output.stdout).ok_or_else(|| {
            SystemError::CommandFailed {
                command: format!("ip link show dev {}", interface),
                stderr: "no link/ether address in output".to_string(),
            }
            .into()
        })
    }

    async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool> {
        let down = self.link_set(interface, &["down"]).await?;
        if !down.success {
            warn!(
                "Could not bring down {}: {}",
                interface,
                down.stderr.trim()
            );
        }

        let set = self.link_set(interface, &["address", mac]).await;

        // the link comes back up whatever happened to the address change
        let up = self.link_set(interface, &["up"]).await;

        let set = set?;
        if !set.success {
            error!("Failed to set MAC on {}: {}", interface, set.stderr.trim());
            return Ok(false);
        }

        let up_ok = match up {
            Ok(up) => up.success,
            Err(e) => {
                warn!("Could not bring up {}: {}", interface, e);
                false
            }
        };

        info!("Set MAC on {} to {}", interface, mac);
        Ok(up_ok)
    }

    async fn driver_name(&self, interface: &str) -> Result<Option<String>> {
        let output = match self.runner.run(&self.ethtool_path, &["-i", interface], false).await {
            Ok(output) if output.success => output,
            Ok(_) => return Ok(None),
            Err(e) => {
                debug!("ethtool unavailable for {}: {}", interface, e);
                return Ok(None);
            }
        };

        Ok(Self::parse_driver(&output.stdout))
    }
}
