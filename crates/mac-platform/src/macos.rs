//! macOS backend driving `ifconfig`

use async_trait::async_trait;
use log::{debug, error, info};
use regex::Regex;

use macshift_core::error::SystemError;
use macshift_core::{InterfaceInfo, LinkStatus, Result};

use crate::command::CommandRunner;
use crate::{flags_contain_up, MacBackend};

/// `ifconfig` based backend
pub struct MacOsBackend {
    runner: CommandRunner,
    header_regex: Regex,
    ether_regex: Regex,
}

impl MacOsBackend {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            runner,
            // "en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500"
            header_regex: Regex::new(r"^([a-zA-Z0-9]+):\s+flags=\d+<([^>]*)>")
                .expect("ifconfig header pattern is valid"),
            ether_regex: Regex::new(r"^\s+ether\s+([0-9a-fA-F:]+)")
                .expect("ether pattern is valid"),
        }
    }

    /// Parse `ifconfig` output into interfaces
    pub fn parse_ifconfig(&self, output: &str) -> Vec<InterfaceInfo> {
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
}

#[async_trait]
impl MacBackend for MacOsBackend {
    fn name(&self) -> &'static str {
        "macos"
    }

    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        debug!("Listing interfaces with ifconfig");
        let output = self.runner.run("ifconfig", &[], false).await?;

        if !output.success {
            return Err(SystemError::CommandFailed {
                command: "ifconfig".to_string(),
                stderr: output.stderr,
            }
            .into());
        }

        Ok(self.parse_ifconfig(&output.stdout))
    }

    async fn get_mac(&self, interface: &str) -> Result<String> {
        let output = self.runner.run("ifconfig", &[interface], false).await?;

        if !output.success {
            if output.stderr.contains("does not exist") {
                return Err(SystemError::InterfaceNotFound {
                    interface: interface.to_string(),
                }
                .into());
            }
            return Err(SystemError::CommandFailed {
                command: format!("ifconfig {}", interface),
                stderr: output.stderr,
            }
            .into());
        }

        self.parse_ifconfig(&output.stdout)
            .into_iter()
            .find_map(|iface| iface.mac_address)
            .ok_or_else(|| {
                SystemError::CommandFailed {
                    command: format!("ifconfig {}", interface),
                    stderr: "no ether address in output".to_string(),
                }
                .into()
            })
    }

    async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool> {
        let output = self
            .runner
            .run("ifconfig", &[interface, "ether", mac], true)
            .await?;

        if output.success {
            info!("Set MAC on {} to {}", interface, mac);
        } else {
            error!("Failed to set MAC on {}: {}", interface, output.stderr.trim());
        }
        Ok(output.success)
    }

    async fn driver_name(&self, _interface: &str) -> Result<Option<String>> {
        // ifconfig does not expose the driver
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IFCONFIG: &str = "\
lo0: flags=8049<UP,LOOPBACK,RUNNING,MULTICAST> mtu 16384
\toptions=1203<RXCSUM,TXCSUM,TXSTATUS,SW_TIMESTAMP>
\tinet 127.0.0.1 netmask 0xff000000
en0: flags=8863<UP,BROADCAST,SMART,RUNNING,SIMPLEX,MULTICAST> mtu 1500
\toptions=6463<RXCSUM,TXCSUM,TSO4,TSO6,CHANNEL_IO,PARTIAL_CSUM,ZEROINVERT_CSUM>
\tether f0:18:98:12:34:56
\tstatus: active
en1: flags=8822<BROADCAST,SMART,SIMPLEX,MULTICAST> mtu 1500
\tether ac:87:a3:aa:bb:cc
\tstatus: inactive
";

    #[test]
    fn test_parse_ifconfig() {
        let backend = MacOsBackend::new(CommandRunner::default());
        let interfaces = backend.parse_ifconfig(IFCONFIG);

        assert_eq!(interfaces.len(), 3);
        assert_eq!(interfaces[0].name, "lo0");
        assert_eq!(interfaces[0].mac_address, None);

        assert_eq!(interfaces[1].name, "en0");
        assert_eq!(interfaces[1].status, LinkStatus::Up);
        assert_eq!(interfaces[1].mac_address.as_deref(), Some("f0:18:98:12:34:56"));

        assert_eq!(interfaces[2].name, "en1");
        assert_eq!(interfaces[2].status, LinkStatus::Down);
    }
}
