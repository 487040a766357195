//! In-memory backend
//!
//! Holds an interface table instead of touching the host. Used for
//! `--simulate` runs and as the fake platform in tests; failures can be
//! injected per interface.

use std::collections::HashMap;

use async_trait::async_trait;
use indexmap::IndexMap;
use log::debug;
use tokio::sync::Mutex;

use macshift_core::error::SystemError;
use macshift_core::{InterfaceInfo, LinkStatus, Result};

use crate::MacBackend;

#[derive(Default)]
struct MemoryState {
    interfaces: IndexMap<String, InterfaceInfo>,
    /// Remaining `set_mac` calls answered with `Ok(false)`
    reject_sets: HashMap<String, usize>,
    /// Remaining `set_mac` calls answered with `Ok(true)` without effect
    ignore_sets: HashMap<String, usize>,
    /// Remaining `set_mac` calls answered with an error
    error_sets: HashMap<String, usize>,
    set_calls: Vec<(String, String)>,
}

/// Interface table kept in process memory
#[derive(Default)]
pub struct MemoryBackend {
    state: Mutex<MemoryState>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from an enumerated interface list, e.g. the host's
    pub fn from_interfaces(interfaces: Vec<InterfaceInfo>) -> Self {
        let state = MemoryState {
            interfaces: interfaces
                .into_iter()
                .map(|iface| (iface.name.clone(), iface))
                .collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
        }
    }

    /// Builder-style seeding with an up interface
    pub fn with_interface(mut self, name: &str, mac: &str) -> Self {
        self.state.get_mut().interfaces.insert(
            name.to_string(),
            InterfaceInfo::new(name, Some(mac.to_string()), LinkStatus::Up),
        );
        self
    }

    /// Refuse the next `count` address changes on `interface`
    pub async fn reject_next_sets(&self, interface: &str, count: usize) {
        self.state
            .lock()
            .await
            .reject_sets
            .insert(interface.to_string(), count);
    }

    /// Report success for the next `count` changes but keep the old address
    pub async fn ignore_next_sets(&self, interface: &str, count: usize) {
        self.state
            .lock()
            .await
            .ignore_sets
            .insert(interface.to_string(), count);
    }

    /// Fail the next `count` changes with a command error
    pub async fn error_next_sets(&self, interface: &str, count: usize) {
        self.state
            .lock()
            .await
            .error_sets
            .insert(interface.to_string(), count);
    }

    /// Drop an interface so reads report it missing
    pub async fn remove_interface(&self, interface: &str) {
        self.state.lock().await.interfaces.shift_remove(interface);
    }

    /// Every `set_mac` call received, in order
    pub async fn set_calls(&self) -> Vec<(String, String)> {
        self.state.lock().await.set_calls.clone()
    }

    /// Current address without going through the trait
    pub async fn current_mac(&self, interface: &str) -> Option<String> {
        self.state
            .lock()
            .await
            .interfaces
            .get(interface)
            .and_then(|iface| iface.mac_address.clone())
    }
}

fn take_one(counter: &mut HashMap<String, usize>, interface: &str) -> bool {
    match counter.get_mut(interface) {
        Some(remaining) if *remaining > 0 => {
            *remaining -= 1;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl MacBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>> {
        Ok(self.state.lock().await.interfaces.values().cloned().collect())
    }

    async fn get_mac(&self, interface: &str) -> Result<String> {
        let state = self.state.lock().await;
        state
            .interfaces
            .get(interface)
            .and_then(|iface| iface.mac_address.clone())
            .ok_or_else(|| {
                SystemError::InterfaceNotFound {
                    interface: interface.to_string(),
                }
                .into()
            })
    }

    async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool> {
        let mut state = self.state.lock().await;
        state
            .set_calls
            .push((interface.to_string(), mac.to_string()));

        if !state.interfaces.contains_key(interface) {
            return Err(SystemError::InterfaceNotFound {
                interface: interface.to_string(),
            }
            .into());
        }
        if take_one(&mut state.error_sets, interface) {
            return Err(SystemError::CommandFailed {
                command: format!("set {} address {}", interface, mac),
                stderr: "injected failure".to_string(),
            }
            .into());
        }
        if take_one(&mut state.reject_sets, interface) {
            debug!("Rejecting MAC change on {}", interface);
            return Ok(false);
        }
        if take_one(&mut state.ignore_sets, interface) {
            debug!("Ignoring MAC change on {}", interface);
            return Ok(true);
        }

        if let Some(iface) = state.interfaces.get_mut(interface) {
            iface.mac_address = Some(mac.to_string());
        }
        Ok(true)
    }

    async fn driver_name(&self, interface: &str) -> Result<Option<String>> {
        Ok(self
            .state
            .lock()
            .await
            .interfaces
            .get(interface)
            .and_then(|iface| iface.driver.clone()))
    }
}
