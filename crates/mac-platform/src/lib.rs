//! macshift platform backends
//!
//! One capability trait, [`MacBackend`], with a strategy per operating
//! system. The strategy is picked once at startup by [`detect_backend`].

pub mod command;
pub mod linux;
pub mod macos;
pub mod memory;
pub mod windows;

pub use command::{CommandOutput, CommandRunner};
pub use linux::LinuxBackend;
pub use macos::MacOsBackend;
pub use memory::MemoryBackend;
pub use windows::WindowsBackend;

use std::sync::Arc;

use async_trait::async_trait;
use log::info;

use macshift_core::error::SystemError;
use macshift_core::{InterfaceInfo, Result};

/// Platform capability used by the applier
#[async_trait]
pub trait MacBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Enumerate interfaces with their current address and link state
    async fn list_interfaces(&self) -> Result<Vec<InterfaceInfo>>;

    /// Current hardware address of `interface`.
    ///
    /// Fails with [`SystemError::InterfaceNotFound`] for unknown interfaces.
    async fn get_mac(&self, interface: &str) -> Result<String>;

    /// Set the hardware address. `Ok(false)` means the platform refused the
    /// change; the interface is left in a state it could already be in.
    async fn set_mac(&self, interface: &str, mac: &str) -> Result<bool>;

    /// Kernel driver bound to the interface, if the platform exposes it
    async fn driver_name(&self, interface: &str) -> Result<Option<String>>;
}

/// Select the backend for the running operating system
pub fn detect_backend(runner: CommandRunner) -> Result<Arc<dyn MacBackend>> {
    let os = std::env::consts::OS;
    let backend: Arc<dyn MacBackend> = match os {
        "linux" => Arc::new(LinuxBackend::new(runner)),
        "macos" => Arc::new(MacOsBackend::new(runner)),
        "windows" => Arc::new(WindowsBackend::new(runner)),
        other => {
            return Err(SystemError::UnsupportedPlatform {
                os: other.to_string(),
            }
            .into())
        }
    };

    info!("Using {} backend", backend.name());
    Ok(backend)
}

/// Split a `status` flag list such as `BROADCAST,MULTICAST,UP,LOWER_UP`
/// and report whether the administrative `UP` flag is present
pub(crate) fn flags_contain_up(flags: &str) -> bool {
    flags.split(',').any(|flag| flag.trim() == "UP")
}
