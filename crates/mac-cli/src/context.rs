use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use macshift_apply::{ApplySettings, MacApplier};
use macshift_platform::{detect_backend, MacBackend, MemoryBackend};

/// Load settings from `path`, or from the default locations when absent
pub fn load_settings(path: Option<&Path>) -> Result<ApplySettings> {
    match path {
        Some(path) => ApplySettings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => ApplySettings::load_with_defaults().context("Failed to load settings"),
    }
}

/// Shared state for one CLI invocation
pub struct AppContext {
    pub settings: ApplySettings,
    pub backend: Arc<dyn MacBackend>,
    pub applier: Arc<MacApplier>,
    pub simulated: bool,
}

impl AppContext {
    /// Pick the platform backend and build the applier around it
    pub async fn bootstrap(settings: ApplySettings, simulate: bool) -> Result<Arc<Self>> {
        let host = detect_backend(settings.command_runner())
            .context("No MAC backend available for this platform")?;

        if !simulate {
            return Ok(Self::with_backend(settings, host, false));
        }

        let interfaces = match host.list_interfaces().await {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!("Could not read host interfaces for simulation: {}", e);
                Vec::new()
            }
        };
        info!(
            "Simulating changes on {} interfaces from the {} backend",
            interfaces.len(),
            host.name()
        );

        let backend: Arc<dyn MacBackend> = Arc::new(MemoryBackend::from_interfaces(interfaces));
        Ok(Self::with_backend(settings, backend, true))
    }

    /// Build a context around an existing backend
    pub fn with_backend(
        settings: ApplySettings,
        backend: Arc<dyn MacBackend>,
        simulated: bool,
    ) -> Arc<Self> {
        let applier = Arc::new(MacApplier::new(backend.clone(), settings.clone()));
        Arc::new(Self {
            settings,
            backend,
            applier,
            simulated,
        })
    }
}
