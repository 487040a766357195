//! Validate command

use anyhow::{Context, Result};
use macshift_validate::{MacValidation, MacValidator, ValidationPolicy};

/// Validate command implementation
pub struct ValidateCommand {
    policy: ValidationPolicy,
}

impl ValidateCommand {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    /// Validate `mac` and print what is known about it
    pub fn execute(&self, mac: &str, strict: bool) -> Result<()> {
        let validation = self.check(mac, strict)?;

        println!("✓ {}", validation.message);
        println!("  Unicast: {}", yes_no(validation.is_unicast));
        println!(
            "  Locally administered: {}",
            yes_no(validation.is_locally_administered)
        );
        println!("  OUI: {}", validation.mac.oui());
        Ok(())
    }

    /// Run validation without printing
    pub fn check(&self, mac: &str, strict: bool) -> Result<MacValidation> {
        let policy = ValidationPolicy {
            require_known_vendor: strict || self.policy.require_known_vendor,
            ..self.policy
        };

        MacValidator::new(policy)
            .validate(mac)
            .with_context(|| format!("MAC address '{}' is not acceptable", mac))
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
