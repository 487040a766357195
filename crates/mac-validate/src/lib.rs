//! macshift validation
//!
//! Syntax and policy validation for requested addresses plus the OUI vendor
//! table. Validation is a pure function: it never touches an interface.

pub mod syntax;
pub mod vendor;

pub use syntax::{normalize, SyntaxValidator};
pub use vendor::{generate_random, generate_realistic, vendor_for, UNKNOWN_VENDOR};

use serde::{Deserialize, Serialize};

use macshift_core::error::ValidationError;
use macshift_core::MacAddr;

/// Which addresses are acceptable beyond well-formedness
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationPolicy {
    /// Reject multicast addresses
    pub require_unicast: bool,
    /// Reject addresses whose OUI is not in the vendor table
    pub require_known_vendor: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            require_unicast: true,
            require_known_vendor: false,
        }
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacValidation {
    pub mac: MacAddr,
    pub vendor: Option<&'static str>,
    pub is_unicast: bool,
    pub is_locally_administered: bool,
    pub message: String,
}

/// Address validator applying a [`ValidationPolicy`]
pub struct MacValidator {
    syntax_validator: SyntaxValidator,
    policy: ValidationPolicy,
}

impl MacValidator {
    /// Create validator with the given policy
    pub fn new(policy: ValidationPolicy) -> Self {
        Self {
            syntax_validator: SyntaxValidator::new(),
            policy,
        }
    }

    /// Same checks, stricter vendor rule
    pub fn strict() -> Self {
        Self::new(ValidationPolicy {
            require_known_vendor: true,
            ..ValidationPolicy::default()
        })
    }

    pub fn policy(&self) -> ValidationPolicy {
        self.policy
    }

    /// Validate a requested address against format and policy
    pub fn validate(&self, mac: &str) -> Result<MacValidation, ValidationError> {
        let parsed = self.syntax_validator.parse(mac)?;
        let normalized = parsed.to_string();

        if self.policy.require_unicast && !parsed.is_unicast() {
            return Err(ValidationError::Multicast { mac: normalized });
        }

        let vendor = vendor_for(&parsed);
        if self.policy.require_known_vendor && vendor.is_none() {
            return Err(ValidationError::UnknownVendor { mac: normalized });
        }

        log::debug!("Validated MAC {} ({:?})", normalized, vendor);

        Ok(MacValidation {
            mac: parsed,
            vendor,
            is_unicast: parsed.is_unicast(),
            is_locally_administered: parsed.is_locally_administered(),
            message: format!(
                "Valid MAC address: {} ({})",
                normalized,
                vendor.unwrap_or(UNKNOWN_VENDOR)
            ),
        })
    }

    /// Normalise without judging validity
    pub fn normalize(&self, mac: &str) -> String {
        normalize(mac)
    }
}

impl Default for MacValidator {
    fn default() -> Self {
        Self::new(ValidationPolicy::default())
    }
}
