//! Address normalisation and format checks
//!
//! Accepts colon, dash, dot (Cisco style) and bare hex notations and reduces
//! them to upper-case colon separated octets.

use regex::Regex;

use macshift_core::error::ValidationError;
use macshift_core::MacAddr;

const HEX_DIGITS: &str = "0123456789ABCDEF";

/// Normalise to `XX:XX:XX:XX:XX:XX`.
///
/// Separators are stripped and the text upper-cased. When the remainder is
/// not exactly twelve hex digits the stripped, upper-cased text is returned
/// unchanged so callers can still compare or report it.
pub fn normalize(mac: &str) -> String {
    let stripped: String = mac
        .trim()
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | ':'))
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if stripped.len() == 12 && stripped.chars().all(|c| HEX_DIGITS.contains(c)) {
        stripped
            .as_bytes()
            .chunks(2)
            .map(|pair| String::from_utf8_lossy(pair).into_owned())
            .collect::<Vec<_>>()
            .join(":")
    } else {
        stripped
    }
}

/// Format checker for normalised addresses
pub struct SyntaxValidator {
    mac_address_regex: Regex,
}

impl SyntaxValidator {
    pub fn new() -> Self {
        Self {
            mac_address_regex: Regex::new(r"^(?:[0-9A-F]{2}:){5}[0-9A-F]{2}$")
                .expect("MAC address pattern is valid"),
        }
    }

    /// Whether `mac` normalises to a well-formed address
    pub fn is_valid_format(&self, mac: &str) -> bool {
        self.mac_address_regex.is_match(&normalize(mac))
    }

    /// Normalise and parse, rejecting anything that is not six octets
    pub fn parse(&self, mac: &str) -> Result<MacAddr, ValidationError> {
        let normalized = normalize(mac);
        if !self.mac_address_regex.is_match(&normalized) {
            return Err(ValidationError::InvalidFormat { value: normalized });
        }

        normalized
            .parse::<MacAddr>()
            .map_err(|_| ValidationError::InvalidFormat { value: normalized })
    }
}

impl Default for SyntaxValidator {
    fn default() -> Self {
        Self::new()
    }
}
