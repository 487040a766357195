//! Error types for MAC address operations

use thiserror::Error;

/// Main error type for MAC address operations
#[derive(Debug, Error)]
pub enum MacError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("System error: {0}")]
    System(#[from] SystemError),

    #[error("Change error: {0}")]
    Change(#[from] ChangeError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Requested address is syntactically or policy invalid. No state touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid MAC format: {value}")]
    InvalidFormat { value: String },

    #[error("MAC {mac} is multicast, not unicast")]
    Multicast { mac: String },

    #[error("MAC {mac} doesn't match known vendor patterns")]
    UnknownVendor { mac: String },
}

/// Platform command errors
#[derive(Debug, Error)]
pub enum SystemError {
    #[error("Command execution failed: {command}: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Operation timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    #[error("Network interface not found: {interface}")]
    InterfaceNotFound { interface: String },

    #[error("Unsupported platform: {os}")]
    UnsupportedPlatform { os: String },
}

/// Errors raised while driving a change through its transaction
#[derive(Debug, Error)]
pub enum ChangeError {
    #[error("Could not read current MAC of {interface}: {reason}")]
    Unreachable { interface: String, reason: String },

    #[error("Platform failed to set MAC on {interface}: {reason}")]
    ApplyFailed { interface: String, reason: String },

    #[error("MAC verification failed on {interface}. Expected {expected}, got {observed}")]
    VerificationMismatch {
        interface: String,
        expected: String,
        observed: String,
    },

    #[error("Rollback of {action} on {interface} failed")]
    RollbackFailed { action: String, interface: String },

    #[error("Unknown transaction: {id}")]
    UnknownTransaction { id: u64 },

    #[error("Transaction {id} cannot move from {from} to {to}")]
    InvalidTransition { id: u64, from: String, to: String },
}

/// Settings loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}
