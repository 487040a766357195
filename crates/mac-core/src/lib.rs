//! macshift core
//!
//! Shared types and the error taxonomy used by the validator, the platform
//! backends and the transactional applier.

pub mod error;
pub mod types;

pub use error::MacError;
pub use types::*;

/// Result type for MAC address operations
pub type Result<T> = std::result::Result<T, MacError>;
