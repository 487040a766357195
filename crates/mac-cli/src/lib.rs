//! macshift CLI
//!
//! Command-line front end for listing interfaces, validating and generating
//! addresses, and changing MAC addresses with automatic rollback.

pub mod cli;
pub mod commands;
pub mod context;
