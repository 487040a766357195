//! Command-line definition

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use macshift_apply::ApplySettings;

#[derive(Parser, Debug)]
#[command(name = "macshift")]
#[command(about = "Change MAC addresses with transactional rollback")]
#[command(version)]
#[command(long_about = "
Change MAC addresses with transactional rollback

Every change is recorded before it is applied and verified afterwards.
A change that fails or does not take effect is reverted to the previous
address. Batches stop and revert at the first failure.

Examples:
  macshift list                                 # Show interfaces and addresses
  macshift validate 00:25:86:aa:bb:cc           # Check an address
  macshift generate -n 3 --vendor 00:25:86      # Generate addresses
  macshift spoof eth0 00:25:86:aa:bb:cc         # Change one interface
  macshift batch eth0=00:25:86:aa:bb:cc eth1=00:1a:a0:12:34:56
  macshift random eth0 --revert-after 60        # Try a random address for a minute
  macshift --simulate spoof eth0 00:25:86:aa:bb:cc
")]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Settings file (TOML)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Work on an in-memory copy of the host interfaces
    #[arg(long, global = true)]
    pub simulate: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List network interfaces
    List {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Validate a MAC address
    Validate {
        mac: String,

        /// Require a known vendor prefix
        #[arg(long)]
        strict: bool,
    },

    /// Generate MAC addresses with a known vendor prefix
    Generate {
        /// Number of addresses
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Vendor prefix to use (e.g. 00:25:86)
        #[arg(long, value_name = "OUI")]
        vendor: Option<String>,
    },

    /// Change the MAC address of one interface
    Spoof {
        interface: String,
        mac: String,

        /// Skip address validation
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        options: ChangeOptions,
    },

    /// Change several interfaces, reverting all of them on the first failure
    Batch {
        /// Changes as IFACE=MAC
        #[arg(value_name = "IFACE=MAC", required = true, value_parser = parse_assignment)]
        changes: Vec<(String, String)>,

        /// Keep successful changes when a later one fails
        #[arg(long)]
        no_rollback_on_failure: bool,

        #[command(flatten)]
        options: ChangeOptions,
    },

    /// Apply a generated address to an interface
    Random {
        interface: String,

        /// Use a fully random address instead of a known vendor prefix
        #[arg(long)]
        no_realistic: bool,

        #[command(flatten)]
        options: ChangeOptions,
    },
}

/// Flags shared by the commands that change addresses
#[derive(Args, Debug, Clone, Default)]
pub struct ChangeOptions {
    /// Leave failed changes pending instead of reverting them
    #[arg(long)]
    pub no_auto_rollback: bool,

    /// Print the transaction history as JSON when done
    #[arg(long)]
    pub history: bool,

    /// Write the transaction history to FILE when done
    #[arg(long, value_name = "FILE")]
    pub export_history: Option<PathBuf>,

    /// Revert every change after SECS seconds
    #[arg(long, value_name = "SECS")]
    pub revert_after: Option<u64>,
}

impl Cli {
    /// Log filter derived from the verbosity flags
    pub fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }

    /// Apply per-invocation flags on top of loaded settings
    pub fn apply_overrides(&self, settings: &mut ApplySettings) {
        if let Some(options) = self.command.change_options() {
            if options.no_auto_rollback {
                settings.auto_rollback_on_error = false;
            }
        }
    }
}

impl Commands {
    pub fn change_options(&self) -> Option<&ChangeOptions> {
        match self {
            Commands::Spoof { options, .. }
            | Commands::Batch { options, .. }
            | Commands::Random { options, .. } => Some(options),
            _ => None,
        }
    }
}

/// Parse an `IFACE=MAC` pair
pub fn parse_assignment(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((interface, mac)) if !interface.trim().is_empty() && !mac.trim().is_empty() => {
            Ok((interface.trim().to_string(), mac.trim().to_string()))
        }
        _ => Err(format!("expected IFACE=MAC, got '{}'", value)),
    }
}
