//! Generate command

use anyhow::{Context, Result};
use macshift_core::MacAddr;
use macshift_validate::vendor::{generate_realistic, vendor_for, UNKNOWN_VENDOR};
use rand::Rng;

/// Generate command implementation
#[derive(Default)]
pub struct GenerateCommand;

impl GenerateCommand {
    pub fn new() -> Self {
        Self
    }

    /// Print `count` generated addresses
    pub fn execute(&self, count: usize, vendor: Option<&str>) -> Result<()> {
        let addresses = self.generate(&mut rand::thread_rng(), count, vendor)?;
        for mac in addresses {
            println!("{}  {}", mac, vendor_for(&mac).unwrap_or(UNKNOWN_VENDOR));
        }
        Ok(())
    }

    pub fn generate(
        &self,
        rng: &mut impl Rng,
        count: usize,
        vendor: Option<&str>,
    ) -> Result<Vec<MacAddr>> {
        (0..count)
            .map(|_| {
                generate_realistic(rng, vendor)
                    .with_context(|| format!("Invalid vendor prefix: {}", vendor.unwrap_or("")))
            })
            .collect()
    }
}
