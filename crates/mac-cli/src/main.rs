//! macshift

use anyhow::Result;
use clap::Parser;
use macshift::cli::{Cli, Commands};
use macshift::commands::{GenerateCommand, ListCommand, SpoofCommand, ValidateCommand};
use macshift::context::{load_settings, AppContext};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(cli.log_level()))
        .init();

    match run(&cli).await {
        Ok(()) => {
            if !cli.quiet {
                log::info!("Command completed successfully");
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);

            // Print error chain if in verbose mode
            if cli.verbose || cli.debug {
                for cause in e.chain().skip(1) {
                    eprintln!("  Caused by: {}", cause);
                }
            }
            std::process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let mut settings = load_settings(cli.config.as_deref())?;
    cli.apply_overrides(&mut settings);

    match &cli.command {
        Commands::Validate { mac, strict } => {
            return ValidateCommand::new(settings.validation_policy()).execute(mac, *strict);
        }
        Commands::Generate { count, vendor } => {
            return GenerateCommand::new().execute(*count, vendor.as_deref());
        }
        _ => {}
    }

    let context = AppContext::bootstrap(settings, cli.simulate).await?;

    match &cli.command {
        Commands::List { format } => ListCommand::new(context).execute(format).await,

        Commands::Spoof {
            interface,
            mac,
            force,
            options,
        } => {
            SpoofCommand::new(context)
                .execute(interface, mac, *force, options)
                .await
        }

        Commands::Batch {
            changes,
            no_rollback_on_failure,
            options,
        } => {
            SpoofCommand::new(context)
                .execute_batch(changes, !no_rollback_on_failure, options)
                .await
        }

        Commands::Random {
            interface,
            no_realistic,
            options,
        } => {
            SpoofCommand::new(context)
                .execute_random(interface, *no_realistic, options)
                .await
        }

        Commands::Validate { .. } | Commands::Generate { .. } => Ok(()),
    }
}
