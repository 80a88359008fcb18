use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use geoloc_core::{
    AcquisitionState, CapabilityId, Config, LocationService,
    capability::{capability_from_config, default_capability_from_config},
};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "geoloc", version, about = "Location acquisition CLI")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific capability backend.
    Configure {
        /// Capability short name, e.g. "ipapi" or "ipinfo".
        capability: String,
    },

    /// Acquire the current location and print it.
    Locate {
        /// Capability short name; if absent, the configured default is used.
        #[arg(long)]
        capability: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { capability } => configure(&capability),
            Command::Locate { capability } => locate(capability.as_deref()).await,
        }
    }
}

fn configure(name: &str) -> anyhow::Result<()> {
    let id = CapabilityId::try_from(name)?;
    let mut config = Config::load()?;

    if id.requires_token() {
        let token = inquire::Password::new(&format!("Access token for '{id}':"))
            .without_confirmation()
            .prompt()
            .context("Failed to read access token")?;

        config.upsert_capability_token(id, token);
    } else {
        println!("'{id}' needs no credentials; setting it as the default capability.");
        config.set_default_capability(id);
    }

    config.save()?;
    println!("Saved configuration for '{id}'.");

    Ok(())
}

async fn locate(capability: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load()?;

    let capability = match capability {
        Some(name) => capability_from_config(CapabilityId::try_from(name)?, &config)?,
        None => default_capability_from_config(&config)?,
    };

    let service = LocationService::new(Arc::from(capability));

    loop {
        match service.settled().await {
            AcquisitionState::Success(coordinates) => {
                println!("Latitude:  {:.5}", coordinates.lat);
                println!("Longitude: {:.5}", coordinates.lon);
                println!("Acquired:  {}", Local::now().format("%-I:%M %p"));
                return Ok(());
            }
            AcquisitionState::Failed(reason) => {
                let retry = inquire::Confirm::new(&format!("{reason} Try again?"))
                    .with_default(false)
                    .prompt()
                    .unwrap_or(false);

                if !retry {
                    return Err(reason.into());
                }
                service.request_location();
            }
            AcquisitionState::Loading => continue,
        }
    }
}
