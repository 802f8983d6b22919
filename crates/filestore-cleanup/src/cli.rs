use crate::config::CleanupConfig;
use crate::sweep::{SweepReport, Sweeper};
use crate::transport::{probe, HttpTransport};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Printed by `--copyright`.
pub const COPYRIGHT: &str = concat!(
    "Copyright © 2021, The filestore-cleanup Contributors. All rights reserved.\n",
    "Distributed under the ",
    env!("CARGO_PKG_LICENSE"),
    " license."
);

#[derive(Parser, Debug)]
#[command(name = "filestore-cleanup", version)]
#[command(
    about = "Removes filestore blocks whose backing file no longer exists",
    long_about = None
)]
pub struct Cli {
    /// Node to connect to over HTTP [default: http://127.0.0.1:5001]
    #[arg(short, long, env = "FILESTORE_CLEANUP_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Longest time to wait for calls like 'version' and 'block/rm' (ex: 60s, 0 to wait forever) [default: 30s]
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Display verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Read settings from a .toml or .json file; flags override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Give up on a block after this many unpin attempts (0 for no limit) [default: 1000]
    #[arg(long)]
    pub max_unpin_rounds: Option<u32>,

    /// Display copyright and exit
    #[arg(long)]
    pub copyright: bool,
}

impl Cli {
    /// Defaults, then the config file, then explicitly given flags.
    pub fn resolve_config(&self) -> Result<CleanupConfig> {
        let mut config = match &self.config {
            Some(path) => CleanupConfig::from_file(path)?,
            None => CleanupConfig::default(),
        };

        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout;
        }
        if let Some(rounds) = self.max_unpin_rounds {
            config.max_unpin_rounds = rounds;
        }
        config.verbose |= self.verbose;

        config.validate()?;
        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        if self.copyright {
            println!("{}", COPYRIGHT);
            return Ok(());
        }

        let config = self.resolve_config()?;
        let transport = HttpTransport::new(&config.endpoint)?;

        let version = probe(&transport, config.call_timeout())
            .await
            .context("Failed to connect to end point")?;
        if config.verbose {
            tracing::info!(
                "Connected to {} (version {}, {})",
                config.endpoint,
                version.version,
                version.system
            );
        }

        tracing::info!("Checking and cleaning filestore...");
        let report = Sweeper::new(&transport, &config)
            .run()
            .await
            .context("Failed to read filestore/verify")?;
        log_report(&report);

        if let Some(reason) = report.interrupted {
            anyhow::bail!("filestore sweep did not finish: {}", reason);
        }
        Ok(())
    }
}

fn log_report(report: &SweepReport) {
    tracing::info!(
        "Checked {} entries: {} orphaned, {} removed, {} failed, {} pins removed",
        report.records_seen,
        report.orphans_found,
        report.blocks_removed,
        report.blocks_given_up,
        report.pins_removed
    );
    if report.pin_removals_failed > 0 || report.decode_failures > 0 {
        tracing::warn!(
            "{} pin removals failed, {} stream entries could not be decoded",
            report.pin_removals_failed,
            report.decode_failures
        );
    }
}
