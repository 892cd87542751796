//! Recover command implementation
//!
//! Usage: tsmigrate recover

use anyhow::{bail, Result};

use crate::commands::common::{connect, open_checkpoints};
use crate::commands::run::print_recovery;
use crate::config::Config;
use crate::orchestrator::{MigrationSettings, Migrator};

/// Replay checkpointed windows only; no new ranges are planned.
pub fn execute(config: &Config) -> Result<()> {
    let checkpoints = open_checkpoints(config)?;
    if checkpoints.is_empty()? {
        println!("No pending checkpoints.");
        return Ok(());
    }

    let (source, destination) = connect(config)?;
    let migrator = Migrator::new(
        &source,
        &destination,
        &checkpoints,
        MigrationSettings::from_config(config),
    );
    let report = migrator.recover_report();
    print_recovery(&report);
    println!("{} entr(ies) still pending", checkpoints.len()?);

    if let Some(e) = report.error {
        bail!("Recovery stopped: {e}");
    }
    Ok(())
}
