//! Checkpoint command implementation
//!
//! Usage: tsmigrate checkpoint [list|pop]

use anyhow::Result;

use crate::checkpoints::load;
use crate::commands::common::open_checkpoints;
use crate::config::Config;

/// Print every pending entry, oldest first.
///
/// Reads without taking the lock so it works while a run is in progress.
pub fn list(config: &Config) -> Result<()> {
    let path = &config.migration.checkpoint_file;
    let pending = load(path)?;

    println!("Pending windows ({}):", path.display());
    println!("─────────────────────────────────────────────────────────");
    if pending.is_empty() {
        println!("(none)");
        return Ok(());
    }
    for (i, entry) in pending.iter().enumerate() {
        println!("  {:>3}. {entry}", i + 1);
    }
    Ok(())
}

/// Drop the most recently recorded entry.
pub fn pop(config: &Config) -> Result<()> {
    let store = open_checkpoints(config)?;
    match store.pop_one()? {
        Some(entry) => println!("Removed: {entry}"),
        None => println!("No pending checkpoints."),
    }
    Ok(())
}
