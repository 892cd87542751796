//! Helpers shared by the command implementations.

use anyhow::{Context, Result};
use std::time::Duration;

use crate::checkpoints::CheckpointStore;
use crate::config::Config;
use crate::store::{InfluxV1Source, InfluxV2Destination};

/// Build the source and destination clients from the config.
pub fn connect(config: &Config) -> Result<(InfluxV1Source, InfluxV2Destination)> {
    let timeout: Duration = config.request_timeout();
    let source = InfluxV1Source::new(&config.source, timeout)
        .context("Failed to set up source client")?;
    let token = config.destination_token()?;
    let destination = InfluxV2Destination::new(&config.destination, token, timeout)
        .context("Failed to set up destination client")?;
    Ok((source, destination))
}

/// Open (and lock) the configured checkpoint file.
pub fn open_checkpoints(config: &Config) -> Result<CheckpointStore> {
    CheckpointStore::open(&config.migration.checkpoint_file)
}

/// Truncate by character count so long measurement names keep the table aligned.
pub fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
