//! Usage: tsmigrate measurements

use anyhow::{Context, Result};
use colored::Colorize;

use crate::commands::common::connect;
use crate::config::Config;
use crate::store::SourceStore;

/// List source measurements, marking the ones a run would skip.
pub fn execute(config: &Config) -> Result<()> {
    let (source, _) = connect(config)?;
    let available = source
        .list_measurements()
        .context("Failed to list source measurements")?;
    if available.is_empty() {
        println!("(no measurements in {})", config.source.database);
        return Ok(());
    }

    let selected = config.select_measurements(available.clone());
    for name in available {
        if selected.contains(&name) {
            println!("  {name}");
        } else {
            println!("  {} {}", name.dimmed(), "(excluded)".dimmed());
        }
    }
    Ok(())
}
