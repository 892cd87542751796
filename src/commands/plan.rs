//! Plan command implementation
//!
//! Usage: tsmigrate plan <measurement>

use anyhow::Result;
use colored::Colorize;

use crate::commands::common::connect;
use crate::config::Config;
use crate::models::MigrationTask;
use crate::orchestrator::{plan_windows, ResumeCoordinator};

/// Show the range a run would migrate for `measurement` and its windows.
///
/// Nothing is transferred, but the bucket is created if missing since the
/// resume point is read from it.
pub fn execute(config: &Config, measurement: String) -> Result<()> {
    let (source, destination) = connect(config)?;
    let coordinator = ResumeCoordinator::new(&source, &destination);

    let Some(task) = coordinator.plan_task(&measurement)? else {
        println!("{measurement}: no data in source");
        return Ok(());
    };

    let fmt = task.time_format;
    println!("{}", measurement.bold());
    println!("  bucket:  {}", task.bucket);
    println!("  start:   {}", fmt.format(&task.start));
    println!("  end:     {}", fmt.format(&task.end));
    println!("  format:  {}", fmt.pattern());
    println!("  {}", end_boundary_note(&task).dimmed());

    if task.is_empty() {
        println!("  {}", "up to date".green());
        return Ok(());
    }

    let size = config.window_sizes().for_measurement(&measurement);
    let windows = plan_windows(&task, size)?;
    println!(
        "  windows: {} of up to {} minute(s)",
        windows.len(),
        size.num_minutes()
    );
    for window in &windows {
        println!("    [{}, {})", window.start_text(), window.end_text());
    }
    Ok(())
}

/// The end boundary is exclusive: the newest source record waits for newer data.
fn end_boundary_note(task: &MigrationTask) -> String {
    format!(
        "newest record at {} migrates on a later run (end is exclusive)",
        task.time_format.format(&task.end)
    )
}
