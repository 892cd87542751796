//! Run command implementation
//!
//! Usage: tsmigrate run [-m <measurement>]... [-p <concurrency>] [--skip-recovery]

use anyhow::{bail, Context, Result};
use colored::Colorize;

use crate::commands::common::{connect, open_checkpoints, truncate};
use crate::config::Config;
use crate::orchestrator::{
    EntityStatus, MigrationSettings, Migrator, RecoveryReport, RunReport,
};
use crate::store::SourceStore;

/// Replay pending checkpoints, then migrate every selected measurement.
///
/// Fails (non-zero exit) when any measurement aborted or the checkpoint file
/// could not be written.
pub fn execute(
    config: &Config,
    measurements: Vec<String>,
    concurrency: Option<usize>,
    skip_recovery: bool,
) -> Result<()> {
    let (source, destination) = connect(config)?;
    let checkpoints = open_checkpoints(config)?;

    let mut settings = MigrationSettings::from_config(config);
    if let Some(p) = concurrency {
        if p == 0 {
            bail!("--concurrency must be at least 1");
        }
        settings.concurrency = p;
    }

    let selected = if measurements.is_empty() {
        let available = source
            .list_measurements()
            .context("Failed to list source measurements")?;
        config.select_measurements(available)
    } else {
        measurements
    };
    if selected.is_empty() {
        println!("No measurements selected.");
        return Ok(());
    }

    let migrator = Migrator::new(&source, &destination, &checkpoints, settings);
    let report = migrator.run(&selected, skip_recovery);

    print_report(&report);
    let pending = checkpoints.len()?;
    if pending > 0 {
        println!(
            "\n{} window(s) pending retry in {}",
            pending.to_string().yellow(),
            checkpoints.path().display()
        );
    }

    if report.has_failures() {
        bail!("Migration run {} finished with failures", report.run_id);
    }
    Ok(())
}

pub fn print_recovery(recovery: &RecoveryReport) {
    if recovery.replayed == 0 && recovery.left_pending == 0 && recovery.error.is_none() {
        return;
    }
    println!("{}", "Recovery".bold());
    println!(
        "  replayed {} entr{}, {} window(s) transferred, {} failed again",
        recovery.replayed,
        if recovery.replayed == 1 { "y" } else { "ies" },
        recovery.windows.transferred,
        recovery.windows.failed
    );
    if recovery.left_pending > 0 {
        println!("  {} entr(ies) left in place", recovery.left_pending.to_string().yellow());
    }
    if let Some(e) = &recovery.error {
        println!("  {} {e}", "stopped:".red().bold());
    }
    println!();
}

fn print_report(report: &RunReport) {
    println!();
    if let Some(recovery) = &report.recovery {
        print_recovery(recovery);
    }

    println!("{}", format!("Run {}", report.run_id).bold());
    println!(
        "  {:<24} {:>10} {:>8} {:>10}  {}",
        "MEASUREMENT", "WINDOWS", "FAILED", "POINTS", "STATUS"
    );
    println!("  {}", "─".repeat(68));
    for entity in &report.entities {
        let status = match &entity.status {
            EntityStatus::Completed if entity.windows.failed == 0 => "ok".green(),
            EntityStatus::Completed => "checkpointed".yellow(),
            EntityStatus::UpToDate => "up to date".dimmed(),
            EntityStatus::NoData => "no data".dimmed(),
            EntityStatus::Aborted(reason) => format!("aborted: {reason}").red(),
        };
        println!(
            "  {:<24} {:>10} {:>8} {:>10}  {}",
            truncate(&entity.measurement, 24),
            entity.windows.transferred + entity.windows.failed,
            entity.windows.failed,
            entity.windows.points,
            status
        );
    }
}
