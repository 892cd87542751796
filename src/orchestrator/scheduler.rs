//! Bounded worker pool that runs every window of a task.
//!
//! Exactly `concurrency` scoped threads pull windows from a shared queue
//! until it is empty. A failed window is just another outcome; the only
//! errors returned from [`run`] are faults in the pool itself.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info};

use super::transfer::WindowOutcome;
use crate::models::{MigrationError, TimeWindow};

/// Run `work` over all `windows` with at most `concurrency` in flight.
///
/// Blocks until every window has an outcome. Outcomes come back in the
/// order of `windows`, regardless of completion order.
pub fn run<F>(
    windows: Vec<TimeWindow>,
    concurrency: usize,
    work: F,
) -> Result<Vec<WindowOutcome>, MigrationError>
where
    F: Fn(TimeWindow) -> WindowOutcome + Sync,
{
    if concurrency == 0 {
        return Err(MigrationError::Scheduler(
            "concurrency must be at least 1".to_string(),
        ));
    }
    let total = windows.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    info!(windows = total, concurrency, "dispatching windows");

    let queue: Mutex<VecDeque<(usize, TimeWindow)>> =
        Mutex::new(windows.into_iter().enumerate().collect());
    let slots: Mutex<Vec<Option<WindowOutcome>>> = Mutex::new(vec![None; total]);

    thread::scope(|scope| -> Result<(), MigrationError> {
        let mut handles = Vec::with_capacity(concurrency);
        for worker in 0..concurrency {
            let queue = &queue;
            let slots = &slots;
            let work = &work;
            let handle = thread::Builder::new()
                .name(format!("transfer-{worker}"))
                .spawn_scoped(scope, move || loop {
                    let next = match queue.lock() {
                        Ok(mut pending) => pending.pop_front(),
                        Err(_) => None,
                    };
                    let Some((index, window)) = next else {
                        break;
                    };
                    debug!(worker, window = %window, "picked up window");
                    let outcome = work(window);
                    if let Ok(mut filled) = slots.lock() {
                        filled[index] = Some(outcome);
                    }
                })
                .map_err(|e| MigrationError::Scheduler(format!("failed to spawn worker: {e}")))?;
            handles.push(handle);
        }

        let mut panicked = 0;
        for handle in handles {
            if handle.join().is_err() {
                panicked += 1;
            }
        }
        if panicked > 0 {
            return Err(MigrationError::Scheduler(format!(
                "{panicked} worker thread(s) panicked"
            )));
        }
        Ok(())
    })?;

    let slots = slots
        .into_inner()
        .map_err(|_| MigrationError::Scheduler("outcome table poisoned".to_string()))?;
    slots
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.ok_or_else(|| {
                MigrationError::Scheduler(format!("window {index} produced no outcome"))
            })
        })
        .collect()
}
