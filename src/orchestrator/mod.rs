pub mod migration;
pub mod planner;
pub mod resume;
pub mod retry;
pub mod scheduler;
pub mod transfer;

pub use migration::{
    EntityReport, EntityStatus, MigrationSettings, Migrator, RecoveryReport, RunReport,
    WindowTally,
};
pub use planner::{plan_windows, WindowSizes};
pub use resume::ResumeCoordinator;
pub use retry::{RetryPolicy, RetryResult, StepOutcome};
pub use transfer::{transform, TransferWorker, WindowOutcome};
