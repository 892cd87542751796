use thiserror::Error;

/// Why a window ultimately failed to transfer.
///
/// - `TransientIo` failures were retried until the attempt ceiling was hit
/// - `Permanent` failures were not retried at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    TransientIo,
    Permanent,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::TransientIo => write!(f, "transient-io"),
            FailureKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Failures that abort a whole measurement rather than a single window.
///
/// Window-level problems never surface here: they are reported as failed
/// outcomes and checkpointed.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to provision bucket '{bucket}': {source:#}")]
    ContainerProvisioning {
        bucket: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("checkpoint file could not be persisted: {0:#}")]
    CheckpointPersistence(#[source] anyhow::Error),

    #[error("failed to plan migration range for '{measurement}': {source:#}")]
    Planning {
        measurement: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("worker pool fault: {0}")]
    Scheduler(String),
}

impl MigrationError {
    /// Checkpoint loss is the one failure that must stop the operator cold.
    pub fn is_checkpoint_failure(&self) -> bool {
        matches!(self, MigrationError::CheckpointPersistence(_))
    }
}
