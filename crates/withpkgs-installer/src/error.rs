use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by a guarded scope itself. Errors produced by the caller's
/// work are returned untouched and never appear here.
#[derive(Debug, Error)]
pub enum GuardFailure {
    #[error("install command failed: {command}")]
    Install {
        command: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(
        "failed to restore package files during '{step}'; backups kept in {} for manual recovery",
        backup_dir.display()
    )]
    Restore {
        step: String,
        backup_dir: PathBuf,
        #[source]
        source: anyhow::Error,
    },
    #[error("interrupted before the guarded work completed")]
    Interrupted,
    #[error("interrupt token already guards an active package scope")]
    ScopeBusy,
}

impl GuardFailure {
    /// Finds a `GuardFailure` anywhere in an error chain.
    pub fn find(err: &anyhow::Error) -> Option<&GuardFailure> {
        err.chain().find_map(|cause| cause.downcast_ref::<GuardFailure>())
    }
}
