//! Guarded package installation.
//!
//! [`PackageScope`] temporarily adds packages to a JavaScript project, runs a
//! unit of work, and restores `package.json` and its lockfile afterwards,
//! including when the work fails, the install fails, or an interrupt arrives
//! through an [`InterruptToken`].

mod backup;
mod cleanup;
mod commands;
mod error;
mod interrupt;
mod scope;

pub use backup::{
    create_scratch_dir, remove_scratch_dir, BackupEntry, BackupSet, ScratchSettings,
    DEFAULT_SCRATCH_PREFIX,
};
pub use cleanup::{CleanupFailure, CleanupStack};
pub use commands::{CommandRunner, PackageCommand, ShellRunner};
pub use error::GuardFailure;
pub use interrupt::{InterruptSubscription, InterruptToken};
pub use scope::PackageScope;
