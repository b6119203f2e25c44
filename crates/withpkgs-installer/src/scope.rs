use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use tracing::{debug, error, info, warn};
use withpkgs_core::PackageManagerInfo;

use crate::backup::{create_scratch_dir, remove_scratch_dir, BackupSet, ScratchSettings};
use crate::cleanup::{CleanupFailure, CleanupStack};
use crate::commands::{CommandRunner, PackageCommand, ShellRunner};
use crate::error::GuardFailure;
use crate::interrupt::InterruptToken;

const SCRATCH_TEARDOWN_STEP: &str = "remove scratch directory";
const RESTORE_STEP: &str = "restore package files";

/// Runs work with extra packages installed, putting the manifest and
/// lockfile back afterwards no matter how the work ends.
pub struct PackageScope {
    manager: PackageManagerInfo,
    runner: Arc<dyn CommandRunner>,
    interrupt: InterruptToken,
    scratch: ScratchSettings,
}

impl PackageScope {
    pub fn new(manager: PackageManagerInfo) -> Self {
        Self {
            manager,
            runner: Arc::new(ShellRunner::new()),
            interrupt: InterruptToken::new(),
            scratch: ScratchSettings::default(),
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptToken) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn with_scratch(mut self, scratch: ScratchSettings) -> Self {
        self.scratch = scratch;
        self
    }

    pub fn manager(&self) -> &PackageManagerInfo {
        &self.manager
    }

    pub fn interrupt_token(&self) -> &InterruptToken {
        &self.interrupt
    }

    /// Installs `descriptors`, runs `work`, then restores the package files.
    ///
    /// With no descriptors nothing is touched and `work` runs directly. An
    /// error from `work` comes back as the same value it returned. Install
    /// and restore problems surface as [`GuardFailure`].
    pub fn run<T, F>(&self, descriptors: &[String], work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if descriptors.is_empty() {
            debug!("no packages requested; running work unguarded");
            return work();
        }

        let cleanup = CleanupStack::new();
        let interrupt_failure = Arc::new(Mutex::new(None::<CleanupFailure>));
        let restored_by_interrupt = Arc::new(AtomicBool::new(false));
        let subscription = {
            let cleanup = cleanup.clone();
            let interrupt_failure = Arc::clone(&interrupt_failure);
            let restored_by_interrupt = Arc::clone(&restored_by_interrupt);
            self.interrupt.subscribe(move || match cleanup.drain() {
                Ok(0) => debug!("interrupt arrived after cleanup; nothing to restore"),
                Ok(_) => restored_by_interrupt.store(true, Ordering::SeqCst),
                Err(failure) => {
                    error!(
                        step = %failure.label,
                        error = %format!("{:#}", failure.source),
                        "restoration triggered by interrupt failed"
                    );
                    *interrupt_failure
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(failure);
                }
            })?
        };
        let unwind_guard = DrainOnUnwind { cleanup: &cleanup };

        let mut scratch_dir = None;
        let outcome = self
            .prepare(descriptors, &cleanup, &mut scratch_dir)
            .map_err(|err| {
                if self.interrupt.is_interrupted() {
                    debug!(error = %format!("{err:#}"), "preparation cut short by interrupt");
                    GuardFailure::Interrupted.into()
                } else {
                    err
                }
            })
            .and_then(|install| self.install_then_work(&install, work));

        let drained = cleanup.drain();
        drop(unwind_guard);
        drop(subscription);

        let restore_failure = drained.err().or_else(|| {
            interrupt_failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        });
        if let Some(failure) = restore_failure {
            if let Err(err) = &outcome {
                error!(error = %format!("{err:#}"), "guarded work failed before restoration failed");
            }
            if !failure.abandoned.is_empty() {
                warn!(abandoned = ?failure.abandoned, "cleanup actions skipped after failure");
            }
            return Err(GuardFailure::Restore {
                step: failure.label,
                backup_dir: scratch_dir.unwrap_or_default(),
                source: failure.source,
            }
            .into());
        }

        match outcome {
            Ok(_) if restored_by_interrupt.load(Ordering::SeqCst) => {
                Err(GuardFailure::Interrupted.into())
            }
            outcome => outcome,
        }
    }

    /// Backs up the package files and queues their restoration. Returns the
    /// install command to run.
    fn prepare(
        &self,
        descriptors: &[String],
        cleanup: &CleanupStack,
        scratch_dir_out: &mut Option<PathBuf>,
    ) -> Result<PackageCommand> {
        let scratch_dir = create_scratch_dir(&self.scratch)?;
        *scratch_dir_out = Some(scratch_dir.clone());
        {
            let scratch_dir = scratch_dir.clone();
            cleanup.defer(SCRATCH_TEARDOWN_STEP, move || remove_scratch_dir(&scratch_dir))?;
        }

        let backups = BackupSet::capture(&self.manager, &scratch_dir)?;

        let install = PackageCommand::install(self.manager.kind, descriptors);
        let recover = PackageCommand::reinstall(self.manager.kind);

        let runner = Arc::clone(&self.runner);
        let working_dir = self.manager.project_dir().map(PathBuf::from);
        cleanup.defer(RESTORE_STEP, move || {
            info!(command = %recover.command_line(), "restoring package files");
            backups.restore()?;
            runner.run(&recover, working_dir.as_deref())
        })?;

        Ok(install)
    }

    fn install_then_work<T, F>(&self, install: &PackageCommand, work: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.interrupt.is_interrupted() {
            return Err(GuardFailure::Interrupted.into());
        }

        let command = install.command_line();
        info!(manager = %self.manager.kind, command = %command, "installing requested packages");
        self.runner
            .run(install, self.manager.project_dir())
            .map_err(|source| GuardFailure::Install { command, source })?;

        if self.interrupt.is_interrupted() {
            return Err(GuardFailure::Interrupted.into());
        }
        work()
    }
}

struct DrainOnUnwind<'a> {
    cleanup: &'a CleanupStack,
}

impl Drop for DrainOnUnwind<'_> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            return;
        }
        if let Err(failure) = self.cleanup.drain() {
            error!(
                step = %failure.label,
                error = %format!("{:#}", failure.source),
                "restoration during unwind failed"
            );
        }
    }
}
