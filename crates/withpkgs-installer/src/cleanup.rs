use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::{anyhow, Result};
use tracing::debug;

type CleanupFn = Box<dyn FnOnce() -> Result<()> + Send>;

struct CleanupAction {
    label: String,
    run: CleanupFn,
}

#[derive(Default)]
struct CleanupState {
    pending: Vec<CleanupAction>,
    drained: bool,
}

/// A cleanup action that failed while the stack was draining.
#[derive(Debug)]
pub struct CleanupFailure {
    pub label: String,
    pub source: anyhow::Error,
    /// Actions dropped without running because of this failure.
    pub abandoned: Vec<String>,
}

/// Deferred actions that run last-registered-first, each at most once.
///
/// Clones share the same stack, so the thread delivering an interrupt and the
/// thread running the scope both see one set of pending actions. The lock is
/// held for the whole drain: a second trigger waits for the first and then
/// finds nothing left.
#[derive(Clone, Default)]
pub struct CleanupStack {
    state: Arc<Mutex<CleanupState>>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn defer<F>(&self, label: impl Into<String>, action: F) -> Result<()>
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        let label = label.into();
        let mut state = self.lock();
        if state.drained {
            return Err(anyhow!(
                "cleanup stack already drained; refusing to register '{label}'"
            ));
        }
        debug!(action = %label, depth = state.pending.len() + 1, "registered cleanup action");
        state.pending.push(CleanupAction {
            label,
            run: Box::new(action),
        });
        Ok(())
    }

    /// Runs every pending action in reverse registration order and seals the
    /// stack. Returns how many actions ran; a later call returns `Ok(0)`.
    ///
    /// The first failing action stops the drain. Actions registered before it
    /// are dropped unrun and listed in [`CleanupFailure::abandoned`].
    pub fn drain(&self) -> std::result::Result<usize, CleanupFailure> {
        let mut state = self.lock();
        state.drained = true;

        let mut ran = 0;
        while let Some(action) = state.pending.pop() {
            debug!(action = %action.label, "running cleanup action");
            if let Err(source) = (action.run)() {
                let abandoned = state
                    .pending
                    .drain(..)
                    .rev()
                    .map(|action| action.label)
                    .collect();
                return Err(CleanupFailure {
                    label: action.label,
                    source,
                    abandoned,
                });
            }
            ran += 1;
        }
        Ok(ran)
    }

    pub fn is_drained(&self) -> bool {
        self.lock().drained
    }

    pub fn pending_labels(&self) -> Vec<String> {
        self.lock()
            .pending
            .iter()
            .rev()
            .map(|action| action.label.clone())
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, CleanupState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
