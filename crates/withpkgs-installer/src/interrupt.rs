use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::error::GuardFailure;

type InterruptHandler = Box<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct InterruptState {
    interrupted: AtomicBool,
    handler: Mutex<Option<InterruptHandler>>,
}

/// Carries an external interrupt into a guarded scope.
///
/// Whoever owns the platform signal calls [`InterruptToken::interrupt`]; the
/// scope that subscribed reacts by draining its cleanup stack on that thread.
/// At most one scope may be subscribed at a time.
#[derive(Clone, Default)]
pub struct InterruptToken {
    state: Arc<InterruptState>,
}

impl InterruptToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        let first = !self.state.interrupted.swap(true, Ordering::SeqCst);
        if first {
            warn!("interrupt received");
        } else {
            debug!("repeated interrupt received");
        }
        if let Some(handler) = self.handler().as_ref() {
            handler();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler().is_some()
    }

    /// Installs `handler` until the returned subscription is dropped.
    pub fn subscribe<F>(&self, handler: F) -> Result<InterruptSubscription, GuardFailure>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut slot = self.handler();
        if slot.is_some() {
            return Err(GuardFailure::ScopeBusy);
        }
        *slot = Some(Box::new(handler));
        Ok(InterruptSubscription {
            token: self.clone(),
        })
    }

    fn handler(&self) -> MutexGuard<'_, Option<InterruptHandler>> {
        self.state
            .handler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct InterruptSubscription {
    token: InterruptToken,
}

impl Drop for InterruptSubscription {
    fn drop(&mut self) {
        self.token.handler().take();
        debug!("interrupt handler unsubscribed");
    }
}
