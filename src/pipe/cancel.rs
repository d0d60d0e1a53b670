//! Cooperative cancellation shared by every channel of a pipeline.
//!
//! A token is a flag plus a channel that never carries a message. Cancelling
//! drops the only sender, which disconnects every cloned receiver at once, so
//! a thread parked in `select!` on the receiver wakes immediately.

use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

struct Shared {
    cancelled: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
}

/// Handle used to tear a pipeline down before its source runs dry.
#[derive(Clone)]
pub struct CancellationToken {
    shared: Arc<Shared>,
    signal: Receiver<()>,
}

impl CancellationToken {
    pub fn new() -> Self {
        let (trigger, signal) = crossbeam_channel::bounded(0);
        Self {
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
            }),
            signal,
        }
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        // A poisoned lock still holds the sender; dropping it is all we need.
        let mut trigger = match self.shared.trigger.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        trigger.take();
        tracing::debug!("Pipeline cancellation requested");
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (disconnected) once the token fires.
    pub(crate) fn signal(&self) -> &Receiver<()> {
        &self.signal
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
