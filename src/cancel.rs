//! Per-operation cancellation channels.
//!
//! A [`CancellationSignal`] is held by whoever wants to cancel an operation.
//! The matching [`CancellationSlot`] travels with the operation's
//! continuation, and the device performing the operation installs a handler
//! into it. Emitting the signal calls that handler, which then completes the
//! operation early with [`Error::Aborted`](crate::error::Error::Aborted).
//!
//! Cancellation is cooperative: the continuation is still invoked exactly
//! once.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//!
//! use polyio::cancel::{CancellationSignal, CancellationType};
//!
//! let signal = CancellationSignal::new();
//! let slot = signal.slot();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//!
//! let s = seen.clone();
//! slot.assign(move |kind| s.lock().unwrap().push(kind));
//!
//! signal.emit(CancellationType::Terminal);
//! assert_eq!(*seen.lock().unwrap(), vec![CancellationType::Terminal]);
//! ```

use std::fmt;

use triomphe::Arc;

/// How strongly an operation is asked to stop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CancellationType {
    /// The operation may be left in an unspecified state; the device may not
    /// be usable afterwards.
    Terminal,
    /// The operation may have had side effects, but the device stays usable.
    Partial,
    /// The operation had no side effects at all.
    Total,
}

/// The installed handler.
type Handler = Box<dyn FnMut(CancellationType) + Send>;

/// The handler of a slot, together with a counter of changes to it.
struct Installed {
    handler: Option<Handler>,
    version: u64,
}

/// State shared between a signal and its slots.
struct SlotState {
    installed: spin::Mutex<Installed>,
}

/// The emitting side of a cancellation channel.
pub struct CancellationSignal {
    state: Arc<SlotState>,
}

impl CancellationSignal {
    /// Creates a signal with an empty slot.
    pub fn new() -> Self {
        Self {
            state: Arc::new(SlotState {
                installed: spin::Mutex::new(Installed {
                    handler: None,
                    version: 0,
                }),
            }),
        }
    }

    /// Returns the slot connected to this signal.
    pub fn slot(&self) -> CancellationSlot {
        CancellationSlot {
            state: self.state.clone(),
        }
    }

    /// Calls the handler installed in the slot, if any.
    ///
    /// The handler stays installed afterwards. The handler runs without any
    /// lock held, so it may assign or clear the slot itself.
    pub fn emit(&self, kind: CancellationType) {
        let (handler, version) = {
            let mut installed = self.state.installed.lock();
            (installed.handler.take(), installed.version)
        };

        let Some(mut handler) = handler else {
            tracing::trace!(?kind, "cancellation emitted with no handler");
            return;
        };

        tracing::debug!(?kind, "cancellation emitted");
        handler(kind);

        let mut installed = self.state.installed.lock();
        if installed.version == version {
            installed.handler = Some(handler);
        }
    }
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancellationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancellationSignal({:p})", &*self.state)
    }
}

/// The receiving side of a cancellation channel.
///
/// Slots are cheap to clone. Clones refer to the same slot and compare equal.
#[derive(Clone)]
pub struct CancellationSlot {
    state: Arc<SlotState>,
}

impl CancellationSlot {
    /// Installs `handler`, replacing any previous one.
    pub fn assign<F>(&self, handler: F)
    where
        F: FnMut(CancellationType) + Send + 'static,
    {
        let mut installed = self.state.installed.lock();
        installed.handler = Some(Box::new(handler));
        installed.version += 1;
    }

    /// Removes the installed handler, if any.
    pub fn clear(&self) {
        let mut installed = self.state.installed.lock();
        installed.handler = None;
        installed.version += 1;
    }

    /// Returns `true` if a handler is installed.
    ///
    /// While [`emit`](CancellationSignal::emit) runs the handler, the slot
    /// reports no handler.
    pub fn has_handler(&self) -> bool {
        self.state.installed.lock().handler.is_some()
    }
}

impl PartialEq for CancellationSlot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for CancellationSlot {}

impl fmt::Debug for CancellationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancellationSlot({:p})", &*self.state)
    }
}
