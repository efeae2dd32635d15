use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The operation was aborted through its [`Interrupt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation interrupted")]
pub struct Interrupted;

/// Caller-owned cancellation flag.
///
/// Clones share the same flag. Long-running operations poll
/// [`Interrupt::check`] between steps and bail out with [`Interrupted`]
/// once any clone has been tripped. Tripping is permanent.
#[derive(Clone, Debug, Default)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
}

impl Interrupt {
    /// A fresh, untripped interrupt.
    pub fn new() -> Self {
        Self::default()
    }

    /// An interrupt nobody else holds, for callers that never cancel.
    pub fn never() -> Self {
        Self::default()
    }

    /// Request cancellation of every operation observing this flag.
    pub fn trip(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_tripped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Fail with [`Interrupted`] if cancellation has been requested.
    pub fn check(&self) -> Result<(), Interrupted> {
        if self.is_tripped() {
            Err(Interrupted)
        } else {
            Ok(())
        }
    }
}
