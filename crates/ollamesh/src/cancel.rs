//! Cooperative cancellation for streaming generations.
//!
//! The token is cloned into whatever drives the UI (a stop button, Ctrl-C
//! handler) and checked by the stream loop at chunk boundaries, so no
//! fragments are delivered after cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A shared cancellation flag. Cloning is cheap; all clones observe the
/// same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
