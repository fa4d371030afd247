//! Interrupt handling: SIGINT/SIGTERM request a drain, not an abort.
//!
//! The producer polls the flag between directories and workers poll it
//! between hashing tasks, so in-flight work completes and results for
//! finished directories stay persisted.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::warn;

/// Shared shutdown flag set from the OS signal handler.
///
/// `Ordering::Relaxed` throughout: the flag is polled, never used to order
/// other memory operations.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    requested: Arc<AtomicBool>,
}

impl InterruptFlag {
    /// Create a flag without registering OS hooks (tests, library use).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a flag and register SIGINT/SIGTERM to set it.
    ///
    /// Registration is best-effort; a failure is logged and the crawl simply
    /// runs without signal draining.
    #[must_use]
    pub fn registered() -> Self {
        let flag = Self::new();
        for signal in [SIGINT, SIGTERM] {
            if let Err(error) = signal_hook::flag::register(signal, Arc::clone(&flag.requested)) {
                warn!(signal, %error, "failed to register signal handler");
            }
        }
        flag
    }

    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Relaxed)
    }

    /// Programmatic interrupt request (tests, embedding).
    pub fn request(&self) {
        self.requested.store(true, Ordering::Relaxed);
    }
}
