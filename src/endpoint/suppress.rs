//! Feedback suppression for programmatic volume writes
//!
//! Writing a volume into the host makes the host fire its volume-changed
//! notification right back at us. Without suppression that echo would be
//! rebroadcast as if a user had moved a fader, and the GUI and host would
//! chase each other forever. The suppressor is a single flag held for the
//! whole duration of a programmatic write; the notification handler checks it
//! at the moment the callback fires.

use std::sync::atomic::{AtomicBool, Ordering};

/// Suppression flag shared between the endpoint actor (which performs
/// programmatic writes) and the host notification handler (which may run on
/// any host-controlled thread).
#[derive(Debug, Default)]
pub struct FeedbackSuppressor {
    active: AtomicBool,
}

impl FeedbackSuppressor {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a programmatic write is in flight.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Run a programmatic write with the flag held.
    ///
    /// The flag is cleared on the way out even if `f` panics, so a failed
    /// write can't leave genuine user changes permanently muted.
    pub fn run_suppressed<R>(&self, f: impl FnOnce() -> R) -> R {
        struct Clear<'a>(&'a AtomicBool);
        impl Drop for Clear<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }

        self.active.store(true, Ordering::SeqCst);
        let _clear = Clear(&self.active);
        f()
    }
}
