use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-wide, level-triggered interrupt flag shared between the line
/// editor's ESC handler, the HTTP transport's progress callback, and the
/// tool dispatcher's polling loop.
///
/// The flag stays set until explicitly cleared (level-triggered, not a
/// queue): repeated ESC presses are idempotent. Writers use `Release` and
/// readers use `Acquire` so a set-before-read pairing is guaranteed without
/// a separate lock.
#[derive(Debug, Clone)]
pub struct InterruptBus {
    flag: Arc<AtomicBool>,
}

impl Default for InterruptBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InterruptBus {
    pub fn new() -> Self {
        Self { flag: Arc::new(AtomicBool::new(false)) }
    }

    /// Called by the line editor's ESC handler.
    pub fn request(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Read by the HTTP progress callback and the dispatcher polling loop.
    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Called at the start of each user turn.
    pub fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}
