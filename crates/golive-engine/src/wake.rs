//! Screen wake-lock service.

use tracing::debug;

/// Platform hook that keeps the display from sleeping.
///
/// The system idle-timer setting is process-wide shared state; the engine
/// only talks to it through this trait so the real hook can be injected
/// per platform and faked in tests.
pub trait DisplaySleepInhibitor: Send {
    /// Whether display sleep is currently inhibited.
    fn is_inhibited(&self) -> bool;

    /// Inhibit or restore display sleep.
    fn set_inhibited(&mut self, inhibited: bool);
}

/// Inhibitor for headless environments; remembers the flag, touches nothing.
#[derive(Debug, Default)]
pub struct NoopInhibitor {
    inhibited: bool,
}

impl DisplaySleepInhibitor for NoopInhibitor {
    fn is_inhibited(&self) -> bool {
        self.inhibited
    }

    fn set_inhibited(&mut self, inhibited: bool) {
        self.inhibited = inhibited;
    }
}

/// Ownership wrapper around a [`DisplaySleepInhibitor`].
///
/// Remembers the system value observed at acquisition and an `held` flag
/// so releasing twice, or releasing something never acquired, cannot
/// clobber a setting the session does not own.
pub struct WakeLock {
    inner: Box<dyn DisplaySleepInhibitor>,
    original: bool,
    held: bool,
}

impl WakeLock {
    /// Wrap an inhibitor; the lock starts released.
    pub fn new(inner: Box<dyn DisplaySleepInhibitor>) -> Self {
        Self {
            inner,
            original: false,
            held: false,
        }
    }

    /// Keep the screen awake. No-op when already held.
    pub fn acquire(&mut self) {
        if self.held {
            return;
        }
        self.original = self.inner.is_inhibited();
        self.inner.set_inhibited(true);
        self.held = true;
        debug!("Wake lock acquired");
    }

    /// Restore the original setting. No-op when not held.
    pub fn release(&mut self) {
        if !self.held {
            return;
        }
        self.inner.set_inhibited(self.original);
        self.held = false;
        debug!("Wake lock released");
    }

    /// Whether the lock is currently held.
    pub fn is_held(&self) -> bool {
        self.held
    }
}

impl Drop for WakeLock {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct SharedInhibitor {
        flag: Arc<AtomicBool>,
    }

    impl DisplaySleepInhibitor for SharedInhibitor {
        fn is_inhibited(&self) -> bool {
            self.flag.load(Ordering::SeqCst)
        }

        fn set_inhibited(&mut self, inhibited: bool) {
            self.flag.store(inhibited, Ordering::SeqCst);
        }
    }

    #[test]
    fn acquire_release_restores_the_original_value() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut lock = WakeLock::new(Box::new(SharedInhibitor {
            flag: Arc::clone(&flag),
        }));

        lock.acquire();
        assert!(flag.load(Ordering::SeqCst));
        lock.release();
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn preserves_an_externally_inhibited_setting() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut lock = WakeLock::new(Box::new(SharedInhibitor {
            flag: Arc::clone(&flag),
        }));

        lock.acquire();
        lock.release();
        assert!(flag.load(Ordering::SeqCst), "owned value must survive");
    }

    #[test]
    fn double_release_does_not_clobber() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut lock = WakeLock::new(Box::new(SharedInhibitor {
            flag: Arc::clone(&flag),
        }));

        lock.acquire();
        lock.release();
        // Someone else inhibits between our releases.
        flag.store(true, Ordering::SeqCst);
        lock.release();
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn double_acquire_is_a_noop() {
        let flag = Arc::new(AtomicBool::new(false));
        let mut lock = WakeLock::new(Box::new(SharedInhibitor {
            flag: Arc::clone(&flag),
        }));

        lock.acquire();
        lock.acquire();
        assert!(lock.is_held());
        lock.release();
        assert!(!flag.load(Ordering::SeqCst));
    }
}
