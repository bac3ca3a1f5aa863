//! One-shot delayed-action primitive.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// A cancellable one-shot timer.
///
/// Arming while a previous arming is live implicitly cancels it; `cancel`
/// is idempotent. Stale fires are suppressed twice: the sleeper thread
/// checks the generation before invoking the callback, and the callback
/// receives the generation so the owner can re-validate against
/// [`OneShotTimer::generation`] when the fire is finally processed.
/// Precision is coarse; this is only used for multi-second timeouts.
pub struct OneShotTimer {
    generation: Arc<AtomicU64>,
}

impl OneShotTimer {
    /// Create an unarmed timer.
    pub fn new() -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Schedule `on_fire` to run once after `duration`.
    ///
    /// Returns the generation stamped into this arming.
    pub fn arm<F>(&self, duration: Duration, on_fire: F) -> u64
    where
        F: FnOnce(u64) + Send + 'static,
    {
        let armed = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::clone(&self.generation);

        thread::spawn(move || {
            thread::sleep(duration);
            if shared.load(Ordering::SeqCst) == armed {
                on_fire(armed);
            }
        });

        armed
    }

    /// Invalidate any pending arming. Safe to call when none is active.
    pub fn cancel(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Current generation; a delivered fire is live only if it matches.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for OneShotTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn fires_after_the_delay() {
        let timer = OneShotTimer::new();
        let (tx, rx) = bounded(1);

        let armed = timer.arm(Duration::from_millis(10), move |generation| {
            let _ = tx.send(generation);
        });

        let fired = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(fired, armed);
        assert_eq!(timer.generation(), armed);
    }

    #[test]
    fn cancel_suppresses_the_fire() {
        let timer = OneShotTimer::new();
        let (tx, rx) = bounded(1);

        timer.arm(Duration::from_millis(20), move |_| {
            let _ = tx.send(());
        });
        timer.cancel();

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn rearming_cancels_the_previous_arming() {
        let timer = OneShotTimer::new();
        let (tx, rx) = bounded(2);

        let tx_first = tx.clone();
        timer.arm(Duration::from_millis(20), move |_| {
            let _ = tx_first.send("first");
        });
        timer.arm(Duration::from_millis(40), move |_| {
            let _ = tx.send("second");
        });

        assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap(), "second");
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }

    #[test]
    fn cancel_is_idempotent() {
        let timer = OneShotTimer::new();
        timer.cancel();
        timer.cancel();
        assert_eq!(timer.generation(), 2);
    }

    #[test]
    fn stale_generation_is_detectable_by_the_owner() {
        let timer = OneShotTimer::new();
        let armed = timer.arm(Duration::from_millis(10), |_| {});
        timer.cancel();
        assert_ne!(timer.generation(), armed);
    }
}
