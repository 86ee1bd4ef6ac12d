//! Single-flight gate for flush execution.
//!
//! At most one flush runs at a time. Automatic triggers (size threshold,
//! idle timer) skip when the gate is held; explicit `flush()` and `close()`
//! wait for it.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard};

/// Binary gate guarding "a submission is currently executing".
///
/// Independent of the queue lock, so enqueueing never waits on network I/O.
pub(crate) struct FlushGate {
    lock: Mutex<()>,
    skipped: AtomicU64,
}

/// RAII permit; the gate reopens when it is dropped, even on panic or
/// cancellation of the holding task.
pub(crate) struct FlushPermit<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl FlushGate {
    pub fn new() -> Self {
        Self {
            lock: Mutex::new(()),
            skipped: AtomicU64::new(0),
        }
    }

    /// Take the gate if it is free. Returns `None` (and counts a skipped
    /// trigger) when another flush holds it.
    pub fn try_acquire(&self) -> Option<FlushPermit<'_>> {
        match self.lock.try_lock() {
            Ok(guard) => Some(FlushPermit { _guard: guard }),
            Err(_) => {
                self.skipped.fetch_add(1, Ordering::SeqCst);
                None
            }
        }
    }

    /// Wait until the gate is free, then take it.
    pub async fn acquire(&self) -> FlushPermit<'_> {
        FlushPermit {
            _guard: self.lock.lock().await,
        }
    }

    /// Whether a flush currently holds the gate.
    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }

    /// Number of triggers skipped because a flush was in progress.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_skips_while_held() {
        let gate = FlushGate::new();

        let first = gate.try_acquire();
        assert!(first.is_some());
        assert!(gate.is_busy());

        assert!(gate.try_acquire().is_none());
        assert_eq!(gate.skipped(), 1);

        drop(first);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }

    #[tokio::test]
    async fn test_acquire_waits_for_release() {
        let gate = Arc::new(FlushGate::new());
        let permit = gate.try_acquire().unwrap();

        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move {
                let _permit = gate.acquire().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(permit);
        waiter.await.unwrap();
        assert!(!gate.is_busy());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_only_one_holder_at_a_time() {
        let gate = Arc::new(FlushGate::new());
        let holders = Arc::new(AtomicU64::new(0));
        let peak = Arc::new(AtomicU64::new(0));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                let holders = holders.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    let _permit = gate.acquire().await;
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    holders.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
