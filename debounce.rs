use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_QUIET_PERIOD: Duration = Duration::from_millis(1000);

/// Coalesces rapid successive edits of one field into a single commit after a
/// quiet period. Each `schedule` replaces the pending value and invalidates
/// the previous timer via a generation counter; `flush` hands the pending
/// value back for an immediate manual save; `cancel` drops it (navigation
/// away, or an AI description about to overwrite the field). Cooperative and
/// timer-based: one edit session per field, no locking protocol needed.
pub struct Debouncer<T> {
    inner: Arc<Inner<T>>,
    quiet_period: Duration,
}

struct Inner<T> {
    generation: AtomicU64,
    pending: Mutex<Option<T>>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                generation: AtomicU64::new(0),
                pending: Mutex::new(None),
            }),
            quiet_period,
        }
    }

    /// Stores `value` as the pending edit and schedules `commit` to run after
    /// the quiet period, unless a newer edit, flush or cancel supersedes it.
    pub fn schedule<F, Fut>(&self, value: T, commit: F)
    where
        F: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.inner.pending.lock().unwrap() = Some(value);

        let inner = self.inner.clone();
        let quiet_period = self.quiet_period;
        tokio::spawn(async move {
            tokio::time::sleep(quiet_period).await;
            if inner.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            let value = inner.pending.lock().unwrap().take();
            if let Some(value) = value {
                commit(value).await;
            }
        });
    }

    /// Cancels the timer and returns the pending value for the caller to save
    /// immediately. `None` when nothing is pending.
    pub fn flush(&self) -> Option<T> {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.lock().unwrap().take()
    }

    /// Drops any pending edit without committing it.
    pub fn cancel(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.lock().unwrap().take();
    }
}

impl<T: Send + 'static> Default for Debouncer<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUIET_PERIOD)
    }
}
