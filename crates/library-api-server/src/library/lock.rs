use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

static NEXT_LOCK_ID: AtomicU64 = AtomicU64::new(1);

tokio::task_local! {
    /// Ids of the master locks held by the current request task.
    static HELD: Vec<u64>;
}

/// Process-wide serialization handle owned by the library.
///
/// `Unlocked` runs work unsynchronized. `Exclusive` runs at most one
/// piece of work at a time across all tasks, and lets work that already
/// holds the lock enter it again without waiting on itself.
#[derive(Clone, Default)]
pub enum LibraryLock {
    #[default]
    Unlocked,
    Exclusive(MasterLock),
}

impl LibraryLock {
    pub fn exclusive() -> Self {
        LibraryLock::Exclusive(MasterLock::new())
    }

    /// Run `work` under the lock. The lock is released exactly once when
    /// `work` finishes, returns early, or panics.
    pub async fn run<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        match self {
            LibraryLock::Unlocked => work.await,
            LibraryLock::Exclusive(lock) => lock.run(work).await,
        }
    }

    pub fn stats(&self) -> Option<LockStats> {
        match self {
            LibraryLock::Unlocked => None,
            LibraryLock::Exclusive(lock) => Some(lock.stats()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockStats {
    /// Outermost acquisitions (reentrant entries are not counted).
    pub acquired: u64,
    pub released: u64,
}

#[derive(Clone)]
pub struct MasterLock {
    inner: Arc<Inner>,
}

struct Inner {
    id: u64,
    mutex: Arc<Mutex<()>>,
    acquired: AtomicU64,
    released: AtomicU64,
}

/// Scoped ownership of the mutex. Dropping it is the single release point.
struct Held {
    inner: Arc<Inner>,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for Held {
    fn drop(&mut self) {
        self.inner.released.fetch_add(1, Ordering::SeqCst);
        trace!("Library lock {} released", self.inner.id);
    }
}

impl MasterLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
                mutex: Arc::new(Mutex::new(())),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
            }),
        }
    }

    pub fn is_held_by_current_task(&self) -> bool {
        HELD.try_with(|held| held.contains(&self.inner.id))
            .unwrap_or(false)
    }

    async fn run<F>(&self, work: F) -> F::Output
    where
        F: Future,
    {
        if self.is_held_by_current_task() {
            trace!("Library lock {} re-entered", self.inner.id);
            return work.await;
        }

        let guard = self.inner.mutex.clone().lock_owned().await;
        self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        trace!("Library lock {} acquired", self.inner.id);
        let _held = Held {
            inner: self.inner.clone(),
            _guard: guard,
        };

        let mut held = HELD.try_with(|held| held.clone()).unwrap_or_default();
        held.push(self.inner.id);
        HELD.scope(held, work).await
    }

    pub fn stats(&self) -> LockStats {
        LockStats {
            acquired: self.inner.acquired.load(Ordering::SeqCst),
            released: self.inner.released.load(Ordering::SeqCst),
        }
    }
}

impl Default for MasterLock {
    fn default() -> Self {
        Self::new()
    }
}
