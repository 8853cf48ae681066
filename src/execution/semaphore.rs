use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A small, blocking counting semaphore bounding jobs in flight.
pub(crate) struct Semaphore {
    capacity: usize,
    permits: Mutex<usize>,
    cv: Condvar,
}

/// A permit that returns itself to its [`Semaphore`] when dropped.
pub(crate) struct OwnedPermit {
    sem: Arc<Semaphore>,
}

impl Drop for OwnedPermit {
    fn drop(&mut self) {
        self.sem.release();
    }
}

impl Semaphore {
    /// `permits` must be non-zero; callers validate it first.
    pub(crate) fn new(permits: usize) -> Self {
        debug_assert!(permits > 0, "permits must be > 0");
        Self {
            capacity: permits,
            permits: Mutex::new(permits),
            cv: Condvar::new(),
        }
    }

    /// Acquire one permit, blocking until available.
    ///
    /// Returns the permit and the time spent waiting (zero if no wait was required).
    pub(crate) fn acquire_owned(self: &Arc<Self>) -> (OwnedPermit, Duration) {
        let start = Instant::now();
        let mut waited = false;
        let mut g = self.lock();
        while *g == 0 {
            waited = true;
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        *g -= 1;
        drop(g);

        let permit = OwnedPermit { sem: Arc::clone(self) };
        (permit, if waited { start.elapsed() } else { Duration::ZERO })
    }

    /// Block until every permit is back, i.e. nothing is in flight.
    pub(crate) fn wait_idle(&self) {
        let mut g = self.lock();
        while *g < self.capacity {
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn release(&self) {
        let mut g = self.lock();
        *g += 1;
        self.cv.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, usize> {
        self.permits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
