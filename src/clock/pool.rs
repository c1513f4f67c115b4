//! Bounded worker pool for forked clock bodies.
//!
//! Only the master clock owns one (spec.md §4.4); children submit through
//! `Clock::master`. A non-blocking permit acquisition guards submission:
//! if a permit is free, the task runs on a pooled thread and the permit is
//! released on completion; otherwise we warn and spawn a detached thread
//! anyway, since correctness (the note still gets played) matters more
//! than honoring the pool bound.

use std::sync::{Arc, Mutex};
use std::thread;

struct Inner {
    permits: Mutex<usize>,
    capacity: usize,
}

/// A fixed-size pool of OS threads guarded by a counting semaphore.
///
/// `WorkerPool` is cheaply `Clone`: clones share the same permit counter
/// and just hand out more handles to submit work through.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

impl WorkerPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                permits: Mutex::new(capacity),
                capacity,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    fn try_acquire(&self) -> bool {
        let mut permits = self.inner.permits.lock().unwrap();
        if *permits > 0 {
            *permits -= 1;
            true
        } else {
            false
        }
    }

    fn release(&self) {
        let mut permits = self.inner.permits.lock().unwrap();
        *permits += 1;
    }

    /// Run `task` on a pooled thread if a permit is available, otherwise
    /// spawn a detached thread and log a warning (spec.md §7: pool
    /// exhaustion is a soft failure, not an error).
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if self.try_acquire() {
            let pool = self.clone();
            thread::spawn(move || {
                // Release the permit even if `task` unwinds (a forked
                // clock body resumes its panic after its own cleanup),
                // otherwise a single panicking task would leak a permit
                // forever.
                struct ReleaseOnDrop(WorkerPool);
                impl Drop for ReleaseOnDrop {
                    fn drop(&mut self) {
                        self.0.release();
                    }
                }
                let _release = ReleaseOnDrop(pool);
                task();
            });
        } else {
            log::warn!(
                "worker pool exhausted (capacity {}); spawning a detached thread. \
                 Increase pool_size to avoid this.",
                self.capacity()
            );
            thread::spawn(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[test]
    fn runs_tasks_up_to_capacity_concurrently() {
        let pool = WorkerPool::new(4);
        let barrier = Arc::new(Barrier::new(4));
        let completed = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let barrier = barrier.clone();
            let completed = completed.clone();
            pool.submit(move || {
                barrier.wait();
                completed.fetch_add(1, Ordering::SeqCst);
            });
        }
        thread::sleep(Duration::from_millis(100));
        assert_eq!(completed.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn overflow_falls_back_to_detached_thread() {
        let pool = WorkerPool::new(0);
        let completed = Arc::new(AtomicUsize::new(0));
        let completed_clone = completed.clone();
        pool.submit(move || {
            completed_clone.fetch_add(1, Ordering::SeqCst);
        });
        thread::sleep(Duration::from_millis(50));
        assert_eq!(completed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn released_permits_are_reusable() {
        let pool = WorkerPool::new(1);
        for _ in 0..3 {
            let (tx, rx) = std::sync::mpsc::channel();
            pool.submit(move || {
                tx.send(()).unwrap();
            });
            rx.recv_timeout(Duration::from_millis(500)).unwrap();
            // Give the spawned thread a moment to release its permit.
            thread::sleep(Duration::from_millis(10));
        }
    }
}
