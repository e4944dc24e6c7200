//! Fixed-size background worker pool.
//!
//! When the run is configured with background threads, the local
//! directory backend hands buffer spills to this pool instead of
//! writing inline. Epoch flush and finish wait for the queue to drain
//! so sealing an epoch still implies its data reached the logs.

use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool of worker threads executing queued jobs in submission order
/// per worker.
pub struct WorkerPool {
    sender: Option<mpsc::Sender<Job>>,
    workers: Vec<thread::JoinHandle<()>>,
    pending: Arc<(Mutex<usize>, Condvar)>,
}

impl WorkerPool {
    /// Spawn a pool of `size` worker threads. `size` must be > 0; the
    /// driver only constructs a pool when background threading is
    /// requested.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool requires at least one thread");

        let (sender, receiver) = mpsc::channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new((Mutex::new(0usize), Condvar::new()));

        let workers = (0..size)
            .map(|_| {
                let receiver = Arc::clone(&receiver);
                thread::spawn(move || loop {
                    let job = match receiver.lock().unwrap().recv() {
                        Ok(job) => job,
                        Err(_) => break,
                    };
                    job();
                })
            })
            .collect();

        tracing::debug!(size, "background worker pool started");

        Self {
            sender: Some(sender),
            workers,
            pending,
        }
    }

    /// Number of worker threads.
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job for execution on some worker.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let (lock, _) = &*self.pending;
        *lock.lock().unwrap() += 1;

        let pending = Arc::clone(&self.pending);
        let wrapped = Box::new(move || {
            job();
            let (lock, cvar) = &*pending;
            *lock.lock().unwrap() -= 1;
            cvar.notify_all();
        });

        // The receiver outlives every sender while workers run.
        self.sender
            .as_ref()
            .expect("pool already shut down")
            .send(wrapped)
            .expect("worker threads exited early");
    }

    /// Block until every queued job has completed.
    pub fn wait_idle(&self) {
        let (lock, cvar) = &*self.pending;
        let mut pending = lock.lock().unwrap();
        while *pending > 0 {
            pending = cvar.wait(pending).unwrap();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker drain and exit.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn executes_all_jobs() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);

        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            pool.execute(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        pool.wait_idle();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn wait_idle_on_empty_pool_returns() {
        let pool = WorkerPool::new(1);
        pool.wait_idle();
    }

    #[test]
    fn drop_joins_workers() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            for _ in 0..10 {
                let counter = counter.clone();
                pool.execute(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            }
        }
        // Drop drained the queue before joining.
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
