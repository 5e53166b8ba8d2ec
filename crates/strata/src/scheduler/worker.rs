//! # Async Worker Pool
//!
//! A fixed set of named threads draining one `crossbeam-channel` queue.
//! Used for tasks explicitly scheduled as async; they never take part in
//! the tick stages and must not touch live world state.
//!
//! ```text
//!  submit(job) ──> [ unbounded channel ] ──> strata-worker-0
//!                                       ├──> strata-worker-1
//!                                       └──> ...
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;

use crate::error::EngineResult;

/// A unit of async work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Bounded pool of worker threads.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    size: usize,
}

impl WorkerPool {
    /// Spawns `threads` workers named `{name}-{i}`.
    ///
    /// # Errors
    ///
    /// [`EngineError::Io`](crate::EngineError::Io) if a thread cannot be spawned.
    pub fn new(name: &str, threads: usize) -> EngineResult<Self> {
        let (sender, receiver) = unbounded::<Job>();
        let active = Arc::new(AtomicUsize::new(0));

        let workers = (0..threads)
            .map(|i| {
                let receiver = receiver.clone();
                let active = Arc::clone(&active);
                thread::Builder::new()
                    .name(format!("{name}-{i}"))
                    .spawn(move || Self::worker_loop(&receiver, &active))
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!("worker pool {} started with {} threads", name, threads);
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            active,
            size: threads,
        })
    }

    /// Runs jobs until the channel is closed and drained.
    fn worker_loop(receiver: &Receiver<Job>, active: &AtomicUsize) {
        while let Ok(job) = receiver.recv() {
            active.fetch_add(1, Ordering::AcqRel);
            if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                tracing::error!("async task panicked");
            }
            active.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Queues a job. Returns false once the pool is shut down.
    pub fn submit(&self, job: Job) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(job).is_ok(),
            None => false,
        }
    }

    /// Number of jobs executing right now.
    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Number of threads in the pool.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Stops accepting jobs, lets queued jobs finish, then joins every worker.
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        // Dropping the sender disconnects the channel once it drains
        drop(self.sender.lock().take());
        let workers = std::mem::take(&mut *self.workers.lock());
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("worker thread panicked outside a task");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
