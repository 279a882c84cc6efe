//! Worker Pool
//!
//! A fixed set of named threads running immediate operations. Jobs beyond the
//! number of workers wait in the queue.

use std::sync::{Arc, mpsc};
use std::thread::{self, JoinHandle};

use parking_lot::Mutex;

use crate::error::{HiveError, HiveResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Default number of operation workers
pub fn default_workers() -> usize {
    thread::available_parallelism().map(|n| n.get()).unwrap_or(4).max(2)
}

pub(crate) struct WorkerPool {
    job_tx: Option<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers
    pub fn start(size: usize) -> HiveResult<Self> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let job_rx = Arc::new(Mutex::new(job_rx));

        let mut workers = Vec::with_capacity(size);
        for id in 0..size.max(1) {
            let job_rx = Arc::clone(&job_rx);
            let worker = thread::Builder::new()
                .name(format!("hive-op-worker-{}", id))
                .spawn(move || run_worker(id, job_rx))
                .map_err(|e| HiveError::Runtime(format!("Failed to spawn operation worker: {}", e)))?;
            workers.push(worker);
        }

        tracing::debug!(workers = workers.len(), "Operation worker pool started");
        Ok(Self {
            job_tx: Some(job_tx),
            workers,
        })
    }

    /// Queue a job, returns false once the workers are gone
    pub fn submit(&self, job: Job) -> bool {
        self.job_tx.as_ref().is_some_and(|tx| tx.send(job).is_ok())
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // closing the channel stops the workers once the queue is empty
        self.job_tx.take();

        let current = thread::current().id();
        for worker in self.workers.drain(..) {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("Operation worker panicked");
            }
        }
    }
}

fn run_worker(id: usize, job_rx: Arc<Mutex<mpsc::Receiver<Job>>>) {
    tracing::trace!(worker = id, "Operation worker started");
    loop {
        let job = job_rx.lock().recv();
        match job {
            Ok(job) => job(),
            Err(_) => break,
        }
    }
    tracing::trace!(worker = id, "Operation worker stopped");
}
