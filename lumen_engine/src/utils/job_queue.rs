/// Background job queue
///
/// A fixed pool of worker threads fed through a bounded multi-producer /
/// multi-consumer channel. Used by the asset manager to decode texture
/// pixels off the owning thread.
///
/// Shutdown is cooperative: one termination message per worker is queued
/// behind the pending jobs, so every job pushed before `shutdown` still runs
/// and running jobs are never interrupted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use crossbeam_channel::{bounded, Receiver, Sender};
use crate::error::{Error, Result};

type Job = Box<dyn FnOnce() + Send + 'static>;

enum Message {
    Run(Job),
    Terminate,
}

/// Count of jobs pushed but not finished yet
#[derive(Default)]
struct PendingJobs {
    count: Mutex<usize>,
    drained: Condvar,
}

impl PendingJobs {
    fn increment(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count += 1;
        }
    }

    fn decrement(&self) {
        if let Ok(mut count) = self.count.lock() {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.drained.notify_all();
            }
        }
    }
}

pub struct JobQueue {
    sender: Sender<Message>,
    workers: Vec<JoinHandle<()>>,
    pending: Arc<PendingJobs>,
}

impl JobQueue {
    /// Spawn `threads` workers (at least one) on a queue holding `capacity` jobs
    pub fn new(threads: usize, capacity: usize) -> Result<Self> {
        let (sender, receiver) = bounded::<Message>(capacity.max(1));
        let pending = Arc::new(PendingJobs::default());

        let mut workers = Vec::new();
        for index in 0..threads.max(1) {
            let receiver: Receiver<Message> = receiver.clone();
            let pending = Arc::clone(&pending);
            let handle = std::thread::Builder::new()
                .name(format!("lumen-worker-{}", index))
                .spawn(move || worker_loop(receiver, pending))
                .map_err(|e| Error::InitializationFailed(format!("Failed to spawn worker thread: {}", e)))?;
            workers.push(handle);
        }

        crate::engine_debug!("lumen::JobQueue", "Started {} worker thread(s)", workers.len());

        Ok(Self { sender, workers, pending })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job; blocks while the queue is full
    pub fn push<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.increment();
        if self.sender.send(Message::Run(Box::new(job))).is_err() {
            self.pending.decrement();
            return Err(Error::BackendError("Job queue is shut down".to_string()));
        }
        Ok(())
    }

    /// Block until every pushed job has completed
    pub fn wait_until_queue_is_empty(&self) {
        let Ok(mut count) = self.pending.count.lock() else {
            return;
        };
        while *count > 0 {
            match self.pending.drained.wait(count) {
                Ok(guard) => count = guard,
                Err(_) => return,
            }
        }
    }

    /// Let queued jobs finish, then stop and join every worker
    pub fn shutdown(&mut self) {
        for _ in 0..self.workers.len() {
            let _ = self.sender.send(Message::Terminate);
        }
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                crate::engine_error!("lumen::JobQueue", "Worker thread panicked during shutdown");
            }
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(receiver: Receiver<Message>, pending: Arc<PendingJobs>) {
    while let Ok(message) = receiver.recv() {
        match message {
            Message::Run(job) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    crate::engine_error!("lumen::JobQueue", "A background job panicked");
                }
                pending.decrement();
            }
            Message::Terminate => break,
        }
    }
}

#[cfg(test)]
#[path = "job_queue_tests.rs"]
mod tests;
