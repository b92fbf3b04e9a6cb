//! Bounded event queues and their workers.
//!
//! A queue owns one bounded FIFO buffer per worker. Jobs are routed to a
//! buffer by hashing the subject key, so every event for one subject lands
//! on the same worker and is processed in posting order. A worker hands each
//! event to the blocking pool and waits for it before taking the next one.

use crate::error::RuntimeError;
use crate::machine::Machine;
use fsmkit_core::Event;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// An event bound for one subject.
pub(crate) struct Job {
    pub(crate) machine: Arc<Machine>,
    pub(crate) event: Event,
}

/// A bounded buffer serviced by one or more background workers.
pub struct EventQueue {
    label: String,
    capacity: usize,
    senders: Vec<mpsc::Sender<Job>>,
    accepting: AtomicBool,
    stop: watch::Sender<bool>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl EventQueue {
    /// Starts a queue with `workers` workers, each with a buffer of `capacity` events.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        label: impl Into<String>,
        capacity: usize,
        workers: usize,
    ) -> Result<Arc<Self>, RuntimeError> {
        let handle =
            tokio::runtime::Handle::try_current().map_err(|_| RuntimeError::NoAsyncRuntime)?;

        let label = label.into();
        let capacity = capacity.max(1);
        let (stop, _) = watch::channel(false);

        let mut senders = Vec::with_capacity(workers.max(1));
        let mut handles = Vec::with_capacity(workers.max(1));
        for index in 0..workers.max(1) {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            handles.push(handle.spawn(run_worker(
                label.clone(),
                index,
                rx,
                stop.subscribe(),
            )));
        }

        tracing::info!(
            "{}: queue started (capacity={}, workers={})",
            label,
            capacity,
            handles.len()
        );

        Ok(Arc::new(Self {
            label,
            capacity,
            senders,
            accepting: AtomicBool::new(true),
            stop,
            workers: parking_lot::Mutex::new(handles),
        }))
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Events currently buffered across all workers.
    pub fn len(&self) -> usize {
        self.senders
            .iter()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Appends a job, waiting while its buffer is full.
    pub(crate) async fn push(&self, job: Job) -> Result<(), RuntimeError> {
        let key = job.machine.key().to_string();
        self.sender_for(&key)?
            .send(job)
            .await
            .map_err(|_| RuntimeError::NotAccepting(key))
    }

    /// Appends a job, failing with `QueueFull` instead of waiting.
    pub(crate) fn try_push(&self, job: Job) -> Result<(), RuntimeError> {
        let key = job.machine.key().to_string();
        self.sender_for(&key)?.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => RuntimeError::QueueFull(key),
            mpsc::error::TrySendError::Closed(_) => RuntimeError::NotAccepting(key),
        })
    }

    /// Appends a job, blocking the current thread while its buffer is full.
    ///
    /// Panics if called from an async context, like `Sender::blocking_send`.
    pub(crate) fn push_blocking(&self, job: Job) -> Result<(), RuntimeError> {
        let key = job.machine.key().to_string();
        self.sender_for(&key)?
            .blocking_send(job)
            .map_err(|_| RuntimeError::NotAccepting(key))
    }

    /// Stops accepting events and tells workers to exit after their current event.
    ///
    /// Buffered events that have not started are dropped.
    pub fn shutdown(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            tracing::debug!("{}: queue stopping", self.label);
        }
        self.stop.send_replace(true);
    }

    /// Waits for all workers to exit.
    pub async fn join(&self) {
        let handles = std::mem::take(&mut *self.workers.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("{}: worker failed: {}", self.label, e);
            }
        }
    }

    fn sender_for(&self, key: &str) -> Result<&mpsc::Sender<Job>, RuntimeError> {
        if !self.is_accepting() {
            return Err(RuntimeError::NotAccepting(key.to_string()));
        }
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.senders.len() as u64) as usize;
        self.senders
            .get(index)
            .ok_or_else(|| RuntimeError::NotAccepting(key.to_string()))
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        self.stop.send_replace(true);
    }
}

async fn run_worker(
    label: String,
    index: usize,
    mut rx: mpsc::Receiver<Job>,
    mut stop: watch::Receiver<bool>,
) {
    tracing::debug!("{}: worker {} started", label, index);

    loop {
        if *stop.borrow() {
            break;
        }

        let job = tokio::select! {
            biased;
            _ = stop.changed() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let Job { machine, event } = job;
        let key = machine.key().to_string();
        if let Err(e) = tokio::task::spawn_blocking(move || machine.process(&event)).await {
            tracing::error!("{}: event processing failed: {}", key, e);
        }
    }

    tracing::debug!("{}: worker {} stopped", label, index);
}
