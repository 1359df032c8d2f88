//! Bounded executor for best-effort work that must never fail a turn.
//!
//! Tasks are submitted without waiting. A full queue drops the task with a
//! warning, and task errors are logged here instead of reaching the caller.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info, warn};

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

pub struct BackgroundJob {
    pub name: &'static str,
    task: TaskFuture,
}

impl BackgroundJob {
    pub fn new<F>(name: &'static str, task: F) -> Self
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name,
            task: Box::pin(task),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("Background queue is full")]
    Full,
    #[error("Background queue is closed")]
    Closed,
}

#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::Sender<BackgroundJob>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl BackgroundQueue {
    pub fn new(capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<BackgroundJob>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        for worker_id in 0..workers.max(1) {
            let rx = receiver.clone();
            let pending = pending.clone();
            let idle = idle.clone();
            tokio::spawn(async move {
                debug!("Background worker {} started", worker_id);
                loop {
                    let mut lock = rx.lock().await;
                    match lock.recv().await {
                        Some(job) => {
                            drop(lock);
                            let name = job.name;
                            match AssertUnwindSafe(job.task).catch_unwind().await {
                                Ok(Ok(())) => debug!(worker_id, task = name, "Background task finished"),
                                Ok(Err(e)) => warn!(worker_id, task = name, "Background task failed: {:#}", e),
                                Err(panic) => warn!(
                                    worker_id,
                                    task = name,
                                    "Background task panicked: {}",
                                    panic_message(panic.as_ref())
                                ),
                            }
                            if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                                idle.notify_waiters();
                            }
                        }
                        None => break,
                    }
                }
                info!("Background worker {} stopped", worker_id);
            });
        }

        Self {
            sender,
            pending,
            idle,
        }
    }

    /// Queues a job without waiting for room.
    pub fn submit(&self, job: BackgroundJob) -> Result<(), SubmitError> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(err) => {
                if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.idle.notify_waiters();
                }
                match err {
                    mpsc::error::TrySendError::Full(job) => {
                        warn!(task = job.name, "Background queue full, dropping task");
                        Err(SubmitError::Full)
                    }
                    mpsc::error::TrySendError::Closed(job) => {
                        warn!(task = job.name, "Background queue closed, dropping task");
                        Err(SubmitError::Closed)
                    }
                }
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Resolves once every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

impl Default for BackgroundQueue {
    fn default() -> Self {
        Self::new(64, 2)
    }
}
