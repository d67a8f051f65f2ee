//! Fixed-size outlet pool.
//!
//! `capacity` outlet workers share one unbounded FIFO queue. Outlets bound how
//! many brews run at once; they never refuse work while the pool is open.
//! Shutdown closes the queue, lets the workers drain it until the grace
//! deadline, then cancels whatever is still brewing or queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::task::{BrewOutcome, BrewTask, OutletId};
use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("outlets are shut down, cannot brew {beverage}")]
    Closed { beverage: String },
}

/// How `shutdown` ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShutdownOutcome {
    /// Every queued and in-flight brew finished before the deadline.
    Drained,
    /// The deadline passed; these brews were signalled to stop.
    Abandoned { queued: usize, brewing: usize },
}

impl ShutdownOutcome {
    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Drained)
    }
}

/// Point-in-time outlet counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutletStats {
    pub capacity: usize,
    pub queued: usize,
    pub brewing: usize,
    pub brewed: usize,
    pub abandoned: usize,
}

#[derive(Debug, Default)]
struct Counters {
    queued: AtomicUsize,
    brewing: AtomicUsize,
    brewed: AtomicUsize,
    abandoned: AtomicUsize,
}

type Queue = Arc<Mutex<mpsc::UnboundedReceiver<BrewTask>>>;

enum Workers {
    Running(Vec<JoinHandle<()>>),
    Stopped(ShutdownOutcome),
}

pub struct OutletPool {
    queue_tx: StdMutex<Option<mpsc::UnboundedSender<BrewTask>>>,
    workers: Mutex<Workers>,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    capacity: usize,
}

impl OutletPool {
    /// Spawn `capacity` outlet workers on the current tokio runtime.
    pub fn new(capacity: usize, brew_duration: Duration) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::InvalidOutlets(0));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let queue: Queue = Arc::new(Mutex::new(rx));
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());

        let workers = (0..capacity)
            .map(|i| {
                runtime.spawn(run_outlet(
                    OutletId::new(i),
                    Arc::clone(&queue),
                    cancel.clone(),
                    Arc::clone(&counters),
                    brew_duration,
                ))
            })
            .collect();

        tracing::debug!(capacity, ?brew_duration, "Outlet pool started");

        Ok(Self {
            queue_tx: StdMutex::new(Some(tx)),
            workers: Mutex::new(Workers::Running(workers)),
            cancel,
            counters,
            capacity,
        })
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<BrewTask>>> {
        self.queue_tx.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Outlet queue mutex poisoned - recovering");
            poisoned.into_inner()
        })
    }

    /// Queue a brew. Only fails once shutdown has begun.
    pub fn submit(&self, task: BrewTask) -> Result<(), SubmitError> {
        let sender = self.sender();
        let Some(tx) = sender.as_ref() else {
            return Err(SubmitError::Closed {
                beverage: task.beverage().to_string(),
            });
        };

        // Count before sending so a fast worker never decrements first.
        self.counters.queued.fetch_add(1, Ordering::AcqRel);
        tx.send(task).map_err(|e| {
            self.counters.queued.fetch_sub(1, Ordering::AcqRel);
            SubmitError::Closed {
                beverage: e.0.beverage().to_string(),
            }
        })
    }

    pub fn is_closed(&self) -> bool {
        self.sender().is_none()
    }

    /// Stop accepting brews and wait up to `grace` for the queue to drain.
    ///
    /// Brews still running at the deadline are signalled to stop and their
    /// workers are detached. Concurrent and later callers wait for the first
    /// call to finish and get its outcome.
    pub async fn shutdown(&self, grace: Duration) -> ShutdownOutcome {
        // Dropping the only sender lets workers see the end of the queue.
        drop(self.sender().take());

        // Held across the drain so no caller can report `Drained` early.
        let mut workers = self.workers.lock().await;
        let handles = match &mut *workers {
            Workers::Stopped(outcome) => return *outcome,
            Workers::Running(handles) => std::mem::take(handles),
        };

        let outcome = self.drain(handles, grace).await;
        *workers = Workers::Stopped(outcome);
        outcome
    }

    async fn drain(&self, handles: Vec<JoinHandle<()>>, grace: Duration) -> ShutdownOutcome {
        match tokio::time::timeout(grace, futures::future::join_all(handles)).await {
            Ok(results) => {
                for err in results.into_iter().filter_map(Result::err) {
                    tracing::warn!(error = %err, "Outlet worker ended abnormally");
                }
                tracing::info!("Outlets drained");
                ShutdownOutcome::Drained
            }
            Err(_) => {
                let outcome = ShutdownOutcome::Abandoned {
                    queued: self.counters.queued.load(Ordering::Acquire),
                    brewing: self.counters.brewing.load(Ordering::Acquire),
                };
                tracing::warn!(?grace, ?outcome, "Outlets did not drain before deadline, abandoning brews");
                self.cancel.cancel();
                outcome
            }
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> OutletStats {
        OutletStats {
            capacity: self.capacity,
            queued: self.counters.queued.load(Ordering::Acquire),
            brewing: self.counters.brewing.load(Ordering::Acquire),
            brewed: self.counters.brewed.load(Ordering::Acquire),
            abandoned: self.counters.abandoned.load(Ordering::Acquire),
        }
    }
}

impl Drop for OutletPool {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_outlet(
    outlet: OutletId,
    queue: Queue,
    cancel: CancellationToken,
    counters: Arc<Counters>,
    brew_duration: Duration,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            task = async { queue.lock().await.recv().await } => task,
        };
        let Some(task) = next else {
            break;
        };

        counters.brewing.fetch_add(1, Ordering::AcqRel);
        counters.queued.fetch_sub(1, Ordering::AcqRel);

        let outcome = task.brew(outlet, brew_duration, &cancel).await;

        match outcome {
            BrewOutcome::Brewed => counters.brewed.fetch_add(1, Ordering::AcqRel),
            BrewOutcome::Abandoned => counters.abandoned.fetch_add(1, Ordering::AcqRel),
        };
        counters.brewing.fetch_sub(1, Ordering::AcqRel);
    }

    if cancel.is_cancelled() {
        // Whatever is left in the queue will never be brewed.
        let stranded = counters.queued.swap(0, Ordering::AcqRel);
        counters.abandoned.fetch_add(stranded, Ordering::AcqRel);
    }
    tracing::debug!(%outlet, "Outlet stopped");
}
