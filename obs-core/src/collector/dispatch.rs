//! Background delivery of queued events
//!
//! Each agent owns exactly one [`DispatchWorker`]. It runs on its own OS
//! thread with a current-thread tokio runtime, so capture callers never need
//! a runtime of their own:
//!
//! ```text
//! capture ──try_send──▶ [bounded queue] ──recv──▶ worker ──▶ Transport
//!                                                   ▲
//! flush ──shutdown flag─────────────────────────────┘
//!       ◀──drain-complete latch── worker (after draining)
//! ```
//!
//! The worker has two states. **Running**: wait for the next event or the
//! shutdown flag. **Draining**: close the queue, deliver whatever is still in
//! it without waiting, fire the drain-complete latch and exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::event::Event;
use crate::logging;

use super::client::Transport;

/// Name of the dispatch thread
pub const WORKER_THREAD_NAME: &str = "obs-dispatch";

/// Delivery statistics, updated concurrently by producers and the worker
#[derive(Debug, Default)]
pub struct DispatchStats {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Events the collector accepted
    pub sent: u64,
    /// Events whose delivery failed and were discarded
    pub failed: u64,
    /// Events refused at enqueue (queue full or closed)
    pub dropped: u64,
}

impl DispatchStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// One-shot latch fired by the worker once the queue is drained
///
/// Any number of threads may wait on it, each with its own timeout. Once
/// fired it stays fired.
#[derive(Debug, Default)]
pub struct DrainSignal {
    drained: Mutex<bool>,
    cond: Condvar,
}

impl DrainSignal {
    fn fire(&self) {
        let mut drained = self.drained.lock().unwrap_or_else(PoisonError::into_inner);
        *drained = true;
        self.cond.notify_all();
    }

    /// Block until fired or `timeout` elapses. Returns true if fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        let drained = self.drained.lock().unwrap_or_else(PoisonError::into_inner);
        let (drained, _) = self
            .cond
            .wait_timeout_while(drained, timeout, |drained| !*drained)
            .unwrap_or_else(PoisonError::into_inner);
        *drained
    }

    pub fn is_fired(&self) -> bool {
        *self.drained.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Producer side of the pipeline, held by the agent
#[derive(Debug)]
pub struct DispatchHandle {
    queue: mpsc::Sender<Event>,
    shutdown: watch::Sender<bool>,
    drained: Arc<DrainSignal>,
    stats: Arc<DispatchStats>,
    capacity: usize,
}

impl DispatchHandle {
    /// Non-blocking enqueue. A full or closed queue drops the event.
    ///
    /// Returns whether the event was queued; callers treat both outcomes as
    /// "accepted for reporting".
    pub fn enqueue(&self, event: Event) -> bool {
        match self.queue.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                self.stats.record_dropped();
                false
            }
        }
    }

    /// Fire the shutdown flag. Idempotent.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Fire the shutdown flag and wait up to `timeout` for the drain.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.shutdown();
        self.drained.wait(timeout)
    }

    pub fn is_drained(&self) -> bool {
        self.drained.is_fired()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Consumer side of the pipeline
pub struct DispatchWorker {
    queue: mpsc::Receiver<Event>,
    shutdown: watch::Receiver<bool>,
    drained: Arc<DrainSignal>,
    stats: Arc<DispatchStats>,
    transport: Arc<dyn Transport>,
}

/// Create the bounded queue and both signals for a new agent.
///
/// The worker is returned unstarted; call [`DispatchWorker::spawn`].
pub fn channel(capacity: usize, transport: Arc<dyn Transport>) -> (DispatchHandle, DispatchWorker) {
    let (queue_tx, queue_rx) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drained = Arc::new(DrainSignal::default());
    let stats = Arc::new(DispatchStats::default());

    let handle = DispatchHandle {
        queue: queue_tx,
        shutdown: shutdown_tx,
        drained: Arc::clone(&drained),
        stats: Arc::clone(&stats),
        capacity,
    };
    let worker = DispatchWorker {
        queue: queue_rx,
        shutdown: shutdown_rx,
        drained,
        stats,
        transport,
    };
    (handle, worker)
}

impl DispatchWorker {
    /// Start the worker on its own thread.
    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Config(format!("failed to create runtime: {}", e)))?;

        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(self.run()))?;
        Ok(handle)
    }

    /// Worker loop: run until shutdown, then drain.
    pub async fn run(mut self) {
        tracing::debug!("Dispatch worker started");

        loop {
            tokio::select! {
                event = self.queue.recv() => match event {
                    Some(event) => self.deliver(event).await,
                    // every agent handle is gone
                    None => break,
                },
                _ = stopped(&mut self.shutdown) => break,
            }
        }

        self.drain().await;
        self.drained.fire();

        let stats = self.stats.snapshot();
        tracing::debug!(
            sent = stats.sent,
            failed = stats.failed,
            dropped = stats.dropped,
            "Dispatch worker drained"
        );
    }

    async fn drain(&mut self) {
        // Refuse new events. recv() still yields events whose enqueue was
        // already in flight, and returns None once the buffer is empty.
        self.queue.close();
        while let Some(event) = self.queue.recv().await {
            self.deliver(event).await;
        }
    }

    async fn deliver(&self, event: Event) {
        match self.transport.send(&event).await {
            Ok(()) => {
                self.stats.record_sent();
                tracing::debug!(event_id = %event.event_id, "Delivered event");
            }
            Err(e) => {
                self.stats.record_failed();
                logging::diagnose(|| {
                    tracing::warn!(
                        event_id = %event.event_id,
                        error = %e,
                        "obs: failed to send event"
                    )
                });
            }
        }
    }
}

/// Resolves once the shutdown flag is set, or its sender is gone.
async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    // Err means the agent was dropped without flushing
    let _ = shutdown.wait_for(|stop| *stop).await;
}
