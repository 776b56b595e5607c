//! In-process fan-out of canonical events.
//!
//! Each consumer group owns one bounded queue. Publishing waits for room in
//! every queue, so a stalled consumer slows ingestion instead of losing events.
//! Workers of a group share the group's queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::models::event::CanonicalEvent;

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Receiving side of one consumer group's queue. Clones share the queue.
#[derive(Clone)]
pub struct EventQueue {
    consumer_id: String,
    rx: Arc<Mutex<mpsc::Receiver<Arc<CanonicalEvent>>>>,
}

impl EventQueue {
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Next event in publish order, or `None` once the queue is closed and empty.
    pub async fn recv(&self) -> Option<Arc<CanonicalEvent>> {
        self.rx.lock().await.recv().await
    }
}

struct Subscriber {
    tx: mpsc::Sender<Arc<CanonicalEvent>>,
    queue: EventQueue,
}

pub struct EventBus {
    capacity: usize,
    subscribers: RwLock<HashMap<String, Subscriber>>,
    closed: AtomicBool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the queue registered under `consumer_id`, creating it on first use.
    pub async fn subscribe(&self, consumer_id: &str) -> EventQueue {
        if let Some(sub) = self.subscribers.read().await.get(consumer_id) {
            return sub.queue.clone();
        }

        let mut subs = self.subscribers.write().await;
        if let Some(sub) = subs.get(consumer_id) {
            return sub.queue.clone();
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        let queue = EventQueue {
            consumer_id: consumer_id.to_string(),
            rx: Arc::new(Mutex::new(rx)),
        };
        if self.closed.load(Ordering::SeqCst) {
            // Sender dropped here: the queue reads as closed immediately.
            return queue;
        }
        subs.insert(
            consumer_id.to_string(),
            Subscriber {
                tx,
                queue: queue.clone(),
            },
        );
        info!(consumer_id, "event bus subscriber registered");
        queue
    }

    /// Delivers every event to every registered queue, waiting while a queue is full.
    pub async fn publish(&self, events: Vec<CanonicalEvent>) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            warn!(count = events.len(), "publish rejected, event bus is shut down");
            return Err(Error::Internal("event bus is shut down".to_string()));
        }

        let targets: Vec<(String, mpsc::Sender<Arc<CanonicalEvent>>)> = self
            .subscribers
            .read()
            .await
            .iter()
            .map(|(id, sub)| (id.clone(), sub.tx.clone()))
            .collect();

        for event in events {
            let event = Arc::new(event);
            for (consumer_id, tx) in &targets {
                if tx.send(Arc::clone(&event)).await.is_err() {
                    warn!(consumer_id = %consumer_id, event_id = %event.id, "subscriber queue closed, event dropped");
                }
            }
            debug!(event_id = %event.id, subscribers = targets.len(), "event published");
        }
        Ok(())
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Closes every queue. Already queued events stay readable until drained.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let dropped = {
            let mut subs = self.subscribers.write().await;
            let n = subs.len();
            subs.clear();
            n
        };
        info!(queues = dropped, "event bus shut down");
    }
}

/// A consumer of canonical events.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, event: &CanonicalEvent);
}

/// Fixed-size worker pools reading from consumer-group queues.
pub struct ListenerPool {
    handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Default for ListenerPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerPool {
    pub fn new() -> Self {
        Self {
            handles: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Starts `workers` tasks that pull from the `consumer_id` queue and hand
    /// each event to `handler`.
    pub async fn spawn_group(
        &mut self,
        bus: &EventBus,
        consumer_id: &str,
        workers: usize,
        handler: Arc<dyn EventHandler>,
    ) {
        let queue = bus.subscribe(consumer_id).await;
        for worker in 0..workers.max(1) {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let cancel = self.cancel.clone();
            self.handles.push(tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        event = queue.recv() => event,
                    };
                    let Some(event) = next else { break };
                    handler.handle(&event).await;
                }
                debug!(consumer_id = %queue.consumer_id(), worker, "listener stopped");
            }));
        }
        info!(consumer_id, workers, "listener group started");
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Drains and stops every worker: closes the bus, waits up to `grace` for
    /// the queues to empty, then cancels whatever is still running.
    pub async fn shutdown(self, bus: &EventBus, grace: Duration) {
        bus.shutdown().await;
        let cancel = self.cancel.clone();
        let mut handles = self.handles;

        let drained = tokio::time::timeout(grace, async {
            for handle in handles.iter_mut() {
                let _ = handle.await;
            }
        })
        .await;

        if drained.is_err() {
            warn!("listener drain timed out, cancelling workers");
            cancel.cancel();
            for handle in handles {
                if !handle.is_finished() {
                    let _ = handle.await;
                }
            }
        }
        info!("listeners stopped");
    }
}
