//! In-memory implementation of the EventBus trait for tests and local runs

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::bus::dlq_queue;
use crate::{ConsumeOutcome, EventBus, EventCallback, EventEnvelope, MessagingError};

/// FIFO queues held in memory, each declared together with its `.dlq` sibling.
///
/// Messages are removed when handed to a callback, which matches the
/// acknowledge-after-handling behaviour of the broker loop. Publishing to a
/// queue that was never declared drops the message, as the default exchange does.
pub struct InMemoryEventBus {
    queues: Mutex<HashMap<String, VecDeque<Vec<u8>>>>,
    notify: Notify,
    reachable: AtomicBool,
    connect_attempts: AtomicU32,
}

impl InMemoryEventBus {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            reachable: AtomicBool::new(true),
            connect_attempts: AtomicU32::new(0),
        }
    }

    /// Simulate the broker going away (or coming back).
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Number of operations that needed a broker connection.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Push a raw body, bypassing envelope encoding. Declares the queue.
    pub async fn push_raw(&self, queue: &str, body: impl Into<Vec<u8>>) {
        self.declare(queue).await;
        if let Some(q) = self.queues.lock().await.get_mut(queue) {
            q.push_back(body.into());
        }
        self.notify.notify_waiters();
    }

    /// Decoded view of the messages waiting in `queue`; undecodable bodies are skipped.
    pub async fn pending(&self, queue: &str) -> Vec<EventEnvelope> {
        self.queues
            .lock()
            .await
            .get(queue)
            .map(|q| {
                q.iter()
                    .filter_map(|body| EventEnvelope::decode(body).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn depth(&self, queue: &str) -> usize {
        self.queues.lock().await.get(queue).map_or(0, VecDeque::len)
    }

    /// Hand every message currently in `queue` to `handler`, in order.
    pub async fn drain(&self, queue: &str, handler: &dyn EventCallback) -> Vec<ConsumeOutcome> {
        let mut outcomes = Vec::new();
        while let Some(body) = self.pop(queue).await {
            outcomes.push(handler.handle(queue, &body).await);
        }
        outcomes
    }

    fn connect(&self) -> Result<(), MessagingError> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(MessagingError::Connection("in-memory broker unreachable".into()))
        }
    }

    async fn declare(&self, queue: &str) {
        let mut queues = self.queues.lock().await;
        queues.entry(queue.to_string()).or_default();
        queues.entry(dlq_queue(queue)).or_default();
    }

    async fn pop(&self, queue: &str) -> Option<Vec<u8>> {
        self.queues.lock().await.get_mut(queue)?.pop_front()
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn declare_queue(&self, queue: &str) -> Result<(), MessagingError> {
        self.connect()?;
        self.declare(queue).await;
        Ok(())
    }

    async fn publish(&self, queue: &str, envelope: &EventEnvelope) -> Result<(), MessagingError> {
        self.connect()?;
        let body = envelope.encode()?;

        match self.queues.lock().await.get_mut(queue) {
            Some(q) => q.push_back(body),
            None => {
                warn!(queue = %queue, "publish to undeclared queue dropped");
                return Ok(());
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        handler: Arc<dyn EventCallback>,
    ) -> Result<(), MessagingError> {
        self.declare_queue(queue).await?;

        loop {
            let notified = self.notify.notified();
            self.connect()?;

            if let Some(body) = self.pop(queue).await {
                let outcome = handler.handle(queue, &body).await;
                debug!(queue = %queue, outcome = outcome.label(), "in-memory delivery acked");
                continue;
            }
            notified.await;
        }
    }
}
