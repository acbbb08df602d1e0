//! The event-bus seam.
//!
//! `EventBus` is what producers and consumers compose over; `MemoryBus` is
//! the in-process implementation with one bounded queue per subscriber.
//! Delivery is at-least-once: a consumer that cannot handle a payload puts
//! it back on its own queue.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{mpsc, RwLock};

use crate::errors::ApsisError;

const SUBSCRIBER_QUEUE_DEPTH: usize = 1024;

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ApsisError>;
    async fn subscribe(&self, topic: &str) -> Subscription;
}

pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
    requeue_tx: mpsc::Sender<Vec<u8>>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Puts an unhandled payload back for redelivery (not committing, in
    /// stream terms).
    pub async fn requeue(&self, payload: Vec<u8>) {
        let _ = self.requeue_tx.send(payload).await;
    }
}

#[derive(Default)]
pub struct MemoryBus {
    topics: RwLock<HashMap<String, Vec<mpsc::Sender<Vec<u8>>>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventBus for MemoryBus {
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), ApsisError> {
        let mut topics = self.topics.write().await;
        let Some(senders) = topics.get_mut(topic) else {
            // No subscribers yet; the event is dropped like an unmatched
            // topic on a broker with no consumer groups.
            return Ok(());
        };
        senders.retain(|tx| !tx.is_closed());
        for tx in senders.iter() {
            tx.send(payload.to_vec())
                .await
                .map_err(|_| ApsisError::Events(format!("subscriber of {topic} went away")))?;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        self.topics
            .write()
            .await
            .entry(topic.to_string())
            .or_default()
            .push(tx.clone());
        Subscription { rx, requeue_tx: tx }
    }
}
