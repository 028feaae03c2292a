/**
 * In-memory Backplane
 *
 * Built on `tokio::sync::broadcast`, a multi-producer, multi-consumer
 * channel. Every subscriber receives a copy of each envelope.
 *
 * Nothing leaves the process. Cloning the adapter shares the channel, which
 * lets several servers inside one process behave like separate nodes.
 */

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::{BackplaneAdapter, BackplanePublisher, BackplaneSubscriber};
use crate::backend::error::BackendError;
use crate::shared::{AdapterKind, Envelope};

/// Envelopes buffered per subscriber before it starts lagging
pub const MEMORY_CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct MemoryBackplane {
    tx: broadcast::Sender<Envelope>,
}

impl MemoryBackplane {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(MEMORY_CHANNEL_CAPACITY);
        Self { tx }
    }
}

impl Default for MemoryBackplane {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackplaneAdapter for MemoryBackplane {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Memory
    }

    async fn open_publisher(&self) -> Result<Arc<dyn BackplanePublisher>, BackendError> {
        Ok(Arc::new(MemoryPublisher {
            tx: self.tx.clone(),
        }))
    }

    async fn open_subscriber(&self) -> Result<Box<dyn BackplaneSubscriber>, BackendError> {
        Ok(Box::new(MemorySubscriber {
            rx: self.tx.subscribe(),
        }))
    }
}

struct MemoryPublisher {
    tx: broadcast::Sender<Envelope>,
}

#[async_trait]
impl BackplanePublisher for MemoryPublisher {
    async fn publish(&self, envelope: &Envelope) -> Result<(), BackendError> {
        match self.tx.send(envelope.clone()) {
            Ok(count) => tracing::trace!("[Backplane] Envelope sent to {} subscribers", count),
            // No subscribers, that's okay
            Err(_) => tracing::trace!("[Backplane] No subscribers for envelope"),
        }
        Ok(())
    }
}

struct MemorySubscriber {
    rx: broadcast::Receiver<Envelope>,
}

#[async_trait]
impl BackplaneSubscriber for MemorySubscriber {
    async fn next(&mut self) -> Result<Option<Envelope>, BackendError> {
        loop {
            match self.rx.recv().await {
                Ok(envelope) => return Ok(Some(envelope)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("[Backplane] Memory subscriber lagged, skipped {} envelopes", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}
