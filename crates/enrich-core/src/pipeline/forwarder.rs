//! Forwarder worker (§4.2): drains `forward_q` and republishes records
//! unchanged.
//!
//! Exits once `forward_q`'s sender (owned by the [`super::consumer::Consumer`])
//! is dropped and the queue has fully drained — no separate cancellation
//! check is needed here, since that is exactly the drain behaviour §4.5
//! asks for.

use crate::broker::{BrokerProducer, Record};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

pub struct Forwarder {
    forward_rx: mpsc::Receiver<Record>,
    producer: Arc<dyn BrokerProducer>,
    producer_topic: String,
}

impl Forwarder {
    pub fn new(
        forward_rx: mpsc::Receiver<Record>,
        producer: Arc<dyn BrokerProducer>,
        producer_topic: String,
    ) -> Self {
        Forwarder {
            forward_rx,
            producer,
            producer_topic,
        }
    }

    pub async fn run(mut self) {
        while let Some(record) = self.forward_rx.recv().await {
            if let Err(e) = self
                .producer
                .publish(&self.producer_topic, record.value, record.key)
                .await
            {
                // Forwarded records include low-value heartbeats; upstream
                // will re-emit, so a failed publish is logged and dropped.
                error!(error = %e, "failed to forward record");
            }
            self.producer.progress().await;
        }
    }
}
