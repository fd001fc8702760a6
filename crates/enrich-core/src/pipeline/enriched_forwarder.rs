//! `EnrichedForwarder` worker (§4.4): drains `enriched_q` and publishes each
//! augmented envelope keyed by sensor id.

use crate::broker::BrokerProducer;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

pub struct EnrichedForwarder {
    enriched_rx: mpsc::Receiver<Value>,
    producer: Arc<dyn BrokerProducer>,
    producer_topic: String,
}

impl EnrichedForwarder {
    pub fn new(
        enriched_rx: mpsc::Receiver<Value>,
        producer: Arc<dyn BrokerProducer>,
        producer_topic: String,
    ) -> Self {
        EnrichedForwarder {
            enriched_rx,
            producer,
            producer_topic,
        }
    }

    pub async fn run(mut self) {
        while let Some(envelope) = self.enriched_rx.recv().await {
            let Some(sensor_id) = envelope
                .get("sensor")
                .and_then(|s| s.get("id"))
                .and_then(Value::as_str)
            else {
                error!("dropping enriched record: missing sensor.id");
                continue;
            };
            let key = sensor_id.as_bytes().to_vec();
            let value = match serde_json::to_vec(&envelope) {
                Ok(value) => value,
                Err(e) => {
                    error!(error = %e, "failed to serialize enriched record");
                    continue;
                }
            };
            if let Err(e) = self
                .producer
                .publish(&self.producer_topic, value, Some(key))
                .await
            {
                error!(error = %e, "failed to publish enriched record");
            }
            self.producer.progress().await;
        }
    }
}
