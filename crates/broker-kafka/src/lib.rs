//! Kafka adapter for the `enrich-core` broker traits (§6), built on
//! `rdkafka`. Kept in its own crate so `enrich-core`'s own build and test
//! suite never need to link against the native `librdkafka`.

use async_trait::async_trait;
use enrich_core::broker::{BrokerConsumer, BrokerError, BrokerProducer, Record};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer as _, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use std::collections::HashMap;
use std::time::Duration;
use tracing::warn;

/// Builds a [`StreamConsumer`]/[`FutureProducer`] pair from the raw
/// `consumer_config`/`producer_config` tables in `PipelineConfig`, so
/// adapter-specific settings (`group.id`, `bootstrap.servers`, ...) stay
/// out of `enrich-core`.
pub fn client_config(settings: &HashMap<String, String>) -> ClientConfig {
    let mut config = ClientConfig::new();
    for (key, value) in settings {
        config.set(key, value);
    }
    config
}

pub struct KafkaConsumer {
    inner: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(settings: &HashMap<String, String>) -> Result<Self, BrokerError> {
        let inner = client_config(settings)
            .create()
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;
        Ok(KafkaConsumer { inner })
    }
}

#[async_trait]
impl BrokerConsumer for KafkaConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        self.inner
            .subscribe(&topic_refs)
            .map_err(|e| BrokerError::Subscribe(e.to_string()))
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Option<Record>, BrokerError> {
        let result = tokio::time::timeout(timeout, self.inner.recv()).await;
        let message = match result {
            Err(_) => return Ok(None), // our own timeout elapsed first
            // PartitionEOF is a per-partition condition `recv` reports for an
            // otherwise-absent record, not a transport failure — surface it
            // as a broker-reported error on the record rather than failing
            // the poll outright.
            Ok(Err(KafkaError::PartitionEOF(partition))) => {
                return Ok(Some(Record::errored(
                    -1,
                    format!("partition EOF: {partition}"),
                )));
            }
            Ok(Err(e)) => return Err(BrokerError::Poll(e.to_string())),
            Ok(Ok(message)) => message,
        };

        let key = message.key().map(<[u8]>::to_vec);
        let value = message.payload().unwrap_or(&[]).to_vec();
        Ok(Some(Record::ok(key, value, message.offset())))
    }

    async fn close(&mut self) {}
}

pub struct KafkaProducer {
    inner: FutureProducer,
}

impl KafkaProducer {
    pub fn new(settings: &HashMap<String, String>) -> Result<Self, BrokerError> {
        let inner = client_config(settings)
            .create()
            .map_err(|e| BrokerError::Publish(e.to_string()))?;
        Ok(KafkaProducer { inner })
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn publish(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    ) -> Result<(), BrokerError> {
        let mut record = FutureRecord::to(topic).payload(&value);
        if let Some(key) = key.as_deref() {
            record = record.key(key);
        }
        self.inner
            .send(record, Timeout::Never)
            .await
            .map_err(|(e, _)| BrokerError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn progress(&self) {
        // FutureProducer runs its own polling thread internally; nothing
        // for callers to drive here.
    }

    async fn close(&self) {
        if let Err(e) = self.inner.flush(Duration::from_secs(30)) {
            warn!(error = %e, "failed to flush producer on close");
        }
    }
}
