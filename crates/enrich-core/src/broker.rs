//! Broker interface (§6): the contract the pipeline core expects from a
//! message broker client. The core only ever sees these traits — concrete
//! adapters (a real client, or the in-memory fake in [`crate::testing`])
//! live outside this module.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    #[error("poll failed: {0}")]
    Poll(String),
    #[error("publish failed: {0}")]
    Publish(String),
}

/// An inbound record drawn from the broker.
///
/// `error` models a broker-reported error carried *on* an otherwise
/// successfully polled record (distinct from a transport-level `poll`
/// failure, which surfaces as `Err(BrokerError)`).
#[derive(Debug, Clone)]
pub struct Record {
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
    pub offset: i64,
    pub error: Option<String>,
}

impl Record {
    pub fn ok(key: Option<Vec<u8>>, value: Vec<u8>, offset: i64) -> Self {
        Record {
            key,
            value,
            offset,
            error: None,
        }
    }

    pub fn errored(offset: i64, error: impl Into<String>) -> Self {
        Record {
            key: None,
            value: Vec::new(),
            offset,
            error: Some(error.into()),
        }
    }
}

/// The consumer side of the broker contract. One instance is owned by the
/// [`crate::consumer::Consumer`] worker.
#[async_trait]
pub trait BrokerConsumer: Send {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError>;

    /// Poll for one record, bounded by `timeout`. `Ok(None)` means the poll
    /// timed out with nothing available.
    async fn poll(&mut self, timeout: Duration) -> Result<Option<Record>, BrokerError>;

    /// Unsubscribe and commit any pending offsets, per adapter default.
    async fn close(&mut self);
}

/// The producer side of the broker contract, shared by the
/// [`crate::forwarder::Forwarder`] and
/// [`crate::enriched_forwarder::EnrichedForwarder`] workers.
#[async_trait]
pub trait BrokerProducer: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    ) -> Result<(), BrokerError>;

    /// Advance the producer's internal buffer; non-blocking (zero timeout).
    async fn progress(&self);

    /// Flush any buffered sends.
    async fn close(&self);
}
