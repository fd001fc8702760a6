//! In-memory fakes for the broker and image-client traits, used by the
//! pipeline's own test suite and available to adapter crates that want to
//! unit-test wiring without a live broker or HTTP server.

use crate::broker::{BrokerConsumer, BrokerError, BrokerProducer, Record};
use crate::image_client::{FetchError, ImageClient, ImageRequest, ImageResponse};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// Feeds a fixed sequence of [`Record`]s to a [`crate::pipeline::consumer::Consumer`],
/// one per `poll`, then reports `Ok(None)` forever.
pub struct FakeBrokerConsumer {
    records: Mutex<VecDeque<Record>>,
    subscribed: Mutex<Vec<String>>,
}

impl FakeBrokerConsumer {
    pub fn new(records: Vec<Record>) -> Self {
        FakeBrokerConsumer {
            records: Mutex::new(records.into()),
            subscribed: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribed_topics(&self) -> Vec<String> {
        self.subscribed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrokerConsumer for FakeBrokerConsumer {
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), BrokerError> {
        self.subscribed.lock().unwrap().extend_from_slice(topics);
        Ok(())
    }

    async fn poll(&mut self, _timeout: Duration) -> Result<Option<Record>, BrokerError> {
        let next = self.records.lock().unwrap().pop_front();
        let Some(record) = next else {
            // Real brokers block for up to `timeout` on an empty partition;
            // yielding once keeps the fake from starving the shutdown branch
            // of `tokio::select!` in a tight loop.
            tokio::task::yield_now().await;
            return Ok(None);
        };
        Ok(Some(record))
    }

    async fn close(&mut self) {}
}

/// `(topic, value, key)` for one captured publish call.
pub type PublishedRecord = (String, Vec<u8>, Option<Vec<u8>>);

/// Captures every published record in order, for assertions.
#[derive(Default)]
pub struct FakeBrokerProducer {
    published: AsyncMutex<Vec<PublishedRecord>>,
}

impl FakeBrokerProducer {
    pub fn new() -> Self {
        FakeBrokerProducer::default()
    }

    pub async fn published(&self) -> Vec<PublishedRecord> {
        self.published.lock().await.clone()
    }
}

#[async_trait]
impl BrokerProducer for FakeBrokerProducer {
    async fn publish(
        &self,
        topic: &str,
        value: Vec<u8>,
        key: Option<Vec<u8>>,
    ) -> Result<(), BrokerError> {
        self.published
            .lock()
            .await
            .push((topic.to_owned(), value, key));
        Ok(())
    }

    async fn progress(&self) {}

    async fn close(&self) {}
}

/// Image client whose response is keyed by the request id, or which fails
/// every request when constructed via [`FakeImageClient::failing`].
pub struct FakeImageClient {
    response: Result<String, FetchError>,
}

impl FakeImageClient {
    pub fn succeeding(image: impl Into<String>) -> Self {
        FakeImageClient {
            response: Ok(image.into()),
        }
    }

    pub fn failing(error: FetchError) -> Self {
        FakeImageClient {
            response: Err(error),
        }
    }
}

#[async_trait]
impl ImageClient for FakeImageClient {
    async fn fetch(&self, _request: ImageRequest) -> Result<ImageResponse, FetchError> {
        match &self.response {
            Ok(image) => Ok(ImageResponse {
                image: image.clone(),
            }),
            Err(e) => Err(clone_fetch_error(e)),
        }
    }
}

fn clone_fetch_error(e: &FetchError) -> FetchError {
    match e {
        FetchError::Request(s) => FetchError::Request(s.clone()),
        FetchError::Timeout => FetchError::Timeout,
        FetchError::ApiStatus(s) => FetchError::ApiStatus(*s),
        FetchError::MalformedBody(s) => FetchError::MalformedBody(s.clone()),
    }
}
