//! Lifecycle / supervisor (§4.5): owns the queues, spawns the four workers,
//! and drives the one-way `Constructed → Running → Draining → Closed` state
//! machine. No restart; construct a new `Pipeline` per process/instance.

pub mod consumer;
pub mod enriched_forwarder;
pub mod fetcher;
pub mod forwarder;
pub mod queues;

use crate::broker::{BrokerConsumer, BrokerProducer};
use crate::image_client::ImageClient;
use consumer::Consumer;
use enriched_forwarder::EnrichedForwarder;
use fetcher::{FetcherAwait, FetcherSubmit};
use forwarder::Forwarder;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Constructed,
    Running,
    Draining,
    Closed,
}

/// Parameters needed to start one pipeline instance; everything an adapter
/// doesn't need to know (queue sizing, worker wiring) lives in this module.
pub struct StartParams {
    pub consumer_topic: String,
    pub producer_topic: String,
    pub desired_objects: HashSet<String>,
    pub fetch_concurrency: usize,
}

pub struct Pipeline {
    producer: Arc<dyn BrokerProducer>,
    consumer_handle: JoinHandle<()>,
    fetcher_submit_handle: JoinHandle<()>,
    fetcher_await_handle: JoinHandle<()>,
    enriched_forwarder_handle: JoinHandle<()>,
    forwarder_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    state: PipelineState,
}

impl Pipeline {
    /// Create the queues, the worker pool, and the four workers, and start
    /// them running immediately.
    pub fn start(
        broker_consumer: Box<dyn BrokerConsumer>,
        broker_producer: Arc<dyn BrokerProducer>,
        image_client: Arc<dyn ImageClient>,
        params: StartParams,
    ) -> Self {
        let (forward_tx, forward_rx) = queues::forward_queue();
        let (enrich_tx, enrich_rx) = queues::enrich_queue();
        let (enriched_tx, enriched_rx) = queues::enriched_queue();
        // Capacity bounded by fetch_concurrency: there can never be more
        // completions in flight than permitted concurrent HTTP tasks.
        let (completion_tx, completion_rx) =
            tokio::sync::mpsc::channel(params.fetch_concurrency.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let consumer = Consumer::new(
            broker_consumer,
            params.consumer_topic,
            params.desired_objects,
            forward_tx,
            enrich_tx,
            shutdown_rx.clone(),
        );
        let consumer_handle = tokio::spawn(consumer.run());

        let fetcher_submit = FetcherSubmit::new(
            enrich_rx,
            image_client,
            params.fetch_concurrency,
            completion_tx,
            shutdown_rx,
        );
        let fetcher_submit_handle = tokio::spawn(fetcher_submit.run());

        let fetcher_await = FetcherAwait::new(completion_rx, enriched_tx);
        let fetcher_await_handle = tokio::spawn(fetcher_await.run());

        let enriched_forwarder = EnrichedForwarder::new(
            enriched_rx,
            Arc::clone(&broker_producer),
            params.producer_topic.clone(),
        );
        let enriched_forwarder_handle = tokio::spawn(enriched_forwarder.run());

        let forwarder = Forwarder::new(forward_rx, Arc::clone(&broker_producer), params.producer_topic);
        let forwarder_handle = tokio::spawn(forwarder.run());

        Pipeline {
            producer: broker_producer,
            consumer_handle,
            fetcher_submit_handle,
            fetcher_await_handle,
            enriched_forwarder_handle,
            forwarder_handle,
            shutdown_tx,
            state: PipelineState::Running,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Cancel, drain every worker in dependency order, then close and flush
    /// the broker producer. Consumes `self`: there is no restart.
    pub async fn close(mut self) {
        self.state = PipelineState::Draining;
        let _ = self.shutdown_tx.send(true);

        // Consumer stops polling first, dropping forward_tx/enrich_tx, which
        // is what lets every downstream worker drain and exit on its own.
        let _ = self.consumer_handle.await;
        let _ = self.fetcher_submit_handle.await;
        let _ = self.fetcher_await_handle.await;
        let _ = self.enriched_forwarder_handle.await;
        let _ = self.forwarder_handle.await;

        self.producer.close().await;
        self.state = PipelineState::Closed;
    }
}
