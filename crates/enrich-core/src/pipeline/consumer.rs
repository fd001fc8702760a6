//! Consumer worker (§4.1): polls the broker, classifies each record, and
//! routes it onto `forward_q` or `enrich_q`.

use crate::broker::{BrokerConsumer, Record};
use crate::envelope::{is_heartbeat, Envelope};
use std::collections::HashSet;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct Consumer {
    broker: Box<dyn BrokerConsumer>,
    consumer_topic: String,
    desired_objects: HashSet<String>,
    forward_tx: mpsc::Sender<Record>,
    enrich_tx: mpsc::Sender<Record>,
    shutdown: watch::Receiver<bool>,
}

impl Consumer {
    pub fn new(
        broker: Box<dyn BrokerConsumer>,
        consumer_topic: String,
        desired_objects: HashSet<String>,
        forward_tx: mpsc::Sender<Record>,
        enrich_tx: mpsc::Sender<Record>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Consumer {
            broker,
            consumer_topic,
            desired_objects,
            forward_tx,
            enrich_tx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        if let Err(e) = self.broker.subscribe(&[self.consumer_topic.clone()]).await {
            error!(error = %e, "failed to subscribe to consumer topic");
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                result = self.broker.poll(POLL_TIMEOUT) => {
                    match result {
                        Ok(None) => {
                            warn!(topic = %self.consumer_topic, "no message received");
                        }
                        Ok(Some(record)) => {
                            if let Some(err) = &record.error {
                                error!(topic = %self.consumer_topic, error = %err, "error consuming record");
                            } else {
                                self.route(record).await;
                            }
                        }
                        Err(e) => {
                            error!(error = %e, "unexpected error polling broker");
                        }
                    }
                }
            }
        }

        self.broker.close().await;
    }

    async fn route(&mut self, record: Record) {
        if is_heartbeat(&record.value) {
            // `send` blocks when forward_q is full — intentional backpressure.
            let _ = self.forward_tx.send(record).await;
            return;
        }

        let envelope = match Envelope::parse(&record.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "dropping record: failed to parse value as JSON");
                return;
            }
        };

        let object_type = match envelope.object_type() {
            Ok(object_type) => object_type,
            Err(e) => {
                error!(error = %e, "dropping record: missing objectType");
                return;
            }
        };

        if self.desired_objects.contains(object_type) {
            let object_id = envelope.object_id().unwrap_or("<unknown>").to_owned();
            let _ = self.enrich_tx.send(record).await;
            info!(
                object_id = %object_id,
                queue_depth = self.enrich_tx.max_capacity() - self.enrich_tx.capacity(),
                "enqueued message to enrich_q"
            );
        } else {
            let _ = self.forward_tx.send(record).await;
        }
    }
}
