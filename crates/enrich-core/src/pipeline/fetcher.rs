//! Fetcher pool (§4.3): submits bounded-concurrency HTTP image requests and
//! correlates completions back to their originating envelope.
//!
//! The source's ad-hoc `{future: envelope}` map is replaced per §9's
//! option (a): a [`tokio::sync::Semaphore`] caps concurrent in-flight HTTP
//! tasks, and each task reports `(Envelope, outcome)` back over a single
//! completion channel instead of living in a shared map. `image_worker` is
//! that channel plus the semaphore — there is no lock to contend for, and
//! the completion side can never starve submission.

use crate::broker::Record;
use crate::envelope::Envelope;
use crate::image_client::{ImageClient, ImageRequest};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Semaphore};
use tracing::{error, info};

type FetchOutcome = Result<String, crate::image_client::FetchError>;

/// Submission half of the fetcher pool (`run_submit` in §4.3).
pub struct FetcherSubmit {
    enrich_rx: mpsc::Receiver<Record>,
    image_client: Arc<dyn ImageClient>,
    concurrency: Arc<Semaphore>,
    completion_tx: mpsc::Sender<(Envelope, FetchOutcome)>,
    shutdown: watch::Receiver<bool>,
}

impl FetcherSubmit {
    pub fn new(
        enrich_rx: mpsc::Receiver<Record>,
        image_client: Arc<dyn ImageClient>,
        concurrency: usize,
        completion_tx: mpsc::Sender<(Envelope, FetchOutcome)>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        FetcherSubmit {
            enrich_rx,
            image_client,
            concurrency: Arc::new(Semaphore::new(concurrency)),
            completion_tx,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        break;
                    }
                }
                record = self.enrich_rx.recv() => {
                    match record {
                        None => break,
                        Some(record) => self.submit(record).await,
                    }
                }
            }
        }
    }

    async fn submit(&mut self, record: Record) {
        let envelope = match Envelope::parse(&record.value) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "dropping record: failed to parse value as JSON");
                return;
            }
        };

        let (time_sec, fraction) = match envelope.epoch_timestamp() {
            Ok(parts) => parts,
            Err(e) => {
                error!(error = %e, "dropping record: failed to parse @timestamp");
                return;
            }
        };
        let sensor_id = match envelope.sensor_id() {
            Ok(sensor_id) => sensor_id.to_owned(),
            Err(e) => {
                error!(error = %e, "dropping record: missing sensor.id");
                return;
            }
        };

        // Acquiring the permit here — before accepting the next item off
        // enrich_q — is what makes a saturated pool propagate backpressure
        // all the way up to the broker consumer.
        // semaphore closed; pipeline is shutting down
        let Ok(permit) = Arc::clone(&self.concurrency).acquire_owned().await else {
            return;
        };

        info!(sensor_id = %sensor_id, time_sec, fraction, "requesting image");

        let image_client = Arc::clone(&self.image_client);
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let request = ImageRequest::new(sensor_id, time_sec, fraction);
            let outcome = image_client
                .fetch(request)
                .await
                .map(|response| response.image);
            let _ = completion_tx.send((envelope, outcome)).await;
        });
    }
}

/// Completion half of the fetcher pool (`run_await` in §4.3).
///
/// Runs until the completion channel is closed, i.e. until submission has
/// stopped *and* every in-flight task has reported back — never busy-spins
/// while `image_worker` is empty, because `recv` itself suspends.
pub struct FetcherAwait {
    completion_rx: mpsc::Receiver<(Envelope, FetchOutcome)>,
    enriched_tx: mpsc::Sender<serde_json::Value>,
}

impl FetcherAwait {
    pub fn new(
        completion_rx: mpsc::Receiver<(Envelope, FetchOutcome)>,
        enriched_tx: mpsc::Sender<serde_json::Value>,
    ) -> Self {
        FetcherAwait {
            completion_rx,
            enriched_tx,
        }
    }

    pub async fn run(mut self) {
        while let Some((envelope, outcome)) = self.completion_rx.recv().await {
            let image = match outcome {
                Ok(image) => image,
                Err(e) => {
                    let sensor_id = envelope.sensor_id().unwrap_or("<unknown>");
                    let timestamp = envelope.timestamp().unwrap_or("<unknown>");
                    error!(sensor_id = %sensor_id, timestamp = %timestamp, error = %e, "image fetch failed");
                    continue;
                }
            };

            let enriched = match envelope.with_image(&image) {
                Ok(enriched) => enriched,
                Err(e) => {
                    error!(error = %e, "dropping record: failed to apply fetched image");
                    continue;
                }
            };

            // Blocking enqueue: backpressure into the fetcher pool itself
            // when enriched_q is saturated.
            let _ = self.enriched_tx.send(enriched).await;
        }
    }
}
