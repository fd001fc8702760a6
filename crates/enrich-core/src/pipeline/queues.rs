//! Bounded queue sizes (§3). Each queue has exactly one logical producer and
//! one logical consumer; the channel itself is the backpressure mechanism —
//! a full queue blocks its producer until a reader drains it.

use crate::broker::Record;
use tokio::sync::mpsc;

pub const FORWARD_Q_CAPACITY: usize = 100_000;
pub const ENRICH_Q_CAPACITY: usize = 1_000;
pub const ENRICHED_Q_CAPACITY: usize = 1_000;

pub fn forward_queue() -> (mpsc::Sender<Record>, mpsc::Receiver<Record>) {
    mpsc::channel(FORWARD_Q_CAPACITY)
}

pub fn enrich_queue() -> (mpsc::Sender<Record>, mpsc::Receiver<Record>) {
    mpsc::channel(ENRICH_Q_CAPACITY)
}

pub fn enriched_queue() -> (
    mpsc::Sender<serde_json::Value>,
    mpsc::Receiver<serde_json::Value>,
) {
    mpsc::channel(ENRICHED_Q_CAPACITY)
}
