//! Core in-process streaming pipeline for the image-enrichment worker.
//!
//! The pipeline core is generic over the [`broker::BrokerConsumer`] /
//! [`broker::BrokerProducer`] traits and the [`image_client::ImageClient`]
//! trait — concrete adapters (a real broker client, a real HTTP client) are
//! wired in by the binary crate, never depended on here.

pub mod broker;
pub mod config;
pub mod envelope;
pub mod image_client;
pub mod pipeline;
pub mod testing;
