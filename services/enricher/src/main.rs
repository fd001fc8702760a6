// enricher: consumes raw sensor-observation records, fetches images for
// records of interest from an external HTTP service, and republishes both
// forwarded and enriched records to the output topic.
//
// Process-level fan-out (§1, §9): a deployment is meant to run N instances
// of this binary; here, `num_processes` is realized as N tokio tasks inside
// one runtime, each owning an independent, non-shared pipeline instance.

use broker_kafka::{KafkaConsumer, KafkaProducer};
use enrich_core::config::PipelineConfig;
use enrich_core::image_client::{ImageServiceEndpoint, ReqwestImageClient};
use enrich_core::pipeline::{Pipeline, StartParams};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "enricher starting");

    let config = match enrich_core::config::load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("FATAL: failed to start tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    runtime.block_on(run_instances(config));
}

async fn run_instances(config: PipelineConfig) {
    let num_processes = config.num_processes.max(1);
    info!(num_processes, "spawning pipeline instances");

    let mut handles = Vec::with_capacity(num_processes as usize);
    for instance in 0..num_processes {
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = run_one_instance(instance, config).await {
                error!(instance, error = %e, "pipeline instance exited with error");
            }
        }));
    }

    for handle in handles {
        let _ = handle.await;
    }
}

async fn run_one_instance(instance: u32, config: PipelineConfig) -> Result<(), String> {
    let consumer = KafkaConsumer::new(&config.consumer_config).map_err(|e| e.to_string())?;
    let producer = KafkaProducer::new(&config.producer_config).map_err(|e| e.to_string())?;
    let image_client = ReqwestImageClient::new(
        ImageServiceEndpoint {
            host: config.image_service.host,
            port: config.image_service.port,
            path: config.image_service.path,
        },
        Duration::from_secs(config.image_request_timeout_secs),
    )
    .map_err(|e| e.to_string())?;

    let pipeline = Pipeline::start(
        Box::new(consumer),
        Arc::new(producer),
        Arc::new(image_client),
        StartParams {
            consumer_topic: config.consumer_topic,
            producer_topic: config.producer_topic,
            desired_objects: config.desired_objects.into_iter().collect::<HashSet<_>>(),
            fetch_concurrency: config.fetch_concurrency,
        },
    );

    info!(instance, "pipeline instance running");

    // Runs until the process receives a shutdown signal; Ctrl+C is the only
    // externally triggered drain path this binary wires up.
    let _ = tokio::signal::ctrl_c().await;
    info!(instance, "shutdown signal received, draining pipeline");
    pipeline.close().await;
    Ok(())
}
