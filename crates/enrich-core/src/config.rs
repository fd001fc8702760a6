//! Pipeline configuration loading (§6).
//!
//! TOML is the sole config source. Default path:
//! `/etc/stream-enricher/config.toml`, overridable via the
//! `STREAM_ENRICHER_CONFIG` environment variable.
//!
//! `consumer_config` and `producer_config` are forwarded verbatim to the
//! broker client adapter as open string maps — the set of keys a broker
//! client accepts is the adapter's concern, not the core's.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

const DEFAULT_CONFIG_PATH: &str = "/etc/stream-enricher/config.toml";
const DEFAULT_FETCH_CONCURRENCY: usize = 12;
const DEFAULT_IMAGE_REQUEST_TIMEOUT_SECS: u64 = 8;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub server_ip: String,
    pub service_port: u16,
    pub consumer_topic: String,
    pub producer_topic: String,
    pub num_processes: u32,
    pub desired_objects: Vec<String>,
    pub image_service: ImageServiceConfig,
    pub fetch_concurrency: usize,
    pub image_request_timeout_secs: u64,
    pub consumer_config: HashMap<String, String>,
    pub producer_config: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ImageServiceConfig {
    pub host: String,
    pub port: u16,
    pub path: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{0}': {1}")]
    Io(String, std::io::Error),
    #[error("parsing config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid config value for '{0}': {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    service: Option<RawService>,
    consumer_config: Option<HashMap<String, String>>,
    producer_config: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct RawService {
    server_ip: Option<String>,
    service_port: Option<u16>,
    consumer_topic: Option<String>,
    producer_topic: Option<String>,
    num_processes: Option<u32>,
    desired_objects: Option<String>,
    image_service_definition: Option<String>,
    fetch_concurrency: Option<usize>,
    image_request_timeout_secs: Option<u64>,
}

/// Load config from the default path, or `STREAM_ENRICHER_CONFIG` if set.
pub fn load_config() -> Result<PipelineConfig, ConfigError> {
    let path = std::env::var("STREAM_ENRICHER_CONFIG")
        .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_owned());
    load_config_from_path(Path::new(&path))
}

pub fn load_config_from_path(path: &Path) -> Result<PipelineConfig, ConfigError> {
    let toml_str = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(path.display().to_string(), e))?;
    load_config_from_str(&toml_str)
}

pub fn load_config_from_str(toml_str: &str) -> Result<PipelineConfig, ConfigError> {
    let raw: RawConfig = toml::from_str(toml_str)?;

    let service = raw.service.ok_or(ConfigError::MissingField("service"))?;

    let server_ip = service
        .server_ip
        .ok_or(ConfigError::MissingField("service.server_ip"))?;
    let service_port = service
        .service_port
        .ok_or(ConfigError::MissingField("service.service_port"))?;
    let consumer_topic = service
        .consumer_topic
        .ok_or(ConfigError::MissingField("service.consumer_topic"))?;
    let producer_topic = service
        .producer_topic
        .ok_or(ConfigError::MissingField("service.producer_topic"))?;
    let num_processes = service.num_processes.unwrap_or(1);

    let desired_objects = split_comma_list(
        service
            .desired_objects
            .as_deref()
            .ok_or(ConfigError::MissingField("service.desired_objects"))?,
    );
    if desired_objects.is_empty() {
        return Err(ConfigError::InvalidValue(
            "service.desired_objects",
            "must list at least one object type".to_owned(),
        ));
    }

    let image_service = parse_image_service_definition(
        service
            .image_service_definition
            .as_deref()
            .ok_or(ConfigError::MissingField("service.image_service_definition"))?,
    )?;

    let fetch_concurrency = service.fetch_concurrency.unwrap_or(DEFAULT_FETCH_CONCURRENCY);
    let image_request_timeout_secs = service
        .image_request_timeout_secs
        .unwrap_or(DEFAULT_IMAGE_REQUEST_TIMEOUT_SECS);

    let consumer_config = raw
        .consumer_config
        .ok_or(ConfigError::MissingField("consumer_config"))?;
    require_key(&consumer_config, "consumer_config", "bootstrap.servers")?;
    require_key(&consumer_config, "consumer_config", "group.id")?;
    require_key(&consumer_config, "consumer_config", "auto.offset.reset")?;
    require_key(&consumer_config, "consumer_config", "enable.auto.commit")?;

    let producer_config = raw
        .producer_config
        .ok_or(ConfigError::MissingField("producer_config"))?;
    require_key(&producer_config, "producer_config", "bootstrap.servers")?;

    Ok(PipelineConfig {
        server_ip,
        service_port,
        consumer_topic,
        producer_topic,
        num_processes,
        desired_objects,
        image_service,
        fetch_concurrency,
        image_request_timeout_secs,
        consumer_config,
        producer_config,
    })
}

fn split_comma_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn parse_image_service_definition(raw: &str) -> Result<ImageServiceConfig, ConfigError> {
    let parts = split_comma_list(raw);
    let [host, port, path] = <[String; 3]>::try_from(parts).map_err(|parts| {
        ConfigError::InvalidValue(
            "service.image_service_definition",
            format!("expected 'host,port,path', got {} field(s)", parts.len()),
        )
    })?;
    let port: u16 = port.parse().map_err(|_| {
        ConfigError::InvalidValue(
            "service.image_service_definition",
            format!("'{port}' is not a valid port"),
        )
    })?;
    Ok(ImageServiceConfig { host, port, path })
}

fn require_key(
    map: &HashMap<String, String>,
    section: &'static str,
    key: &'static str,
) -> Result<(), ConfigError> {
    if map.contains_key(key) {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue(
            section,
            format!("missing required key '{key}'"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> &'static str {
        r#"
        [service]
        server_ip = "192.168.1.10"
        service_port = 8001
        consumer_topic = "mlengine-raw"
        producer_topic = "mlengine-processed"
        num_processes = 5
        desired_objects = "VEHICLE, PERSON"
        image_service_definition = "192.168.1.101,8002,/api/v2/image"

        [consumer_config]
        "bootstrap.servers" = "192.168.1.10:9092"
        "group.id" = "test"
        "auto.offset.reset" = "latest"
        "enable.auto.commit" = "false"

        [producer_config]
        "bootstrap.servers" = "192.168.1.11:9092"
        "#
    }

    #[test]
    fn loads_valid_config() {
        let cfg = load_config_from_str(sample()).unwrap();
        assert_eq!(cfg.desired_objects, vec!["VEHICLE", "PERSON"]);
        assert_eq!(cfg.image_service.host, "192.168.1.101");
        assert_eq!(cfg.image_service.port, 8002);
        assert_eq!(cfg.image_service.path, "/api/v2/image");
        assert_eq!(cfg.fetch_concurrency, DEFAULT_FETCH_CONCURRENCY);
    }

    #[test]
    fn rejects_missing_desired_objects() {
        let toml_str = sample().replace("desired_objects = \"VEHICLE, PERSON\"", "");
        assert!(matches!(
            load_config_from_str(&toml_str),
            Err(ConfigError::MissingField("service.desired_objects"))
        ));
    }

    #[test]
    fn rejects_consumer_config_missing_bootstrap_servers() {
        let toml_str = sample().replace("\"bootstrap.servers\" = \"192.168.1.10:9092\"", "");
        assert!(load_config_from_str(&toml_str).is_err());
    }
}
