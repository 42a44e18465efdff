//! Consumer configuration loading (mirrors `producer::config`), including
//! its `schema_version` guard: see `services/producer/src/config.rs`.
//!
//! Default config path: `/etc/rep/consumer.toml`.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    AtLeastOnceAsync,
    ExactlyOnce,
}

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub producer_url: String,
    pub stream_id: String,
    pub projection_name: String,
    /// Number of sharded projection workers this process supervises
    /// (spec.md §4.6). Slices `[0, 1024)` are split evenly across them.
    pub worker_count: u32,
    pub mode: DeliveryMode,
    /// Only meaningful for `AtLeastOnceAsync`.
    pub commit_group_size: usize,
    /// Path to the SQLite offset store file. `None` keeps offsets in
    /// memory only, losing them across restarts.
    pub offset_store_path: Option<String>,
    pub backoff_min_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_factor: f64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            producer_url: "ws://127.0.0.1:8090/ws/v1/replication".to_owned(),
            stream_id: "default".to_owned(),
            projection_name: "default-projection".to_owned(),
            worker_count: 1,
            mode: DeliveryMode::AtLeastOnceAsync,
            commit_group_size: 20,
            offset_store_path: None,
            backoff_min_ms: 200,
            backoff_max_ms: 5_000,
            backoff_factor: 1.1,
        }
    }
}

impl ConsumerConfig {
    pub fn backoff(&self) -> rep_consumer::BackoffConfig {
        rep_consumer::BackoffConfig {
            min: Duration::from_millis(self.backoff_min_ms),
            max: Duration::from_millis(self.backoff_max_ms),
            factor: self.backoff_factor,
            jitter: true,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
struct RawConfig {
    schema_version: Option<u32>,
    producer_url: Option<String>,
    stream_id: Option<String>,
    projection_name: Option<String>,
    worker_count: Option<u32>,
    mode: Option<String>,
    commit_group_size: Option<usize>,
    offset_store_path: Option<String>,
    backoff_min_ms: Option<u64>,
    backoff_max_ms: Option<u64>,
    backoff_factor: Option<f64>,
}

pub fn load_config() -> Result<ConsumerConfig, String> {
    let path = std::env::var("CONSUMER_CONFIG").unwrap_or_else(|_| "/etc/rep/consumer.toml".to_owned());
    load_config_from(Path::new(&path))
}

pub fn load_config_from(path: &Path) -> Result<ConsumerConfig, String> {
    let defaults = ConsumerConfig::default();
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(defaults),
        Err(err) => return Err(format!("reading {}: {err}", path.display())),
    };
    let parsed: RawConfig = toml::from_str(&raw).map_err(|err| format!("parsing {}: {err}", path.display()))?;

    let schema_version = parsed.schema_version.ok_or("missing required field: schema_version")?;
    if schema_version != 1 {
        return Err(format!("schema_version must be 1, got {schema_version}"));
    }

    let mode = match parsed.mode.as_deref() {
        None | Some("at_least_once_async") => DeliveryMode::AtLeastOnceAsync,
        Some("exactly_once") => DeliveryMode::ExactlyOnce,
        Some(other) => return Err(format!("unknown delivery mode: {other}")),
    };

    Ok(ConsumerConfig {
        producer_url: parsed.producer_url.unwrap_or(defaults.producer_url),
        stream_id: parsed.stream_id.unwrap_or(defaults.stream_id),
        projection_name: parsed.projection_name.unwrap_or(defaults.projection_name),
        worker_count: parsed.worker_count.unwrap_or(defaults.worker_count),
        mode,
        commit_group_size: parsed.commit_group_size.unwrap_or(defaults.commit_group_size),
        offset_store_path: parsed.offset_store_path.or(defaults.offset_store_path),
        backoff_min_ms: parsed.backoff_min_ms.unwrap_or(defaults.backoff_min_ms),
        backoff_max_ms: parsed.backoff_max_ms.unwrap_or(defaults.backoff_max_ms),
        backoff_factor: parsed.backoff_factor.unwrap_or(defaults.backoff_factor),
    })
}
