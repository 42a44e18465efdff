//! Producer configuration loading.
//!
//! TOML is the sole config source, mirroring the forwarder's
//! `services/forwarder/src/config.rs`, including its `schema_version`
//! guard: a config file that sets `schema_version` to anything but `1`
//! (or omits it) is a hard error, the same way the forwarder refuses to
//! start on a stale or malformed config. Default config path:
//! `/etc/rep/producer.toml`. A missing config file is not itself an
//! error — the service falls back to compiled defaults, since unlike
//! the forwarder nothing here is required to be present (no token file,
//! no reader list).

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub bind: String,
    /// Producer-side static suppression (spec.md §4.2 step 1): events
    /// carrying any of these tags are never replayed to any consumer.
    pub excluded_tags: Vec<String>,
    /// `type_url`s this producer will emit (spec.md §9 "Serialization
    /// fallback"). `None` means no allow-list is enforced.
    pub allowed_payload_types: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    schema_version: Option<u32>,
    bind: Option<String>,
    #[serde(default)]
    excluded_tags: Vec<String>,
    allowed_payload_types: Option<Vec<String>>,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig { bind: "0.0.0.0:8090".to_owned(), excluded_tags: Vec::new(), allowed_payload_types: None }
    }
}

pub fn load_config() -> Result<ProducerConfig, String> {
    let path = std::env::var("PRODUCER_CONFIG").unwrap_or_else(|_| "/etc/rep/producer.toml".to_owned());
    load_config_from(Path::new(&path))
}

pub fn load_config_from(path: &Path) -> Result<ProducerConfig, String> {
    let raw = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(ProducerConfig::default());
        }
        Err(err) => return Err(format!("reading {}: {err}", path.display())),
    };
    let parsed: RawConfig = toml::from_str(&raw).map_err(|err| format!("parsing {}: {err}", path.display()))?;
    let schema_version = parsed.schema_version.ok_or("missing required field: schema_version")?;
    if schema_version != 1 {
        return Err(format!("schema_version must be 1, got {schema_version}"));
    }
    Ok(ProducerConfig {
        bind: parsed.bind.unwrap_or_else(|| ProducerConfig::default().bind),
        excluded_tags: parsed.excluded_tags,
        allowed_payload_types: parsed.allowed_payload_types,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = load_config_from(Path::new("/nonexistent/producer.toml")).unwrap();
        assert_eq!(cfg.bind, "0.0.0.0:8090");
        assert!(cfg.excluded_tags.is_empty());
        assert!(cfg.allowed_payload_types.is_none());
    }

    #[test]
    fn missing_schema_version_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("rep-producer-config-test-missing-schema.toml");
        std::fs::write(&path, "bind = \"0.0.0.0:9999\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.contains("schema_version"));
    }

    #[test]
    fn wrong_schema_version_is_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("rep-producer-config-test-wrong-schema.toml");
        std::fs::write(&path, "schema_version = 2\nbind = \"0.0.0.0:9999\"\n").unwrap();
        let err = load_config_from(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(err.contains("schema_version"));
    }

    #[test]
    fn valid_schema_version_loads_the_rest_of_the_config() {
        let dir = std::env::temp_dir();
        let path = dir.join("rep-producer-config-test-valid.toml");
        std::fs::write(
            &path,
            "schema_version = 1\nbind = \"0.0.0.0:9999\"\nallowed_payload_types = [\"type.googleapis.com/demo.Widget\"]\n",
        )
        .unwrap();
        let cfg = load_config_from(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(cfg.bind, "0.0.0.0:9999");
        assert_eq!(cfg.allowed_payload_types, Some(vec!["type.googleapis.com/demo.Widget".to_owned()]));
    }
}
