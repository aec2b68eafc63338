//! Layered YAML configuration.
//!
//! Documents are merged in order (later mappings override earlier ones key by
//! key), checked for literal secrets, canonicalised and hashed. The merged
//! document is then deserialised into [`AccountingConfig`].

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};

mod secrets;
mod settings;

pub use settings::{
    AccountingConfig, BenchmarkKeys, EnergySettings, ProviderConfig, SinkConfig,
    DEFAULT_ENERGY_STEP_SECONDS, DEFAULT_IMAGE_METADATA_KEY, DEFAULT_LOGSTASH_TIMEOUT_SECS,
    DEFAULT_PAGE_LIMIT, DEFAULT_WINDOW_START,
};

/// The merged document of every layer, with its canonical form and digest.
/// `config_hash` is what the run log reports to tie output to its config.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

impl LoadedConfig {
    pub fn typed(&self) -> Result<AccountingConfig> {
        AccountingConfig::from_json(&self.config_json)
    }
}

pub fn load_layered_yaml<P: AsRef<Path>>(paths: &[P]) -> Result<LoadedConfig> {
    if paths.is_empty() {
        bail!("no configuration files given");
    }
    let docs = paths
        .iter()
        .map(|p| {
            let p = p.as_ref();
            fs::read_to_string(p)
                .with_context(|| format!("failed to read config layer: {}", p.display()))
        })
        .collect::<Result<Vec<String>>>()?;

    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Default::default());
    for (i, raw) in yaml_docs.iter().enumerate() {
        let layer: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {i}"))?;
        // An empty document is an empty layer, not a null override.
        if layer.is_null() {
            continue;
        }
        let layer = serde_json::to_value(layer).context("yaml->json conversion failed")?;
        overlay(&mut merged, layer);
    }

    secrets::reject_credentials(&merged)?;

    // serde_json maps iterate in key order, so this is independent of the
    // key order in the YAML sources.
    let canonical_json =
        serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));
    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Mappings merge key by key; any other value in `layer` replaces the base.
fn overlay(base: &mut Value, layer: Value) {
    match (base, layer) {
        (Value::Object(base_map), Value::Object(layer_map)) => {
            for (key, value) in layer_map {
                match base_map.get_mut(&key) {
                    Some(slot) => overlay(slot, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
