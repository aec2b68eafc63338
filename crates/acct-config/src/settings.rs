use std::collections::BTreeMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;

use acct_schemas::{parse_instant, RecordKind};
use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_WINDOW_START: &str = "1970-01-01";
pub const DEFAULT_PAGE_LIMIT: usize = 200;
pub const DEFAULT_IMAGE_METADATA_KEY: &str = "vmcatcher_event_ad_mpuri";
pub const DEFAULT_ENERGY_STEP_SECONDS: u32 = 30;
pub const DEFAULT_LOGSTASH_TIMEOUT_SECS: u64 = 10;

fn default_window_start() -> String {
    DEFAULT_WINDOW_START.to_string()
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_image_metadata_key() -> Option<String> {
    Some(DEFAULT_IMAGE_METADATA_KEY.to_string())
}

/// Energy and IP records need extra upstream data and are opt-in.
fn default_extractors() -> Vec<RecordKind> {
    vec![RecordKind::Cloud, RecordKind::Storage]
}

fn default_logstash_timeout() -> u64 {
    DEFAULT_LOGSTASH_TIMEOUT_SECS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BenchmarkKeys {
    #[serde(default = "BenchmarkKeys::default_name_key")]
    pub name_key: String,
    #[serde(default = "BenchmarkKeys::default_value_key")]
    pub value_key: String,
}

impl BenchmarkKeys {
    fn default_name_key() -> String {
        "accounting:benchmark_type".to_string()
    }

    fn default_value_key() -> String {
        "accounting:benchmark_value".to_string()
    }
}

impl Default for BenchmarkKeys {
    fn default() -> Self {
        Self {
            name_key: Self::default_name_key(),
            value_key: Self::default_value_key(),
        }
    }
}

/// Energy record inputs. Only read when `energy` is among the extractors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnergySettings {
    #[serde(default = "EnergySettings::default_factor")]
    pub cpu_normalization_factor: f64,
    /// Spacing of power samples, in seconds.
    #[serde(default = "EnergySettings::default_step")]
    pub step_seconds: u32,
}

impl EnergySettings {
    fn default_factor() -> f64 {
        1.0
    }

    fn default_step() -> u32 {
        DEFAULT_ENERGY_STEP_SECONDS
    }
}

impl Default for EnergySettings {
    fn default() -> Self {
        Self {
            cpu_normalization_factor: Self::default_factor(),
            step_seconds: Self::default_step(),
        }
    }
}

/// Where resource listings and usage come from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ProviderConfig {
    /// Offline JSON documents under `<root>/<subject>/`.
    File { root: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SinkConfig {
    Jsonl {
        path: PathBuf,
        #[serde(default)]
        record_types: Vec<RecordKind>,
    },
    Logstash {
        host: String,
        port: u16,
        /// Bound on connecting and on sending one batch.
        #[serde(default = "default_logstash_timeout")]
        timeout_secs: u64,
        #[serde(default)]
        record_types: Vec<RecordKind>,
    },
}

impl SinkConfig {
    /// Empty means every kind.
    pub fn record_types(&self) -> &[RecordKind] {
        match self {
            SinkConfig::Jsonl { record_types, .. } | SinkConfig::Logstash { record_types, .. } => {
                record_types
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountingConfig {
    pub site_name: String,
    pub service_name: String,
    /// Directory holding one watermark file per subject.
    pub spooldir: PathBuf,
    #[serde(default = "default_window_start")]
    pub default_window_start: String,
    pub projects: Vec<String>,
    #[serde(default)]
    pub vo_map: BTreeMap<String, String>,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_image_metadata_key")]
    pub image_metadata_key: Option<String>,
    #[serde(default)]
    pub benchmark: BenchmarkKeys,
    #[serde(default = "default_extractors")]
    pub extractors: Vec<RecordKind>,
    #[serde(default)]
    pub energy: EnergySettings,
    pub provider: ProviderConfig,
    #[serde(default)]
    pub sinks: Vec<SinkConfig>,
}

impl AccountingConfig {
    pub fn from_json(v: &Value) -> Result<Self> {
        crate::secrets::reject_credentials(v)?;
        let cfg: AccountingConfig =
            serde_json::from_value(v.clone()).context("config does not match schema")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.site_name.trim().is_empty() {
            bail!("CONFIG_INVALID site_name must not be empty");
        }
        if self.service_name.trim().is_empty() {
            bail!("CONFIG_INVALID service_name must not be empty");
        }
        if self.page_limit == 0 {
            bail!("CONFIG_INVALID page_limit must be > 0");
        }
        if self.extractors.is_empty() {
            bail!("CONFIG_INVALID extractors must name at least one record type");
        }
        let factor = self.energy.cpu_normalization_factor;
        if !factor.is_finite() || factor <= 0.0 {
            bail!("CONFIG_INVALID energy.cpu_normalization_factor must be a positive number");
        }
        if self.energy.step_seconds == 0 {
            bail!("CONFIG_INVALID energy.step_seconds must be > 0");
        }
        for sink in &self.sinks {
            if let SinkConfig::Logstash { timeout_secs: 0, .. } = sink {
                bail!("CONFIG_INVALID logstash timeout_secs must be > 0");
            }
        }
        for p in &self.projects {
            if p.trim().is_empty() {
                bail!("CONFIG_INVALID projects contains an empty subject id");
            }
        }
        self.default_start()?;
        Ok(())
    }

    /// `from` for a subject that has no watermark yet.
    pub fn default_start(&self) -> Result<NaiveDateTime> {
        match parse_instant(&self.default_window_start) {
            Some(t) => Ok(t),
            None => bail!(
                "CONFIG_INVALID default_window_start '{}' is not a date or datetime",
                self.default_window_start
            ),
        }
    }

    pub fn page_limit(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.page_limit).context("page_limit must be > 0")
    }

    pub fn vo_for(&self, subject: &str) -> String {
        self.vo_map
            .get(subject)
            .cloned()
            .unwrap_or_else(|| subject.to_string())
    }

    pub fn extracts(&self, kind: RecordKind) -> bool {
        self.extractors.contains(&kind)
    }
}
