//! Command handlers for the `acct` binary.
//!
//! Shared wiring (config -> reconciler config, sinks, stores) lives here.

pub mod run;
pub mod watermark;

use std::time::Duration;

use acct_config::{AccountingConfig, LoadedConfig, SinkConfig};
use acct_reconcile::{FileWatermarkStore, ReconcileConfig};
use acct_schemas::parse_instant;
use acct_sink::{JsonLinesSink, KindFilter, LogstashSink, RecordSink, SinkRouter};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;

pub fn load_config(paths: &[String]) -> Result<(LoadedConfig, AccountingConfig)> {
    let loaded = acct_config::load_layered_yaml(paths)?;
    let cfg = loaded.typed().context("invalid accounting config")?;
    tracing::debug!(config_hash = %loaded.config_hash, "config loaded");
    Ok((loaded, cfg))
}

/// Parse a CLI instant (date, naive datetime, or RFC 3339).
pub fn parse_at(raw: &str) -> Result<NaiveDateTime> {
    parse_instant(raw).with_context(|| {
        format!("invalid instant '{raw}'. expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS[.f][offset]")
    })
}

pub fn reconcile_config(cfg: &AccountingConfig) -> Result<ReconcileConfig> {
    Ok(ReconcileConfig {
        site_name: cfg.site_name.clone(),
        compute_service: cfg.service_name.clone(),
        vo_map: cfg.vo_map.clone(),
        page_limit: cfg.page_limit()?,
        image_metadata_key: cfg.image_metadata_key.clone(),
        benchmark_name_key: cfg.benchmark.name_key.clone(),
        benchmark_value_key: cfg.benchmark.value_key.clone(),
    })
}

pub fn watermark_store(cfg: &AccountingConfig) -> FileWatermarkStore {
    FileWatermarkStore::new(&cfg.spooldir)
}

pub fn build_router(cfg: &AccountingConfig) -> SinkRouter {
    let mut router = SinkRouter::new();
    for sink_cfg in &cfg.sinks {
        let sink: Box<dyn RecordSink> = match sink_cfg {
            SinkConfig::Jsonl { path, .. } => Box::new(JsonLinesSink::new(path)),
            SinkConfig::Logstash {
                host,
                port,
                timeout_secs,
                ..
            } => Box::new(
                LogstashSink::new(host, *port).with_timeout(Duration::from_secs(*timeout_secs)),
            ),
        };
        router.add(sink, KindFilter::only(sink_cfg.record_types().iter().copied()));
    }
    router
}
