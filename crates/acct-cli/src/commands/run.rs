//! `acct run`: one reconciliation pass per subject.
//!
//! Per subject, strictly in order: watermark -> window -> reconcile ->
//! sinks -> watermark write. Subjects run as independent tokio tasks and
//! share nothing mutable. The watermark moves only when reconciliation
//! succeeded and every sink accepted the records, so a failed or cancelled
//! run retries the same window next time.

use std::sync::Arc;

use acct_config::{AccountingConfig, ProviderConfig};
use acct_extract::FileProvider;
use acct_reconcile::{
    EnergyReconciler, FileWatermarkStore, IpReconciler, ReconcileConfig, ReconcileError,
    Reconciler, StorageReconciler, WatermarkStore,
};
use acct_schemas::{format_instant, Record, RecordKind, TimeWindow};
use acct_sink::SinkRouter;
use anyhow::{bail, Context, Result};
use chrono::{NaiveDateTime, Utc};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::{build_router, parse_at, reconcile_config, watermark_store};

#[derive(Debug)]
pub struct SubjectReport {
    pub subject: String,
    pub window: TimeWindow,
    pub records: Vec<Record>,
    pub skipped: usize,
    pub watermark_advanced: bool,
}

struct Shared {
    cfg: AccountingConfig,
    reconcile: ReconcileConfig,
    router: SinkRouter,
    store: FileWatermarkStore,
    to: NaiveDateTime,
    dry_run: bool,
}

pub async fn run(
    cfg: AccountingConfig,
    subjects: Vec<String>,
    to: Option<&str>,
    dry_run: bool,
) -> Result<()> {
    let to = match to {
        Some(raw) => parse_at(raw)?,
        None => Utc::now().naive_utc(),
    };
    let subjects = if subjects.is_empty() {
        cfg.projects.clone()
    } else {
        subjects
    };
    if subjects.is_empty() {
        bail!("no subjects: configure `projects` or pass --subject");
    }
    for s in &subjects {
        if !cfg.projects.contains(s) {
            warn!(subject = %s, "subject is not listed in configured projects");
        }
    }

    let shared = Arc::new(Shared {
        reconcile: reconcile_config(&cfg)?,
        router: build_router(&cfg),
        store: watermark_store(&cfg),
        cfg,
        to,
        dry_run,
    });
    if shared.router.is_empty() && !dry_run {
        warn!("no sinks configured; records will be dropped");
    }

    let mut tasks = JoinSet::new();
    for subject in subjects {
        let shared = Arc::clone(&shared);
        tasks.spawn(async move {
            let res = run_subject(&shared, &subject).await;
            (subject, res)
        });
    }

    let mut reports = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let (subject, res) = joined.context("subject task panicked or was cancelled")?;
        match res {
            Ok(report) => reports.push(report),
            Err(e) => {
                error!(subject = %subject, error = %format!("{e:#}"), "subject run failed");
                failed.push(subject);
            }
        }
    }
    reports.sort_by(|a, b| a.subject.cmp(&b.subject));

    for r in &reports {
        if dry_run {
            for rec in &r.records {
                println!("{}", serde_json::to_string(rec)?);
            }
        } else {
            println!(
                "subject={} from={} to={} records={} skipped={} watermark_advanced={}",
                r.subject,
                format_instant(&r.window.from()),
                format_instant(&r.window.to()),
                r.records.len(),
                r.skipped,
                r.watermark_advanced
            );
        }
    }

    if !failed.is_empty() {
        failed.sort();
        bail!("RUN_FAILED subjects={}", failed.join(","));
    }
    Ok(())
}

async fn run_subject(shared: &Shared, subject: &str) -> Result<SubjectReport> {
    let from = match shared.store.read(subject).await? {
        Some(at) => at,
        None => shared.cfg.default_start()?,
    };
    let window = TimeWindow::new(from, shared.to).map_err(ReconcileError::from)?;
    info!(
        subject,
        window_from = %format_instant(&window.from()),
        window_to = %format_instant(&window.to()),
        "reconciling window"
    );

    let provider = match &shared.cfg.provider {
        ProviderConfig::File { root } => Arc::new(
            FileProvider::new(root, subject).with_energy_step(shared.cfg.energy.step_seconds),
        ),
    };

    let mut records: Vec<Record> = Vec::new();
    let mut skipped = 0usize;

    if shared.cfg.extracts(RecordKind::Cloud) {
        let reconciler =
            Reconciler::new(shared.reconcile.clone(), provider.clone(), provider.clone());
        let outcome = reconciler.reconcile(subject, &window).await?;
        skipped = outcome.skipped.len();
        records.extend(outcome.records.into_iter().map(Record::from));
    }
    if shared.cfg.extracts(RecordKind::Storage) {
        let storage = StorageReconciler::new(shared.reconcile.clone(), provider.clone());
        let volumes = storage.reconcile(subject, &window).await?;
        records.extend(volumes.into_iter().map(Record::from));
    }
    if shared.cfg.extracts(RecordKind::Energy) {
        let energy =
            EnergyReconciler::new(shared.reconcile.clone(), provider.clone(), provider.clone())
                .with_normalization_factor(shared.cfg.energy.cpu_normalization_factor);
        let outcome = energy.reconcile(subject, &window).await?;
        skipped += outcome.skipped.len();
        records.extend(outcome.records.into_iter().map(Record::from));
    }
    if shared.cfg.extracts(RecordKind::Ip) {
        let ips = IpReconciler::new(shared.reconcile.clone(), provider.clone());
        let allocations = ips.reconcile(subject, &window).await?;
        records.extend(allocations.into_iter().map(Record::from));
    }

    if shared.dry_run {
        return Ok(SubjectReport {
            subject: subject.to_string(),
            window,
            records,
            skipped,
            watermark_advanced: false,
        });
    }

    let report = shared.router.push_to_all(&records).await;
    if !report.all_delivered() {
        let failures: Vec<String> = report
            .failures()
            .map(|(name, e)| format!("{name}: {e}"))
            .collect();
        bail!(
            "SINK_DELIVERY_FAILED subject={subject}; watermark not advanced: {}",
            failures.join("; ")
        );
    }

    shared.store.write(subject, window.to()).await?;
    info!(
        subject,
        records = records.len(),
        watermark = %format_instant(&window.to()),
        "window published"
    );

    Ok(SubjectReport {
        subject: subject.to_string(),
        window,
        records,
        skipped,
        watermark_advanced: true,
    })
}
