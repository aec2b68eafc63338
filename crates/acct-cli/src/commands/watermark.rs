use acct_config::AccountingConfig;
use acct_reconcile::WatermarkStore;
use acct_schemas::format_instant;
use anyhow::Result;
use tracing::info;

use super::{parse_at, watermark_store};

pub async fn get(cfg: &AccountingConfig, subject: &str) -> Result<()> {
    let store = watermark_store(cfg);
    match store.read(subject).await? {
        Some(at) => println!("{}", format_instant(&at)),
        None => println!("none"),
    }
    Ok(())
}

pub async fn set(cfg: &AccountingConfig, subject: &str, at: &str) -> Result<()> {
    let at = parse_at(at)?;
    let store = watermark_store(cfg);
    let previous = store.read(subject).await.ok().flatten();
    store.write(subject, at).await?;
    info!(
        subject,
        previous = ?previous.map(|p| format_instant(&p)),
        at = %format_instant(&at),
        "watermark overwritten"
    );
    println!("{}", format_instant(&at));
    Ok(())
}
