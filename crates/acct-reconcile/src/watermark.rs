//! Per-subject watermark: the end of the last fully published window.
//!
//! # Invariants
//!
//! - Written only after a window was reconciled and delivered; a failed or
//!   cancelled run leaves it untouched so the next run retries the window.
//! - A value that is present but unreadable is [`CorruptWatermarkError`],
//!   never a silent default: defaulting could double-count or leave gaps.
//! - `write` then `read` round-trips exactly, including sub-second digits.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use acct_schemas::{format_instant, parse_instant};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

pub const WATERMARK_FILE_PREFIX: &str = "lastrun.";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("watermark for subject '{subject}' is corrupt: {raw:?}")]
pub struct CorruptWatermarkError {
    pub subject: String,
    pub raw: String,
}

#[derive(Debug, thiserror::Error)]
pub enum WatermarkError {
    #[error(transparent)]
    Corrupt(#[from] CorruptWatermarkError),
    #[error("invalid subject id {0:?}")]
    InvalidSubject(String),
    #[error("watermark io at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WatermarkError {
    pub fn is_corrupt(&self) -> bool {
        matches!(self, WatermarkError::Corrupt(_))
    }
}

/// Empty, or anything that could escape the spool directory, is rejected.
fn validate_subject(subject: &str) -> Result<(), WatermarkError> {
    let bad = subject.trim().is_empty()
        || subject == "."
        || subject == ".."
        || subject.contains(['/', '\\', '\0']);
    if bad {
        return Err(WatermarkError::InvalidSubject(subject.to_string()));
    }
    Ok(())
}

fn parse_stored(subject: &str, raw: &str) -> Result<NaiveDateTime, CorruptWatermarkError> {
    parse_instant(raw.trim()).ok_or_else(|| CorruptWatermarkError {
        subject: subject.to_string(),
        raw: raw.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// `None` when the subject has never completed a window.
    async fn read(&self, subject: &str) -> Result<Option<NaiveDateTime>, WatermarkError>;

    async fn write(&self, subject: &str, at: NaiveDateTime) -> Result<(), WatermarkError>;
}

// ---------------------------------------------------------------------------
// FileWatermarkStore
// ---------------------------------------------------------------------------

/// One `lastrun.<subject>` file per subject, holding a single instant line.
#[derive(Debug, Clone)]
pub struct FileWatermarkStore {
    dir: PathBuf,
}

impl FileWatermarkStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, subject: &str) -> Result<PathBuf, WatermarkError> {
        validate_subject(subject)?;
        Ok(self.dir.join(format!("{WATERMARK_FILE_PREFIX}{subject}")))
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> WatermarkError + '_ {
    move |source| WatermarkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[async_trait]
impl WatermarkStore for FileWatermarkStore {
    async fn read(&self, subject: &str) -> Result<Option<NaiveDateTime>, WatermarkError> {
        let path = self.path_for(subject)?;
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_err(&path)(e)),
        };
        Ok(Some(parse_stored(subject, &raw)?))
    }

    async fn write(&self, subject: &str, at: NaiveDateTime) -> Result<(), WatermarkError> {
        let path = self.path_for(subject)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(io_err(&self.dir))?;

        // Rename over the old file so a crash never leaves a half-written line.
        let tmp = self.dir.join(format!(".{WATERMARK_FILE_PREFIX}{subject}.tmp"));
        tokio::fs::write(&tmp, format!("{}\n", format_instant(&at)))
            .await
            .map_err(io_err(&tmp))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(io_err(&path))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryWatermarkStore
// ---------------------------------------------------------------------------

/// Raw strings in memory, so tests can seed corrupt values.
#[derive(Debug, Default)]
pub struct MemoryWatermarkStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_raw(&self, subject: &str, raw: &str) {
        self.entries
            .lock()
            .await
            .insert(subject.to_string(), raw.to_string());
    }
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn read(&self, subject: &str) -> Result<Option<NaiveDateTime>, WatermarkError> {
        validate_subject(subject)?;
        match self.entries.lock().await.get(subject) {
            Some(raw) => Ok(Some(parse_stored(subject, raw)?)),
            None => Ok(None),
        }
    }

    async fn write(&self, subject: &str, at: NaiveDateTime) -> Result<(), WatermarkError> {
        validate_subject(subject)?;
        self.entries
            .lock()
            .await
            .insert(subject.to_string(), format_instant(&at));
        Ok(())
    }
}
