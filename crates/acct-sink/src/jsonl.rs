use std::path::{Path, PathBuf};

use acct_schemas::Record;
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::sink::{RecordSink, SinkError};

/// Appends one JSON object per record to a file. Parent directories are
/// created on first push.
#[derive(Debug)]
pub struct JsonLinesSink {
    name: String,
    path: PathBuf,
    // Serialises appends from concurrent subject runs.
    lock: Mutex<()>,
}

impl JsonLinesSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("jsonl:{}", path.display()),
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io(&self, source: std::io::Error) -> SinkError {
        SinkError::Io {
            sink: self.name.clone(),
            source,
        }
    }
}

#[async_trait]
impl RecordSink for JsonLinesSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, records: &[Record]) -> Result<(), SinkError> {
        let mut buf = Vec::new();
        for r in records {
            serde_json::to_writer(&mut buf, r).map_err(|source| SinkError::Encode {
                sink: self.name.clone(),
                source,
            })?;
            buf.push(b'\n');
        }

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.io(e))?;
        }
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.io(e))?;
        f.write_all(&buf).await.map_err(|e| self.io(e))?;
        f.flush().await.map_err(|e| self.io(e))?;
        Ok(())
    }
}
