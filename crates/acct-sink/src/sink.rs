use std::collections::BTreeSet;
use std::time::Duration;

use acct_schemas::{Record, RecordKind};
use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("{sink}: io error: {source}")]
    Io {
        sink: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{sink}: encode error: {source}")]
    Encode {
        sink: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{sink}: cannot connect to {addr}: {source}")]
    Connect {
        sink: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{sink}: {step} timed out after {after:?}")]
    Timeout {
        sink: String,
        step: &'static str,
        after: Duration,
    },
}

/// A downstream destination for records.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &str;

    /// Deliver all of `records` or fail. Never called with an empty slice by
    /// [`crate::SinkRouter`].
    async fn push(&self, records: &[Record]) -> Result<(), SinkError>;
}

/// Record kinds a sink accepts. Empty means every kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindFilter {
    kinds: BTreeSet<RecordKind>,
}

impl KindFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn only(kinds: impl IntoIterator<Item = RecordKind>) -> Self {
        Self {
            kinds: kinds.into_iter().collect(),
        }
    }

    pub fn accepts(&self, kind: RecordKind) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&kind)
    }

    pub fn select<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records.iter().filter(|r| self.accepts(r.kind())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_accepts_everything() {
        let f = KindFilter::all();
        assert!(RecordKind::ALL.iter().all(|k| f.accepts(*k)));
    }

    #[test]
    fn explicit_filter_is_closed() {
        let f = KindFilter::only([RecordKind::Storage]);
        assert!(f.accepts(RecordKind::Storage));
        assert!(!f.accepts(RecordKind::Cloud));
    }
}
