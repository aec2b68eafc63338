use std::future::Future;
use std::time::Duration;

use acct_schemas::Record;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::sink::{RecordSink, SinkError};

/// Envelope field carrying the send time (unix seconds). Not part of the
/// record itself, so records stay deterministic.
pub const SENT_AT_FIELD: &str = "acct_sent_at";

/// Bound on connect and on sending one batch.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends records to a logstash TCP input, one UTF-8 JSON object per line.
/// A fresh connection is opened per push.
#[derive(Debug, Clone)]
pub struct LogstashSink {
    name: String,
    addr: String,
    timeout: Duration,
}

impl LogstashSink {
    pub fn new(host: &str, port: u16) -> Self {
        let addr = format!("{host}:{port}");
        Self {
            name: format!("logstash:{addr}"),
            addr,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one network step under the sink's timeout.
    async fn bounded<T>(
        &self,
        step: &'static str,
        fut: impl Future<Output = Result<T, SinkError>>,
    ) -> Result<T, SinkError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(SinkError::Timeout {
                sink: self.name.clone(),
                step,
                after: self.timeout,
            }),
        }
    }

    fn encode(&self, records: &[Record], sent_at: i64) -> Result<Vec<u8>, SinkError> {
        let encode_err = |source| SinkError::Encode {
            sink: self.name.clone(),
            source,
        };
        let mut buf = Vec::new();
        for r in records {
            let mut v = serde_json::to_value(r).map_err(encode_err)?;
            if let Value::Object(map) = &mut v {
                map.insert(SENT_AT_FIELD.to_string(), Value::from(sent_at));
            }
            serde_json::to_writer(&mut buf, &v).map_err(encode_err)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

#[async_trait]
impl RecordSink for LogstashSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn push(&self, records: &[Record]) -> Result<(), SinkError> {
        let buf = self.encode(records, Utc::now().timestamp())?;

        let mut stream = self
            .bounded("connect", async {
                TcpStream::connect(&self.addr)
                    .await
                    .map_err(|source| SinkError::Connect {
                        sink: self.name.clone(),
                        addr: self.addr.clone(),
                        source,
                    })
            })
            .await?;

        let io = |source| SinkError::Io {
            sink: self.name.clone(),
            source,
        };
        self.bounded("send", async {
            stream.write_all(&buf).await.map_err(io)?;
            stream.shutdown().await.map_err(io)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_step_times_out() {
        let sink = LogstashSink::new("127.0.0.1", 5000).with_timeout(Duration::from_millis(20));
        let err = sink
            .bounded("send", std::future::pending::<Result<(), SinkError>>())
            .await
            .unwrap_err();
        match err {
            SinkError::Timeout { step, after, .. } => {
                assert_eq!(step, "send");
                assert_eq!(after, Duration::from_millis(20));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn finished_step_passes_through() {
        let sink = LogstashSink::new("127.0.0.1", 5000);
        let v = sink.bounded("connect", async { Ok::<_, SinkError>(7) }).await.unwrap();
        assert_eq!(v, 7);
    }
}
