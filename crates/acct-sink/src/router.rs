use acct_schemas::Record;
use tracing::{debug, info, warn};

use crate::sink::{KindFilter, RecordSink, SinkError};

#[derive(Debug)]
pub enum DeliveryOutcome {
    Delivered { count: usize },
    /// Nothing in the record set matched the sink's kinds.
    Skipped,
    Failed { error: SinkError },
}

#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub outcomes: Vec<(String, DeliveryOutcome)>,
}

impl DeliveryReport {
    /// `Skipped` counts as delivered: there was nothing to send.
    pub fn all_delivered(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, o)| !matches!(o, DeliveryOutcome::Failed { .. }))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &SinkError)> {
        self.outcomes.iter().filter_map(|(name, o)| match o {
            DeliveryOutcome::Failed { error } => Some((name.as_str(), error)),
            _ => None,
        })
    }
}

#[derive(Default)]
pub struct SinkRouter {
    sinks: Vec<(Box<dyn RecordSink>, KindFilter)>,
}

impl SinkRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, sink: Box<dyn RecordSink>, filter: KindFilter) {
        self.sinks.push((sink, filter));
    }

    pub fn with(mut self, sink: Box<dyn RecordSink>, filter: KindFilter) -> Self {
        self.add(sink, filter);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Push to every sink in registration order. A failure is recorded and
    /// the remaining sinks still run.
    pub async fn push_to_all(&self, records: &[Record]) -> DeliveryReport {
        let mut report = DeliveryReport::default();

        for (sink, filter) in &self.sinks {
            let selected: Vec<Record> = filter.select(records).into_iter().cloned().collect();
            if selected.is_empty() {
                debug!(sink = sink.name(), "no matching records; sink skipped");
                report
                    .outcomes
                    .push((sink.name().to_string(), DeliveryOutcome::Skipped));
                continue;
            }

            let outcome = match sink.push(&selected).await {
                Ok(()) => {
                    info!(sink = sink.name(), count = selected.len(), "records delivered");
                    DeliveryOutcome::Delivered {
                        count: selected.len(),
                    }
                }
                Err(error) => {
                    warn!(sink = sink.name(), %error, "sink delivery failed");
                    DeliveryOutcome::Failed { error }
                }
            };
            report.outcomes.push((sink.name().to_string(), outcome));
        }

        report
    }
}
