//! Record delivery.
//!
//! Sinks receive a reconciled record set that is already final. The router
//! filters by record kind per sink and isolates failures: one sink erroring
//! never stops the others from receiving the same records.

mod jsonl;
mod logstash;
mod router;
mod sink;

pub use jsonl::JsonLinesSink;
pub use logstash::LogstashSink;
pub use router::{DeliveryOutcome, DeliveryReport, SinkRouter};
pub use sink::{KindFilter, RecordSink, SinkError};
