//! Forwarding extracted fields into a collector or classifier.
//!
//! Only present values are forwarded, each as its own ingestion call,
//! tagged with the sample timestamp truncated to whole milliseconds. A
//! rejected field is reported back without stopping the remaining fields.

use crate::core::selector::resolve;
use crate::sensor::Sample;
use crate::service::{DataSink, ServiceError};
use serde_json::Value;

/// A field the sink refused.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldFailure {
    pub field: String,
    pub error: ServiceError,
}

/// Outcome of routing one sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteReport {
    /// Fields accepted by the sink
    pub forwarded: usize,
    /// Absent fields skipped
    pub dropped: usize,
    /// Fields the sink rejected
    pub failures: Vec<FieldFailure>,
}

impl RouteReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Drop the fractional part of a millisecond timestamp.
pub fn truncate_timestamp(timestamp: f64) -> i64 {
    timestamp.trunc() as i64
}

/// Forward every present field to `sink`, in order.
pub async fn route_fields<'a, 'b, S, I>(sink: &S, fields: I, timestamp: f64) -> RouteReport
where
    S: DataSink + ?Sized,
    I: IntoIterator<Item = (&'a str, Option<&'b Value>)>,
{
    let timestamp = truncate_timestamp(timestamp);
    let mut report = RouteReport::default();

    for (field, value) in fields {
        let Some(value) = value else {
            report.dropped += 1;
            continue;
        };

        match sink.add_data_point(timestamp, field, value).await {
            Ok(()) => report.forwarded += 1,
            Err(error) => {
                tracing::warn!(field, %error, "sink rejected field");
                report.failures.push(FieldFailure {
                    field: field.to_string(),
                    error,
                });
            }
        }
    }

    report
}

/// Resolve `selectors` against a sample and forward the present fields.
pub async fn route_sample<S>(sink: &S, selectors: &[String], sample: &Sample) -> RouteReport
where
    S: DataSink + ?Sized,
{
    route_fields(sink, resolve(&sample.data, selectors), sample.timestamp).await
}
