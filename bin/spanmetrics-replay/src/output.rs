use std::{
    io::{self, Stdout, Write},
    sync::{Mutex, PoisonError},
};

use async_trait::async_trait;
use spanmetrics::{data_model::metrics::Metrics, MetricsConsumer};
use spanmetrics_common::error::{ErrorContext as _, GenericError};
use tracing::debug;

/// A metrics consumer that writes each non-empty batch as a single line of JSON.
pub struct JsonLinesConsumer<W> {
    writer: Mutex<W>,
}

impl JsonLinesConsumer<Stdout> {
    /// Creates a consumer that writes to stdout.
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W> JsonLinesConsumer<W> {
    /// Creates a consumer that writes to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

#[async_trait]
impl<W> MetricsConsumer for JsonLinesConsumer<W>
where
    W: Write + Send,
{
    async fn consume_metrics(&self, metrics: Metrics) -> Result<(), GenericError> {
        if metrics.is_empty() {
            debug!("Skipping empty metrics batch.");
            return Ok(());
        }

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        serde_json::to_writer(&mut *writer, &metrics).error_context("Failed to serialize metrics batch.")?;
        writer.write_all(b"\n").error_context("Failed to write metrics batch.")?;
        writer.flush().error_context("Failed to flush metrics batch.")?;

        debug!(data_points = metrics.data_point_count(), "Wrote metrics batch.");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use spanmetrics::data_model::{
        metrics::{Metric, MetricData, NumberDataPoint, ResourceMetrics, ScopeMetrics, Sum},
        AttributeMap, InstrumentationScope, Temporality,
    };

    use super::*;

    fn take_output(consumer: JsonLinesConsumer<Vec<u8>>) -> String {
        let buf = consumer.writer.into_inner().unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn empty_batches_are_skipped() {
        let consumer = JsonLinesConsumer::new(Vec::new());
        consumer.consume_metrics(Metrics::default()).await.unwrap();

        assert!(take_output(consumer).is_empty());
    }

    #[tokio::test]
    async fn writes_one_line_per_batch() {
        let metrics = Metrics {
            resource_metrics: vec![ResourceMetrics {
                resource: AttributeMap::from_iter([("service.name", "checkout")]).into(),
                scope_metrics: vec![ScopeMetrics {
                    scope: InstrumentationScope {
                        name: "spanmetricsconnector".to_string(),
                        version: String::new(),
                    },
                    metrics: vec![Metric {
                        name: "calls".to_string(),
                        unit: None,
                        data: MetricData::Sum(Sum {
                            data_points: vec![NumberDataPoint {
                                attributes: AttributeMap::new().into(),
                                start_time_unix_nano: 1,
                                time_unix_nano: 2,
                                value: 3,
                                exemplars: Vec::new(),
                            }],
                            aggregation_temporality: Temporality::Cumulative,
                            is_monotonic: true,
                        }),
                    }],
                }],
            }],
        };

        let consumer = JsonLinesConsumer::new(Vec::new());
        consumer.consume_metrics(metrics.clone()).await.unwrap();
        consumer.consume_metrics(metrics).await.unwrap();

        let output = take_output(consumer);
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);

        let decoded: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(decoded["resourceMetrics"][0]["scopeMetrics"][0]["metrics"][0]["name"], "calls");
    }
}
