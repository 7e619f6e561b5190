use std::time::Duration;

use metrics::{counter, gauge, histogram, Counter, Gauge, Histogram};

#[derive(Clone)]
pub struct Telemetry {
    spans_received: Counter,
    resources_skipped: Counter,
    active_resources: Gauge,
    active_series: Gauge,
    exports_succeeded: Counter,
    exports_failed: Counter,
    export_batch_duration: Histogram,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            spans_received: counter!("spanmetrics_spans_received_total"),
            resources_skipped: counter!("spanmetrics_resources_skipped_total", "reason" => "missing_service_name"),
            active_resources: gauge!("spanmetrics_active_resources"),
            active_series: gauge!("spanmetrics_active_series"),
            exports_succeeded: counter!("spanmetrics_exports_total", "outcome" => "success"),
            exports_failed: counter!("spanmetrics_exports_total", "outcome" => "failure"),
            export_batch_duration: histogram!("spanmetrics_export_batch_duration_secs"),
        }
    }

    #[cfg(test)]
    pub fn noop() -> Self {
        Self {
            spans_received: Counter::noop(),
            resources_skipped: Counter::noop(),
            active_resources: Gauge::noop(),
            active_series: Gauge::noop(),
            exports_succeeded: Counter::noop(),
            exports_failed: Counter::noop(),
            export_batch_duration: Histogram::noop(),
        }
    }

    pub fn increment_spans_received(&self, count: usize) {
        self.spans_received.increment(count as u64);
    }

    pub fn increment_resources_skipped(&self) {
        self.resources_skipped.increment(1);
    }

    pub fn set_active_state(&self, resources: usize, series: usize) {
        self.active_resources.set(resources as f64);
        self.active_series.set(series as f64);
    }

    pub fn increment_exports_succeeded(&self) {
        self.exports_succeeded.increment(1);
    }

    pub fn increment_exports_failed(&self) {
        self.exports_failed.increment(1);
    }

    pub fn record_export_batch_duration(&self, duration: Duration) {
        self.export_batch_duration.record(duration.as_secs_f64());
    }
}
