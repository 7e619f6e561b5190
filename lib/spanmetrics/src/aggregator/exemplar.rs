use crate::data_model::{metrics::Exemplar, SpanId, TraceId};

/// Exemplar collection settings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExemplarConfig {
    /// Whether exemplars are collected at all.
    pub enabled: bool,

    /// Maximum number of exemplars kept per data point between resets. Unbounded when `None`.
    pub max_per_data_point: Option<usize>,
}

/// Exemplars collected for a single series.
#[derive(Clone, Debug, Default)]
pub struct Exemplars {
    config: ExemplarConfig,
    items: Vec<Exemplar>,
}

impl Exemplars {
    /// Creates an empty exemplar set.
    pub fn new(config: ExemplarConfig) -> Self {
        Self {
            config,
            items: Vec::new(),
        }
    }

    /// Records an exemplar.
    ///
    /// Nothing is recorded when exemplars are disabled, when the trace identifier is empty, or when the per-data-point
    /// limit has been reached.
    pub fn record(&mut self, trace_id: TraceId, span_id: SpanId, value: f64, time_unix_nano: u64) {
        if !self.config.enabled || trace_id.is_empty() {
            return;
        }

        if let Some(max) = self.config.max_per_data_point {
            if self.items.len() >= max {
                return;
            }
        }

        self.items.push(Exemplar {
            trace_id,
            span_id,
            value,
            time_unix_nano,
        });
    }

    /// Removes all collected exemplars.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Returns the collected exemplars.
    pub fn as_slice(&self) -> &[Exemplar] {
        &self.items
    }

    /// Returns the number of collected exemplars.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if no exemplars have been collected.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACE: TraceId = TraceId::from_bytes([1; 16]);
    const SPAN: SpanId = SpanId::from_bytes([2; 8]);

    #[test]
    fn disabled_records_nothing() {
        let mut exemplars = Exemplars::new(ExemplarConfig::default());
        exemplars.record(TRACE, SPAN, 1.0, 10);
        assert!(exemplars.is_empty());
    }

    #[test]
    fn empty_trace_id_is_skipped() {
        let mut exemplars = Exemplars::new(ExemplarConfig {
            enabled: true,
            max_per_data_point: None,
        });
        exemplars.record(TraceId::EMPTY, SPAN, 1.0, 10);
        exemplars.record(TRACE, SpanId::EMPTY, 2.0, 20);

        assert_eq!(exemplars.len(), 1);
        assert_eq!(exemplars.as_slice()[0].value, 2.0);
    }

    #[test]
    fn limit_caps_until_cleared() {
        let mut exemplars = Exemplars::new(ExemplarConfig {
            enabled: true,
            max_per_data_point: Some(2),
        });
        for i in 0..5 {
            exemplars.record(TRACE, SPAN, f64::from(i), 10);
        }
        assert_eq!(exemplars.len(), 2);
        assert_eq!(exemplars.as_slice()[1].value, 1.0);

        exemplars.clear();
        exemplars.record(TRACE, SPAN, 7.0, 10);
        assert_eq!(exemplars.len(), 1);
    }
}
