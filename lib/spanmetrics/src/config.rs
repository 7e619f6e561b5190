//! Connector configuration.

use std::{sync::Arc, time::Duration};

use histograms::DEFAULT_MAX_SIZE;
use humantime_serde::Serde as HumanDuration;
use serde::Deserialize;
use snafu::{ensure, Snafu};
use spanmetrics_common::{collections::FastHashSet, error::GenericError};
use spanmetrics_config::GenericConfiguration;

use crate::{
    aggregator::{ExemplarConfig, HistogramLayout},
    data_model::{AttributeValue, Temporality},
    dimensions::{BuiltinDimension, Dimension, DimensionResolver},
};

const DEFAULT_HISTOGRAM_BUCKETS_MS: [f64; 16] = [
    2.0, 4.0, 6.0, 8.0, 10.0, 50.0, 100.0, 200.0, 400.0, 800.0, 1000.0, 1400.0, 2000.0, 5000.0, 10000.0, 15000.0,
];

const fn default_cache_size() -> usize {
    1000
}

const fn default_flush_interval() -> Duration {
    Duration::from_secs(15)
}

fn default_namespace() -> String {
    "traces.span.metrics".to_string()
}

/// An error in the connector configuration.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ValidationError {
    /// A cache size was zero.
    #[snafu(display("'{}' must be a positive integer.", field))]
    InvalidCacheSize {
        /// Name of the offending field.
        field: &'static str,
    },

    /// Both explicit and exponential histogram buckets were configured.
    #[snafu(display("Histogram must use either explicit or exponential buckets, not both."))]
    ConflictingHistogramBuckets,

    /// Explicit histogram buckets were not in strictly ascending order.
    #[snafu(display("Explicit histogram buckets must be in strictly ascending order."))]
    UnsortedHistogramBuckets,

    /// A dimension name collided with a built-in dimension or with another configured dimension.
    #[snafu(display("Duplicate dimension name '{}'.", name))]
    DuplicateDimension {
        /// The duplicated name.
        name: String,
    },

    /// Events were enabled without any event dimensions.
    #[snafu(display("Events are enabled but no event dimensions are configured."))]
    MissingEventDimensions,

    /// The exemplar limit was zero.
    #[snafu(display("'exemplars.max_per_data_point' must be a positive integer."))]
    InvalidExemplarLimit,

    /// The flush interval was zero.
    #[snafu(display("'metrics_flush_interval' must be greater than zero."))]
    ZeroFlushInterval,
}

/// Unit that span durations are reported in.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
pub enum DurationUnit {
    /// Milliseconds.
    #[default]
    #[serde(rename = "ms")]
    Milliseconds,

    /// Seconds.
    #[serde(rename = "s")]
    Seconds,
}

impl DurationUnit {
    /// Returns the unit symbol, as attached to the duration metric.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
        }
    }

    /// Converts a duration, in nanoseconds, to this unit.
    pub fn convert_nanos(&self, nanos: u64) -> f64 {
        nanos as f64 / self.nanos_per_unit()
    }

    const fn nanos_per_unit(&self) -> f64 {
        match self {
            Self::Milliseconds => 1_000_000.0,
            Self::Seconds => 1_000_000_000.0,
        }
    }
}

/// A configured dimension.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct DimensionConfiguration {
    /// Attribute name.
    pub name: String,

    /// Value used when the attribute is missing from both the span and the resource.
    #[serde(default)]
    pub default: Option<String>,
}

impl DimensionConfiguration {
    fn to_dimension(&self) -> Dimension {
        Dimension {
            name: self.name.clone(),
            default: self.default.clone().map(AttributeValue::Str),
        }
    }
}

/// Duration histogram configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct HistogramConfiguration {
    /// Disables the duration histogram entirely.
    pub disable: bool,

    /// Unit of recorded durations.
    pub unit: DurationUnit,

    /// Explicit-bucket settings. Used by default when neither layout is configured.
    pub explicit: Option<ExplicitHistogramConfiguration>,

    /// Exponential-bucket settings.
    pub exponential: Option<ExponentialHistogramConfiguration>,
}

/// Explicit-bucket histogram configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExplicitHistogramConfiguration {
    /// Bucket upper bounds, such as `["2ms", "1s"]`.
    ///
    /// Defaults to 2, 4, 6, 8, 10, 50, 100, 200, 400, 800, 1000, 1400, 2000, 5000, 10000 and 15000 milliseconds.
    pub buckets: Option<Vec<HumanDuration<Duration>>>,
}

/// Exponential-bucket histogram configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExponentialHistogramConfiguration {
    /// Maximum number of buckets per sign. Zero selects the default of 160.
    pub max_size: u32,
}

/// Exemplar configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExemplarsConfiguration {
    /// Attaches exemplars to data points.
    pub enabled: bool,

    /// Maximum number of exemplars kept per data point between exports.
    pub max_per_data_point: Option<usize>,
}

/// Events metric configuration.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct EventsConfiguration {
    /// Emits the `events` metric.
    pub enabled: bool,

    /// Dimensions resolved against event attributes. Required when enabled.
    pub dimensions: Vec<DimensionConfiguration>,
}

/// Span metrics connector configuration.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SpanMetricsConfiguration {
    /// Additional dimensions, resolved from span attributes, then resource attributes, then the default.
    #[serde(default)]
    pub dimensions: Vec<DimensionConfiguration>,

    /// Built-in dimensions to leave out of every series.
    #[serde(default)]
    pub exclude_dimensions: Vec<String>,

    /// Duration histogram settings.
    #[serde(default)]
    pub histogram: HistogramConfiguration,

    /// Exemplar settings.
    #[serde(default)]
    pub exemplars: ExemplarsConfiguration,

    /// Events metric settings.
    #[serde(default)]
    pub events: EventsConfiguration,

    /// Prefix for metric names. When empty, metrics are named `calls`, `duration`, and `events`.
    ///
    /// Defaults to `traces.span.metrics`.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Aggregation temporality of the emitted metrics.
    ///
    /// Defaults to cumulative.
    #[serde(default)]
    pub aggregation_temporality: Temporality,

    /// Maximum number of cached dimension attribute sets.
    ///
    /// Defaults to 1000.
    #[serde(default = "default_cache_size")]
    pub dimensions_cache_size: usize,

    /// Maximum number of resources tracked at once.
    ///
    /// Defaults to 1000.
    #[serde(default = "default_cache_size")]
    pub resource_metrics_cache_size: usize,

    /// Resource attributes that identify a resource. When empty, all resource attributes are used.
    #[serde(default)]
    pub resource_metrics_key_attributes: Vec<String>,

    /// How often metrics are exported, such as `15s`.
    ///
    /// Defaults to 15 seconds.
    #[serde(with = "humantime_serde", default = "default_flush_interval")]
    pub metrics_flush_interval: Duration,
}

impl SpanMetricsConfiguration {
    /// Creates a new `SpanMetricsConfiguration` from the given configuration.
    pub fn from_configuration(config: &GenericConfiguration) -> Result<Self, GenericError> {
        Ok(config.as_typed()?)
    }

    /// Creates a new `SpanMetricsConfiguration` with default values.
    pub fn with_defaults() -> Self {
        Self {
            dimensions: Vec::new(),
            exclude_dimensions: Vec::new(),
            histogram: HistogramConfiguration::default(),
            exemplars: ExemplarsConfiguration::default(),
            events: EventsConfiguration::default(),
            namespace: default_namespace(),
            aggregation_temporality: Temporality::default(),
            dimensions_cache_size: default_cache_size(),
            resource_metrics_cache_size: default_cache_size(),
            resource_metrics_key_attributes: Vec::new(),
            metrics_flush_interval: default_flush_interval(),
        }
    }

    /// Validates the configuration and resolves it into connector settings.
    ///
    /// # Errors
    ///
    /// If the configuration is invalid, an error describing the first problem found is returned.
    pub fn validate(&self) -> Result<ConnectorSettings, ValidationError> {
        ensure!(
            self.dimensions_cache_size > 0,
            InvalidCacheSize {
                field: "dimensions_cache_size"
            }
        );
        ensure!(
            self.resource_metrics_cache_size > 0,
            InvalidCacheSize {
                field: "resource_metrics_cache_size"
            }
        );
        ensure!(!self.metrics_flush_interval.is_zero(), ZeroFlushInterval);
        ensure!(self.exemplars.max_per_data_point != Some(0), InvalidExemplarLimit);

        check_dimensions(&self.dimensions)?;
        if self.events.enabled {
            ensure!(!self.events.dimensions.is_empty(), MissingEventDimensions);
            check_dimensions(&self.events.dimensions)?;
        }

        let histogram = self.histogram_layout()?;

        let resolver = DimensionResolver::new(
            &self.exclude_dimensions,
            self.dimensions.iter().map(DimensionConfiguration::to_dimension).collect(),
            if self.events.enabled {
                self.events.dimensions.iter().map(DimensionConfiguration::to_dimension).collect()
            } else {
                Vec::new()
            },
        );

        Ok(ConnectorSettings {
            resolver,
            histogram,
            unit: self.histogram.unit,
            exemplars: ExemplarConfig {
                enabled: self.exemplars.enabled,
                max_per_data_point: self.exemplars.max_per_data_point,
            },
            events_enabled: self.events.enabled,
            names: MetricNames::new(&self.namespace),
            temporality: self.aggregation_temporality,
            dimensions_cache_size: self.dimensions_cache_size,
            resource_metrics_cache_size: self.resource_metrics_cache_size,
            resource_key_attributes: self.resource_metrics_key_attributes.clone(),
            flush_interval: self.metrics_flush_interval,
        })
    }

    fn histogram_layout(&self) -> Result<Option<HistogramLayout>, ValidationError> {
        let config = &self.histogram;
        if config.disable {
            return Ok(None);
        }

        match (&config.explicit, &config.exponential) {
            (Some(_), Some(_)) => ConflictingHistogramBuckets.fail(),
            (_, Some(exponential)) => {
                let max_size = if exponential.max_size == 0 {
                    DEFAULT_MAX_SIZE
                } else {
                    exponential.max_size
                };
                Ok(Some(HistogramLayout::Exponential { max_size }))
            }
            (explicit, None) => {
                let bounds = match explicit.as_ref().and_then(|explicit| explicit.buckets.as_ref()) {
                    Some(buckets) => buckets
                        .iter()
                        .map(|bucket| config.unit.convert_nanos(saturating_nanos(bucket)))
                        .collect::<Vec<_>>(),
                    None => default_bounds(config.unit),
                };
                ensure!(bounds.windows(2).all(|pair| pair[0] < pair[1]), UnsortedHistogramBuckets);

                Ok(Some(HistogramLayout::Explicit {
                    bounds: Arc::from(bounds),
                }))
            }
        }
    }
}

fn saturating_nanos(duration: &Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}

fn default_bounds(unit: DurationUnit) -> Vec<f64> {
    match unit {
        DurationUnit::Milliseconds => DEFAULT_HISTOGRAM_BUCKETS_MS.to_vec(),
        DurationUnit::Seconds => DEFAULT_HISTOGRAM_BUCKETS_MS.iter().map(|ms| ms / 1000.0).collect(),
    }
}

fn check_dimensions(dimensions: &[DimensionConfiguration]) -> Result<(), ValidationError> {
    let mut seen = FastHashSet::default();
    for dimension in dimensions {
        let name = dimension.name.as_str();
        ensure!(
            BuiltinDimension::from_name(name).is_none() && seen.insert(name),
            DuplicateDimension { name }
        );
    }

    Ok(())
}

/// Names of the emitted metrics.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct MetricNames {
    pub(crate) calls: String,
    pub(crate) duration: String,
    pub(crate) events: String,
}

impl MetricNames {
    fn new(namespace: &str) -> Self {
        let build = |name: &str| {
            if namespace.is_empty() {
                name.to_string()
            } else {
                format!("{}.{}", namespace, name)
            }
        };

        Self {
            calls: build("calls"),
            duration: build("duration"),
            events: build("events"),
        }
    }
}

/// Validated connector settings.
///
/// Created with [`SpanMetricsConfiguration::validate`].
#[derive(Clone, Debug)]
pub struct ConnectorSettings {
    pub(crate) resolver: DimensionResolver,
    pub(crate) histogram: Option<HistogramLayout>,
    pub(crate) unit: DurationUnit,
    pub(crate) exemplars: ExemplarConfig,
    pub(crate) events_enabled: bool,
    pub(crate) names: MetricNames,
    pub(crate) temporality: Temporality,
    pub(crate) dimensions_cache_size: usize,
    pub(crate) resource_metrics_cache_size: usize,
    pub(crate) resource_key_attributes: Vec<String>,
    pub(crate) flush_interval: Duration,
}

impl ConnectorSettings {
    /// Returns how often metrics are exported.
    pub fn flush_interval(&self) -> Duration {
        self.flush_interval
    }

    /// Returns the aggregation temporality of emitted metrics.
    pub fn temporality(&self) -> Temporality {
        self.temporality
    }
}

#[cfg(test)]
mod tests {
    use spanmetrics_config::ConfigurationLoader;

    use super::*;

    fn dimension(name: &str) -> DimensionConfiguration {
        DimensionConfiguration {
            name: name.to_string(),
            default: None,
        }
    }

    #[test]
    fn defaults() {
        let settings = SpanMetricsConfiguration::with_defaults().validate().unwrap();

        assert_eq!(settings.temporality, Temporality::Cumulative);
        assert_eq!(settings.unit, DurationUnit::Milliseconds);
        assert_eq!(settings.flush_interval, Duration::from_secs(15));
        assert_eq!(settings.dimensions_cache_size, 1000);
        assert_eq!(settings.resource_metrics_cache_size, 1000);
        assert!(!settings.events_enabled);
        assert!(!settings.exemplars.enabled);
        assert_eq!(settings.names.calls, "traces.span.metrics.calls");
        assert_eq!(settings.names.duration, "traces.span.metrics.duration");
        assert_eq!(
            settings.histogram,
            Some(HistogramLayout::Explicit {
                bounds: Arc::from(&DEFAULT_HISTOGRAM_BUCKETS_MS[..]),
            })
        );
    }

    #[test]
    fn empty_namespace_uses_bare_names() {
        let config = SpanMetricsConfiguration {
            namespace: String::new(),
            ..SpanMetricsConfiguration::with_defaults()
        };
        let settings = config.validate().unwrap();

        assert_eq!(settings.names.calls, "calls");
        assert_eq!(settings.names.duration, "duration");
        assert_eq!(settings.names.events, "events");
    }

    #[test]
    fn explicit_buckets_are_converted_to_unit() {
        let mut config = SpanMetricsConfiguration::with_defaults();
        config.histogram.unit = DurationUnit::Seconds;
        config.histogram.explicit = Some(ExplicitHistogramConfiguration {
            buckets: Some(vec![
                Duration::from_millis(500).into(),
                Duration::from_secs(1).into(),
                Duration::from_secs(3).into(),
            ]),
        });

        let settings = config.validate().unwrap();
        assert_eq!(
            settings.histogram,
            Some(HistogramLayout::Explicit {
                bounds: Arc::from(&[0.5, 1.0, 3.0][..]),
            })
        );
    }

    #[test]
    fn default_buckets_in_seconds() {
        let mut config = SpanMetricsConfiguration::with_defaults();
        config.histogram.unit = DurationUnit::Seconds;

        let Some(HistogramLayout::Explicit { bounds }) = config.validate().unwrap().histogram else {
            panic!("expected explicit buckets");
        };
        assert_eq!(bounds.first(), Some(&0.002));
        assert_eq!(bounds.last(), Some(&15.0));
    }

    #[test]
    fn exponential_and_disabled_histograms() {
        let mut config = SpanMetricsConfiguration::with_defaults();
        config.histogram.exponential = Some(ExponentialHistogramConfiguration::default());
        assert_eq!(
            config.validate().unwrap().histogram,
            Some(HistogramLayout::Exponential {
                max_size: DEFAULT_MAX_SIZE
            })
        );

        config.histogram.exponential = Some(ExponentialHistogramConfiguration { max_size: 20 });
        assert_eq!(
            config.validate().unwrap().histogram,
            Some(HistogramLayout::Exponential { max_size: 20 })
        );

        config.histogram.disable = true;
        assert_eq!(config.validate().unwrap().histogram, None);
    }

    #[test]
    fn invalid_configurations() {
        let base = SpanMetricsConfiguration::with_defaults;

        let mut config = base();
        config.histogram.explicit = Some(ExplicitHistogramConfiguration::default());
        config.histogram.exponential = Some(ExponentialHistogramConfiguration::default());
        assert!(matches!(config.validate(), Err(ValidationError::ConflictingHistogramBuckets)));

        let mut config = base();
        config.histogram.explicit = Some(ExplicitHistogramConfiguration {
            buckets: Some(vec![Duration::from_millis(10).into(), Duration::from_millis(5).into()]),
        });
        assert!(matches!(config.validate(), Err(ValidationError::UnsortedHistogramBuckets)));

        let mut config = base();
        config.dimensions = vec![dimension("span.kind")];
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateDimension { name }) if name == "span.kind"
        ));

        let mut config = base();
        config.dimensions = vec![dimension("region"), dimension("region")];
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateDimension { name }) if name == "region"
        ));

        let mut config = base();
        config.events.enabled = true;
        assert!(matches!(config.validate(), Err(ValidationError::MissingEventDimensions)));

        let mut config = base();
        config.dimensions_cache_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidCacheSize {
                field: "dimensions_cache_size"
            })
        ));

        let mut config = base();
        config.resource_metrics_cache_size = 0;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidCacheSize {
                field: "resource_metrics_cache_size"
            })
        ));

        let mut config = base();
        config.metrics_flush_interval = Duration::ZERO;
        assert!(matches!(config.validate(), Err(ValidationError::ZeroFlushInterval)));

        let mut config = base();
        config.exemplars.max_per_data_point = Some(0);
        assert!(matches!(config.validate(), Err(ValidationError::InvalidExemplarLimit)));
    }

    #[test]
    fn event_dimensions_only_checked_when_enabled() {
        let mut config = SpanMetricsConfiguration::with_defaults();
        config.events.dimensions = vec![dimension("service.name")];
        assert!(config.validate().is_ok());

        config.events.enabled = true;
        assert!(matches!(
            config.validate(),
            Err(ValidationError::DuplicateDimension { .. })
        ));
    }

    #[test]
    fn loads_from_yaml() {
        let config = ConfigurationLoader::default()
            .from_yaml_str(
                r#"
dimensions:
  - name: http.method
    default: GET
  - name: region
exclude_dimensions: [status.code]
histogram:
  unit: s
  explicit:
    buckets: ["100ms", "1s", "10s"]
exemplars:
  enabled: true
  max_per_data_point: 5
events:
  enabled: true
  dimensions:
    - name: exception.type
namespace: ""
aggregation_temporality: AGGREGATION_TEMPORALITY_DELTA
dimensions_cache_size: 50
resource_metrics_key_attributes: [service.name]
metrics_flush_interval: 30s
"#,
            )
            .unwrap()
            .into_generic();

        let config = SpanMetricsConfiguration::from_configuration(&config).unwrap();
        assert_eq!(config.dimensions.len(), 2);
        assert_eq!(config.dimensions[0].default.as_deref(), Some("GET"));
        assert_eq!(config.exclude_dimensions, vec!["status.code".to_string()]);
        assert_eq!(config.aggregation_temporality, Temporality::Delta);
        assert_eq!(config.dimensions_cache_size, 50);
        assert_eq!(config.resource_metrics_cache_size, 1000);
        assert_eq!(config.metrics_flush_interval, Duration::from_secs(30));

        let settings = config.validate().unwrap();
        assert_eq!(settings.names.calls, "calls");
        assert_eq!(settings.unit, DurationUnit::Seconds);
        assert_eq!(settings.resource_key_attributes, vec!["service.name".to_string()]);
        assert_eq!(
            settings.exemplars,
            ExemplarConfig {
                enabled: true,
                max_per_data_point: Some(5),
            }
        );
        assert_eq!(
            settings.histogram,
            Some(HistogramLayout::Explicit {
                bounds: Arc::from(&[0.1, 1.0, 10.0][..]),
            })
        );
    }
}
