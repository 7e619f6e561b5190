use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use spanmetrics_common::{
    cache::LruCache,
    error::{ErrorContext as _, GenericError},
    generic_error,
    task::spawn_traced_named,
    time::get_unix_timestamp_nanos,
};
use tokio::{select, sync::oneshot, task::JoinHandle, time::interval_at};
use tracing::{debug, error, trace};

use crate::{
    aggregator::Aggregator as _,
    config::ConnectorSettings,
    consumer::MetricsConsumer,
    data_model::{metrics::Metrics, AttributeMap, Temporality, Traces},
    dimensions::{DimensionScope, SpanContext, SERVICE_NAME_KEY},
    key::{KeyBuilder, SeriesKey},
    resource::{ResourceKey, ResourceMetrics},
    telemetry::Telemetry,
};

/// What the connector does to the data it receives.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Capabilities {
    /// Whether the connector modifies incoming spans.
    pub mutates_data: bool,
}

struct AggregationState {
    resources: LruCache<ResourceKey, ResourceMetrics>,
    dimensions: LruCache<SeriesKey, Arc<AttributeMap>>,
    key_builder: KeyBuilder,
}

impl AggregationState {
    fn new(settings: &ConnectorSettings) -> Result<Self, GenericError> {
        Ok(Self {
            resources: LruCache::new(settings.resource_metrics_cache_size)
                .error_context("Failed to create resource metrics cache.")?,
            dimensions: LruCache::new(settings.dimensions_cache_size)
                .error_context("Failed to create dimensions cache.")?,
            key_builder: KeyBuilder::new(),
        })
    }

    fn series_count(&self) -> usize {
        self.resources.iter().map(|(_, resource)| resource.series_count()).sum()
    }

    fn reset(&mut self, temporality: Temporality) {
        match temporality {
            Temporality::Delta => {
                self.resources.purge();
                self.dimensions.purge();
            }
            Temporality::Cumulative => {
                let evicted_resources = self.resources.reclaim_evicted();
                let evicted_keys = self.dimensions.reclaim_evicted();
                if !evicted_resources.is_empty() || !evicted_keys.is_empty() {
                    debug!(
                        resources = evicted_resources.len(),
                        series = evicted_keys.len(),
                        "Reclaimed evicted aggregation state."
                    );
                }

                for (_, resource) in self.resources.iter_mut() {
                    for (key, _) in &evicted_keys {
                        resource.remove_series(key);
                    }
                    resource.reset_exemplars();
                }
            }
        }
    }
}

fn get_or_create_dimensions<F>(
    cache: &mut LruCache<SeriesKey, Arc<AttributeMap>>, key: &SeriesKey, build: F,
) -> Arc<AttributeMap>
where
    F: FnOnce() -> AttributeMap,
{
    if let Some(attributes) = cache.get(key) {
        return Arc::clone(attributes);
    }

    let attributes = Arc::new(build());
    cache.insert(key.clone(), Arc::clone(&attributes));
    attributes
}

struct Inner {
    settings: ConnectorSettings,
    state: Mutex<AggregationState>,
    consumer: Arc<dyn MetricsConsumer>,
    telemetry: Telemetry,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, AggregationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn consume_traces(&self, traces: &Traces) {
        self.telemetry.increment_spans_received(traces.span_count());

        let settings = &self.settings;
        let now = get_unix_timestamp_nanos();

        let mut state = self.lock_state();
        let AggregationState {
            resources,
            dimensions,
            key_builder,
        } = &mut *state;

        for resource_spans in &traces.resource_spans {
            let resource_attributes = &resource_spans.resource.attributes;
            let Some(service_name) = resource_attributes.get(SERVICE_NAME_KEY) else {
                trace!("Skipping resource spans without a service name.");
                self.telemetry.increment_resources_skipped();
                continue;
            };
            let service_name = service_name.to_string_form();

            let resource_key = ResourceKey::from_attributes(resource_attributes, &settings.resource_key_attributes);
            if resources.get_mut(&resource_key).is_none() {
                let resource = ResourceMetrics::new(Arc::new(resource_attributes.clone()), settings, now);
                resources.insert(resource_key, resource);
            }
            let Some(resource) = resources.get_mut(&resource_key) else {
                continue;
            };

            for span in resource_spans.scope_spans.iter().flat_map(|scope_spans| &scope_spans.spans) {
                let ctx = SpanContext {
                    service_name: &service_name,
                    span,
                    attributes: resource_attributes,
                };
                let key = key_builder.build(&settings.resolver, &ctx, DimensionScope::Span);
                let attributes = get_or_create_dimensions(dimensions, &key, || {
                    settings.resolver.build_attributes(&ctx, DimensionScope::Span)
                });

                let duration = settings
                    .unit
                    .convert_nanos(span.end_time_unix_nano.saturating_sub(span.start_time_unix_nano));

                if let Some(durations) = resource.durations_mut() {
                    let series = durations.get_or_create(&key, &attributes);
                    series.add_exemplar(span.trace_id, span.span_id, duration, now);
                    series.observe(duration);
                }

                let calls = resource.calls_mut().get_or_create(&key, &attributes);
                calls.add_exemplar(span.trace_id, span.span_id, duration, now);
                calls.add(1);

                if !settings.events_enabled {
                    continue;
                }

                for event in &span.events {
                    let mut event_attributes = resource_attributes.clone();
                    event_attributes.merge_from(&event.attributes);

                    let ctx = SpanContext {
                        service_name: &service_name,
                        span,
                        attributes: &event_attributes,
                    };
                    let key = key_builder.build(&settings.resolver, &ctx, DimensionScope::Event);
                    let attributes = get_or_create_dimensions(dimensions, &key, || {
                        settings.resolver.build_attributes(&ctx, DimensionScope::Event)
                    });

                    let events = resource.events_mut().get_or_create(&key, &attributes);
                    events.add_exemplar(span.trace_id, span.span_id, duration, now);
                    events.add(1);
                }
            }
        }
    }

    fn snapshot_and_reset(&self) -> Metrics {
        let mut state = self.lock_state();
        let now = get_unix_timestamp_nanos();

        let resource_metrics = state
            .resources
            .iter()
            .map(|(_, resource)| resource.build(&self.settings, now))
            .collect();

        state.reset(self.settings.temporality);
        self.telemetry
            .set_active_state(state.resources.len(), state.series_count());

        Metrics { resource_metrics }
    }

    async fn export_metrics(&self) {
        let started = Instant::now();

        let metrics = self.snapshot_and_reset();
        let resources = metrics.resource_metrics.len();
        let data_points = metrics.data_point_count();

        match self.consumer.consume_metrics(metrics).await {
            Ok(()) => {
                self.telemetry.increment_exports_succeeded();
                debug!(resources, data_points, "Exported span metrics.");
            }
            Err(e) => {
                self.telemetry.increment_exports_failed();
                error!(error = %e, resources, data_points, "Failed to export span metrics.");
            }
        }

        self.telemetry.record_export_batch_duration(started.elapsed());
    }
}

async fn run_export_loop(inner: Arc<Inner>, mut stop_rx: oneshot::Receiver<()>) {
    let flush_interval = inner.settings.flush_interval;
    let mut flush = interval_at(tokio::time::Instant::now() + flush_interval, flush_interval);

    debug!(?flush_interval, "Export loop started.");

    loop {
        select! {
            _ = flush.tick() => inner.export_metrics().await,
            _ = &mut stop_rx => break,
        }
    }

    debug!("Export loop stopped.");
}

struct Worker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

enum WorkerState {
    Idle,
    Running(Worker),
    Stopped,
}

/// Span metrics connector.
///
/// Aggregates spans into request counts (`calls`), latency histograms (`duration`), and optionally span event counts
/// (`events`), keyed per resource by a configurable set of dimensions. Aggregated metrics are handed to a
/// [`MetricsConsumer`] on a fixed interval once [`start`][Self::start] has been called, or on demand through
/// [`export_metrics`][Self::export_metrics].
///
/// ## Temporality
///
/// With delta temporality, all aggregation state is dropped after each export, so every export only covers the spans
/// received since the previous one. With cumulative temporality, series keep accumulating across exports, and only
/// their exemplars are cleared. Series whose dimension attributes, or resources, were evicted from their bounded
/// caches are dropped at export time.
pub struct SpanMetricsConnector {
    inner: Arc<Inner>,
    worker: Mutex<WorkerState>,
}

impl SpanMetricsConnector {
    /// Creates a new `SpanMetricsConnector`.
    ///
    /// # Errors
    ///
    /// If the aggregation caches cannot be created, an error is returned.
    pub fn new(settings: ConnectorSettings, consumer: Arc<dyn MetricsConsumer>) -> Result<Self, GenericError> {
        Self::with_telemetry(settings, consumer, Telemetry::new())
    }

    fn with_telemetry(
        settings: ConnectorSettings, consumer: Arc<dyn MetricsConsumer>, telemetry: Telemetry,
    ) -> Result<Self, GenericError> {
        let state = AggregationState::new(&settings)?;

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                state: Mutex::new(state),
                consumer,
                telemetry,
            }),
            worker: Mutex::new(WorkerState::Idle),
        })
    }

    /// Returns the capabilities of the connector.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities { mutates_data: false }
    }

    /// Aggregates a batch of spans.
    ///
    /// Resource groups without a `service.name` attribute are skipped.
    pub fn consume_traces(&self, traces: &Traces) -> Result<(), GenericError> {
        self.inner.consume_traces(traces);
        Ok(())
    }

    /// Builds metrics from the current aggregation state, resets it, and hands the metrics to the consumer.
    ///
    /// Consumer failures are logged and the batch is dropped.
    pub async fn export_metrics(&self) {
        self.inner.export_metrics().await
    }

    /// Starts the periodic export task.
    ///
    /// # Errors
    ///
    /// If the connector is already running, has been shut down, or is not called from within a Tokio runtime, an
    /// error is returned.
    pub fn start(&self) -> Result<(), GenericError> {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match *worker {
            WorkerState::Idle => {}
            WorkerState::Running(_) => return Err(generic_error!("Span metrics connector is already running.")),
            WorkerState::Stopped => return Err(generic_error!("Span metrics connector has been shut down.")),
        }

        tokio::runtime::Handle::try_current()
            .error_context("Span metrics connector must be started within a Tokio runtime.")?;

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = spawn_traced_named("spanmetrics-export", run_export_loop(Arc::clone(&self.inner), stop_rx));
        *worker = WorkerState::Running(Worker { stop_tx, handle });

        debug!("Span metrics connector started.");

        Ok(())
    }

    /// Stops the periodic export task, waiting for any in-flight export to complete.
    ///
    /// Calling this more than once, or before [`start`][Self::start], does nothing. Aggregated state that has not yet
    /// been exported is left in place, and can still be exported with [`export_metrics`][Self::export_metrics].
    pub async fn shutdown(&self) {
        let worker = {
            let mut state = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            match std::mem::replace(&mut *state, WorkerState::Stopped) {
                WorkerState::Running(worker) => worker,
                WorkerState::Idle => {
                    *state = WorkerState::Idle;
                    return;
                }
                WorkerState::Stopped => return,
            }
        };

        // The worker may have already exited, in which case there is nobody left to signal.
        let _ = worker.stop_tx.send(());
        if let Err(e) = worker.handle.await {
            error!(error = %e, "Export task did not stop cleanly.");
        }

        debug!("Span metrics connector stopped.");
    }
}
