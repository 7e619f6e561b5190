use async_trait::async_trait;
use spanmetrics_common::error::GenericError;

use crate::data_model::metrics::Metrics;

/// A downstream receiver of exported metrics.
#[async_trait]
pub trait MetricsConsumer: Send + Sync {
    /// Consumes a batch of metrics.
    ///
    /// # Errors
    ///
    /// If the batch could not be delivered, an error is returned. The batch is not retried.
    async fn consume_metrics(&self, metrics: Metrics) -> Result<(), GenericError>;
}
