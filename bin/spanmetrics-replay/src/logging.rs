use spanmetrics_common::{error::GenericError, generic_error};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Initializes the global logger.
///
/// Logs are written to stderr, leaving stdout for emitted metrics. The log level is read from `SPANMETRICS_LOG_LEVEL`,
/// falling back to `default_level`. Setting `SPANMETRICS_LOG_FORMAT_JSON` to `true` or `1` switches to JSON output.
///
/// # Errors
///
/// If a global logger has already been installed, an error is returned.
pub fn initialize_logging(default_level: LevelFilter) -> Result<(), GenericError> {
    let is_json = std::env::var("SPANMETRICS_LOG_FORMAT_JSON")
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("SPANMETRICS_LOG_LEVEL")
        .from_env_lossy();

    let result = if is_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_ansi(true)
            .with_target(true)
            .with_writer(std::io::stderr)
            .try_init()
    };

    result.map_err(|e| generic_error!("Failed to initialize logging: {}", e))
}
