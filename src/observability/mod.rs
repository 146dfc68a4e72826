//! Observability and telemetry.
//!
//! Structured logging via `tracing` and Prometheus metrics via the
//! `metrics` facade. Both are optional at runtime: the library records
//! through the facades regardless, and the binary decides what to
//! install.

use crate::{Error, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter.
pub const LOG_FILTER_ENV: &str = "FOREMAN_LOG";

/// Logging output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable output.
    #[default]
    Pretty,
    /// Line-delimited JSON.
    Json,
}

/// Logging initialization options.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingOptions {
    /// Lowers the default filter to `debug`.
    pub verbose: bool,
    /// Output format.
    pub format: LogFormat,
}

/// Initializes the global tracing subscriber.
///
/// The filter comes from `FOREMAN_LOG` when set, otherwise `info` (or
/// `debug` with `verbose`). Safe to call more than once; only the first
/// call installs a subscriber.
pub fn init_logging(options: LoggingOptions) {
    let default_filter = if options.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    let result = match options.format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

/// Installs the Prometheus metrics exporter with an HTTP listener.
///
/// # Errors
///
/// Returns an error if the exporter cannot be installed (e.g. the port is
/// already bound).
pub fn init_metrics(port: u16) -> Result<()> {
    let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port);
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| Error::OperationFailed {
            operation: "init_metrics".to_string(),
            cause: e.to_string(),
        })?;
    tracing::info!(%addr, "Prometheus metrics exporter listening");
    Ok(())
}
