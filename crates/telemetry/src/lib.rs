//! Logging bootstrap shared by the init hook and the CLI.

use taskdb_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured filter; a malformed value
/// is an error rather than being ignored. Logs go to stderr so stdout carries
/// only command output. Calling this more than once keeps the first subscriber.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(rust_log.as_deref(), &settings.filter)?;

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match settings.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    if installed.is_ok() {
        tracing::debug!(
            target: "taskdb-telemetry",
            format = ?settings.log_format,
            "telemetry initialized"
        );
    }

    Ok(())
}

fn build_filter(rust_log: Option<&str>, configured: &str) -> anyhow::Result<EnvFilter> {
    match rust_log.filter(|value| !value.trim().is_empty()) {
        Some(value) => EnvFilter::try_new(value).map_err(|err| {
            anyhow::anyhow!("invalid {} '{}': {}", EnvFilter::DEFAULT_ENV, value, err)
        }),
        None => EnvFilter::try_new(configured)
            .map_err(|err| anyhow::anyhow!("invalid log filter '{}': {}", configured, err)),
    }
}
