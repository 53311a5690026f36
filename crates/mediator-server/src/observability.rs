use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload::{self, Handle};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

/// Handle for adjusting the log filter at runtime.
pub type FilterHandle = Handle<EnvFilter, Registry>;

/// Initialise tracing with a reloadable env filter.
///
/// `RUST_LOG` wins over the configured level so operators can raise
/// verbosity without touching the config file.
pub fn init_tracing(configured_level: &str) -> anyhow::Result<FilterHandle> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(spec) if !spec.is_empty() => EnvFilter::try_new(spec)?,
        _ => EnvFilter::try_new(configured_level)?,
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()?;

    Ok(handle)
}

/// Swap the active log filter, e.g. from an admin endpoint or signal handler.
pub fn set_log_level(handle: &FilterHandle, spec: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(spec)?;
    handle.reload(filter)?;
    tracing::info!(filter = spec, "log filter updated");
    Ok(())
}
