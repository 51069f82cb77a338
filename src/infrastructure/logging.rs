use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    reload,
    util::SubscriberInitExt,
    EnvFilter, Registry,
};

use crate::config::{LogFormat, LoggingConfig};
use crate::domain::DomainError;

/// Handle for changing the active log filter while the process runs
#[derive(Clone)]
pub struct LogLevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LogLevelHandle {
    /// Swap the filter for `directives` (`debug`, `info,experimentation_decisions=trace`, ...)
    pub fn set_level(&self, directives: &str) -> Result<(), DomainError> {
        let filter = EnvFilter::try_new(directives.trim()).map_err(|e| {
            DomainError::validation(format!("Invalid log level '{}': {}", directives, e))
        })?;

        self.inner
            .reload(filter)
            .map_err(|e| DomainError::internal(format!("Failed to reload log filter: {}", e)))?;

        tracing::info!(level = %directives, "Log level changed");
        Ok(())
    }

    /// The filter currently in effect
    pub fn current(&self) -> Option<String> {
        self.inner.with_current(|filter| filter.to_string()).ok()
    }
}

impl std::fmt::Debug for LogLevelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogLevelHandle")
            .field("current", &self.current())
            .finish()
    }
}

pub fn init_logging(config: &LoggingConfig) -> LogLevelHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));
    let (filter, handle) = reload::Layer::new(filter);

    match config.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_span_events(FmtSpan::CLOSE))
                .init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .pretty()
                        .with_target(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
    }

    tracing::info!("Logging initialized with level: {}", config.level);

    LogLevelHandle { inner: handle }
}
