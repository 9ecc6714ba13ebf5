pub mod config;

use std::{fs::OpenOptions, sync::Mutex};

use dift_core::error::DiftError;
pub use tracing::{
    debug, debug_span, error, error_span, event, info, info_span, span, trace,
    trace_span, warn, warn_span, Level, Subscriber,
};
use tracing_subscriber::{
    filter::Directive, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
    Layer,
};

use crate::config::Config;

use self::config::LogConfig;

/// Target prefix of every event emitted by the taint engine.
pub const ENGINE_TARGET: &str = "dift_analysis";

static INIT_ONCE: std::sync::Once = std::sync::Once::new();

impl LogConfig {
    /// `RUST_LOG` if set, else `level`; the engine level, if any, is added
    /// on top for the engine's targets.
    fn filter(&self, level: &str) -> Result<EnvFilter, DiftError> {
        let mut filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .map_err(|e| DiftError::Config(format!("invalid log level {}: {}", level, e)))?;
        if let Some(engine_level) = &self.engine_level {
            let directive: Directive = format!("{}={}", ENGINE_TARGET, engine_level)
                .parse()
                .map_err(|e| {
                    DiftError::Config(format!("invalid engine level {}: {}", engine_level, e))
                })?;
            filter = filter.add_directive(directive);
        }
        Ok(filter)
    }

    /// Install the global subscriber: a console layer on stderr, so that
    /// reports written to stdout stay clean, and an optional JSON file layer.
    /// Only the first call in a process installs anything.
    pub fn init(&self) -> Result<(), DiftError> {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(self.filter(&self.console_level)?);

        let file_layer = match &self.file {
            Some(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(Mutex::new(file))
                        .with_filter(self.filter(&self.file_level)?),
                )
            }
            None => None,
        };

        let mut result = Ok(());
        INIT_ONCE.call_once(|| {
            result = tracing_subscriber::registry()
                .with(console_layer)
                .with(file_layer)
                .try_init()
                .map_err(|e| DiftError::Config(format!("failed to install logger: {}", e)));
        });
        result
    }
}

pub fn init_logging_with_config(cfg: LogConfig) -> Result<(), DiftError> {
    cfg.init()
}

/// Load the `log` section (`DIFT_CONFIG` file and `DIFT_LOG__*` variables)
/// and install the subscriber.
pub fn must_init_logging() {
    init_logging_with_config(LogConfig::must_load()).expect("failed to initialize logging");
}
