//! Subscriber construction

use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, Format};
use crate::error::{LogError, LogResult};

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Keeps the root span entered for as long as it lives
#[derive(Debug)]
pub struct LoggerGuard {
    _root_span: Option<tracing::span::EnteredSpan>,
}

impl LoggerBuilder {
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Filter built from the configured directives
    fn filter(&self) -> LogResult<EnvFilter> {
        EnvFilter::try_new(&self.config.level)
            .map_err(|e| LogError::Filter(format!("{}: {}", self.config.level, e)))
    }

    /// Install the global subscriber.
    ///
    /// # Errors
    ///
    /// Fails if the filter cannot be parsed or a subscriber is already set.
    pub fn build(self) -> LogResult<LoggerGuard> {
        let filter = self.filter()?;
        let registry = Registry::default().with(filter);
        let Config {
            format,
            ansi,
            target,
            ..
        } = self.config;

        let installed = match format {
            Format::Pretty => registry
                .with(
                    fmt::layer()
                        .pretty()
                        .with_ansi(ansi)
                        .with_target(target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            Format::Compact => registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_ansi(ansi)
                        .with_target(target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
            Format::Json => registry
                .with(
                    fmt::layer()
                        .json()
                        .flatten_event(true)
                        .with_current_span(true)
                        .with_span_list(false)
                        .with_target(target)
                        .with_writer(std::io::stderr),
                )
                .try_init(),
        };
        installed.map_err(|e| LogError::Init(e.to_string()))?;

        let root_span = self
            .config
            .service
            .as_deref()
            .map(|service| tracing::info_span!("app", service).entered());

        Ok(LoggerGuard {
            _root_span: root_span,
        })
    }
}
