use std::error::Error as _;

use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing::dispatcher::SetGlobalDefaultError;
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, format::FmtSpan, time::OffsetTime},
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Output stage sitting directly on the registry; the level filter wraps it.
type Output = Box<dyn Layer<Registry> + Send + Sync>;

/// Builds the subscriber described by `cfg` and installs it globally.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let filter = mk_filter(&cfg.level)?;
    let output = match cfg.format {
        LoggerFormat::Text => text_output(cfg),
        LoggerFormat::Json => json_output(cfg),
        LoggerFormat::Journald => journald_output()?,
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .map_err(as_error)
}

pub(crate) fn mk_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|_| LoggerError::InvalidLogLevel(level.to_string()))
}

fn span_events(cfg: &LoggerConfig) -> FmtSpan {
    if cfg.span_timings {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    }
}

fn text_output(cfg: &LoggerConfig) -> Output {
    fmt::layer()
        .with_ansi(cfg.use_color)
        .with_target(cfg.with_targets)
        .with_span_events(span_events(cfg))
        .with_timer(local_rfc3339())
        .boxed()
}

// Coordinator spans (`serial`, `queue-worker`, ...) are flattened into each line.
fn json_output(cfg: &LoggerConfig) -> Output {
    fmt::layer()
        .json()
        .with_ansi(false)
        .with_current_span(true)
        .with_span_list(false)
        .with_target(cfg.with_targets)
        .with_span_events(span_events(cfg))
        .with_timer(local_rfc3339())
        .boxed()
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_output() -> Result<Output, LoggerError> {
    let layer = tracing_journald::layer()
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))?;
    Ok(layer.with_syslog_identifier("conflux".to_string()).boxed())
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_output() -> Result<Output, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(e: TryInitError) -> LoggerError {
    let already_set = e
        .source()
        .is_some_and(|src| src.is::<SetGlobalDefaultError>())
        || e.to_string().contains("already");
    if already_set {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_level() {
        let err = mk_filter("conflux=notalevel").unwrap_err();
        assert_eq!(err, LoggerError::InvalidLogLevel("conflux=notalevel".into()));
    }

    #[test]
    fn accepts_directive_lists() {
        assert!(mk_filter("conflux_exec=trace,info").is_ok());
    }

    #[test]
    fn span_timings_select_close_events() {
        let cfg = LoggerConfig {
            span_timings: true,
            ..Default::default()
        };
        assert_eq!(span_events(&cfg), FmtSpan::CLOSE);
        assert_eq!(span_events(&LoggerConfig::default()), FmtSpan::NONE);
    }

    #[cfg(not(all(target_os = "linux", feature = "journald")))]
    #[test]
    fn journald_requires_feature() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Journald,
            ..Default::default()
        };
        assert_eq!(install(&cfg), Err(LoggerError::JournaldNotSupported));
    }

    #[test]
    fn installs_once() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Json,
            level: "debug".into(),
            ..Default::default()
        };
        assert!(install(&cfg).is_ok());
        tracing::debug!("subscriber installed");

        let again = install(&LoggerConfig::default());
        assert_eq!(again, Err(LoggerError::AlreadyInitialized));
    }
}
