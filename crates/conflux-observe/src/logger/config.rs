use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::{error::LoggerError, format::LoggerFormat};

/// Environment variable holding the level filter (`EnvFilter` syntax).
pub const ENV_LEVEL: &str = "CONFLUX_LOG";
/// Environment variable selecting the output format.
pub const ENV_FORMAT: &str = "CONFLUX_LOG_FORMAT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// Level filter, e.g. `"info"` or `"conflux_exec=trace,info"`.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
    /// Emit an event when a span closes, carrying its busy and idle time.
    pub span_timings: bool,
}

impl LoggerConfig {
    /// Defaults overridden by `CONFLUX_LOG` and `CONFLUX_LOG_FORMAT` when set.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, LoggerError> {
        let mut cfg = Self::default();
        if let Some(level) = lookup(ENV_LEVEL) {
            cfg.level = level;
        }
        if let Some(format) = lookup(ENV_FORMAT) {
            cfg.format = format.parse()?;
        }
        Ok(cfg)
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
            span_timings: false,
        }
    }
}
