use std::io::IsTerminal;

use crate::logger::{error::LoggerError, format::LoggerFormat, log::level_filter};

/// Set by Cloud Run on every container it starts.
const CLOUD_RUN_MARKER: &str = "K_SERVICE";

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        let use_color = cfg!(test) || std::io::stdout().is_terminal();
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color,
        }
    }
}

impl LoggerConfig {
    /// Build from `LOG_LEVEL` / `LOG_FORMAT`.
    ///
    /// Without an explicit format, JSON is chosen when running under Cloud Run.
    pub fn from_env() -> Result<Self, LoggerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, LoggerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(level) = lookup("LOG_LEVEL").filter(|l| !l.trim().is_empty()) {
            level_filter(&level)?;
            cfg.level = level;
        }
        match lookup("LOG_FORMAT").filter(|f| !f.trim().is_empty()) {
            Some(format) => cfg.format = format.parse()?,
            None if lookup(CLOUD_RUN_MARKER).is_some() => cfg.format = LoggerFormat::Json,
            None => {}
        }
        if cfg.format != LoggerFormat::Text {
            cfg.use_color = false;
        }
        Ok(cfg)
    }
}
