use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, fmt, fmt::time::OffsetTime, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::logger::{
    cloud::CloudJson, config::LoggerConfig, error::LoggerError, format::LoggerFormat,
};

/// Install the process-wide subscriber described by `cfg`.
pub(crate) fn install(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    let registry = tracing_subscriber::registry().with(level_filter(&cfg.level)?);

    match cfg.format {
        LoggerFormat::Text => {
            let layer = fmt::layer()
                .with_ansi(cfg.use_color)
                .with_target(cfg.with_targets)
                .with_timer(local_rfc3339());
            registry.with(layer).try_init()?;
        }
        LoggerFormat::Json => {
            let layer = fmt::layer()
                .with_ansi(false)
                .event_format(CloudJson::new().with_target(cfg.with_targets));
            registry.with(layer).try_init()?;
        }
        LoggerFormat::Journald => {
            #[cfg(all(target_os = "linux", feature = "journald"))]
            {
                let layer = tracing_journald::layer().map_err(LoggerError::Journald)?;
                registry.with(layer).try_init()?;
            }

            #[cfg(not(all(target_os = "linux", feature = "journald")))]
            return Err(LoggerError::JournaldUnavailable);
        }
    }
    Ok(())
}

/// Parse a `LOG_LEVEL` value (`info`, `idler_core=debug,warn`, ...).
pub(crate) fn level_filter(level: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(level).map_err(|e| LoggerError::InvalidLevel {
        value: level.to_string(),
        reason: e.to_string(),
    })
}

/// RFC 3339 timestamps in the host's offset; UTC when the offset cannot be determined.
fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}
