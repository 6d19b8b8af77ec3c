//! Logging utilities
//!
//! All NextGCore libraries log through the `log` facade. Binaries call
//! [`ogs_log_init`] once at startup to install `env_logger`.

pub use log::{debug, error, info, trace, warn};

use log::LevelFilter;

/// Log levels accepted on the command line and in the `logger.level` YAML key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum OgsLogLevel {
    None,
    Fatal,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl OgsLogLevel {
    /// Parse a level name; unknown names fall back to `Info`
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "none" | "off" => Self::None,
            "fatal" => Self::Fatal,
            "error" => Self::Error,
            "warn" | "warning" => Self::Warn,
            "debug" => Self::Debug,
            "trace" => Self::Trace,
            _ => Self::Info,
        }
    }

    /// Map onto the `log` crate filter
    pub fn to_filter(self) -> LevelFilter {
        match self {
            Self::None => LevelFilter::Off,
            // `log` has no fatal level
            Self::Fatal | Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

/// Initialize logging with millisecond timestamps.
///
/// `RUST_LOG` still overrides per-module filters. Calling this twice is
/// harmless; the second call is ignored.
pub fn ogs_log_init(level: OgsLogLevel) {
    let _ = env_logger::Builder::new()
        .filter_level(level.to_filter())
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_name() {
        assert_eq!(OgsLogLevel::from_name("DEBUG"), OgsLogLevel::Debug);
        assert_eq!(OgsLogLevel::from_name("warning"), OgsLogLevel::Warn);
        assert_eq!(OgsLogLevel::from_name("bogus"), OgsLogLevel::Info);
    }

    #[test]
    fn test_level_to_filter() {
        assert_eq!(OgsLogLevel::Fatal.to_filter(), LevelFilter::Error);
        assert_eq!(OgsLogLevel::None.to_filter(), LevelFilter::Off);
        assert_eq!(OgsLogLevel::Trace.to_filter(), LevelFilter::Trace);
    }

    #[test]
    fn test_init_twice() {
        ogs_log_init(OgsLogLevel::Info);
        ogs_log_init(OgsLogLevel::Debug);
    }
}
