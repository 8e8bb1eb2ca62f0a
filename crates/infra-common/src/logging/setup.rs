use crate::errors::types::{Error, Result};
use serde::Deserialize;
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use when `RUST_LOG` does not say otherwise
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::WARN,
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }
}

/// The `[logging]` section of a configuration file
///
/// Every field is optional; unset fields leave the corresponding
/// [`LoggingConfig`] value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
    pub json: Option<bool>,
    pub file_info: Option<bool>,
    pub spans: Option<bool>,
}

impl LoggingSection {
    /// Apply this section on top of an existing configuration
    pub fn apply(&self, mut config: LoggingConfig) -> Result<LoggingConfig> {
        if let Some(level) = &self.level {
            config.level = parse_log_level(level)?;
        }
        if let Some(json) = self.json {
            config.json = json;
        }
        if let Some(file_info) = self.file_info {
            config.file_info = file_info;
        }
        if let Some(spans) = self.spans {
            config.log_spans = spans;
        }
        Ok(config)
    }
}

/// Set up the logging system with the provided configuration
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(config.level.into())
        .from_env_lossy();

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_writer(std::io::stderr)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        subscriber.json().try_init()
    } else {
        subscriber.try_init()
    };

    installed.map_err(|e| Error::Logging(e.to_string()))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level.trim())
        .map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level(" WARN ").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_section_overrides_only_set_fields() {
        let section = LoggingSection {
            level: Some("info".to_string()),
            json: Some(true),
            ..Default::default()
        };

        let config = section.apply(LoggingConfig::default().with_file_info()).unwrap();
        assert_eq!(config.level, Level::INFO);
        assert!(config.json);
        assert!(config.file_info);
        assert!(!config.log_spans);
    }

    #[test]
    fn test_section_rejects_bad_level() {
        let section = LoggingSection {
            level: Some("loud".to_string()),
            ..Default::default()
        };
        assert!(section.apply(LoggingConfig::default()).is_err());
    }
}
