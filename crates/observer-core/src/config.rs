//! Observer configuration
//!
//! Read from an optional TOML file; every field has a default so an empty file
//! (or no file at all) gives the stock behaviour.
//!
//! ```toml
//! client_name = "CallObserver"
//! uniquify = true
//! recover = false
//! bus = "session"
//! colour = "auto"
//!
//! [logging]
//! level = "debug"
//! ```

use serde::Deserialize;
use std::path::PathBuf;

use callwatch_infra_common::config::{load_toml_str, ConfigLoader};
use callwatch_infra_common::logging::LoggingSection;

use crate::dispatch::ObserverFilter;
use crate::error::{ObserverError, ObserverResult};
use crate::presentation::ColourMode;

/// Default well-known name suffix of the observer client
pub const DEFAULT_CLIENT_NAME: &str = "CallObserver";

/// Which message bus to connect to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    #[default]
    Session,
    System,
}

impl std::str::FromStr for BusKind {
    type Err = ObserverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(ObserverError::config(format!("unknown bus '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObserverConfig {
    /// Name under `org.freedesktop.Telepathy.Client.`
    pub client_name: String,
    /// Append the connection's unique name so several observers can coexist
    pub uniquify: bool,
    /// Ask the dispatcher to re-deliver channels that already exist
    pub recover: bool,
    pub bus: BusKind,
    pub colour: ColourMode,
    pub logging: LoggingSection,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            uniquify: true,
            recover: false,
            bus: BusKind::default(),
            colour: ColourMode::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl ObserverConfig {
    pub fn from_toml_str(text: &str) -> ObserverResult<Self> {
        let config: Self = load_toml_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `explicit` if given, else from the first existing candidate
    pub fn load(explicit: Option<PathBuf>, candidates: &[PathBuf]) -> ObserverResult<Self> {
        let loader = candidates
            .iter()
            .fold(ConfigLoader::new().with_explicit(explicit), |loader, path| {
                loader.with_candidate(path.clone())
            });
        let config: Self = loader.load()?;
        config.validate()?;
        Ok(config)
    }

    /// The client name must be usable as the tail of a D-Bus well-known name
    pub fn validate(&self) -> ObserverResult<()> {
        if self.client_name.is_empty() {
            return Err(ObserverError::config("client_name must not be empty"));
        }
        for element in self.client_name.split('.') {
            let valid = !element.is_empty()
                && !element.starts_with(|c: char| c.is_ascii_digit())
                && element
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(ObserverError::config(format!(
                    "client_name '{}' is not a valid bus name element",
                    self.client_name
                )));
            }
        }
        Ok(())
    }

    pub fn filter(&self) -> ObserverFilter {
        ObserverFilter::call_contacts()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ObserverConfig::from_toml_str("").unwrap();
        assert_eq!(config, ObserverConfig::default());
        assert_eq!(config.client_name, "CallObserver");
        assert!(config.uniquify);
        assert!(!config.recover);
        assert_eq!(config.bus, BusKind::Session);
        assert_eq!(config.colour, ColourMode::Auto);
    }

    #[test]
    fn test_full_file() {
        let config = ObserverConfig::from_toml_str(
            r#"
            client_name = "Debug.Calls"
            uniquify = false
            recover = true
            bus = "system"
            colour = "never"

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.client_name, "Debug.Calls");
        assert!(!config.uniquify);
        assert!(config.recover);
        assert_eq!(config.bus, BusKind::System);
        assert_eq!(config.colour, ColourMode::Never);
        assert_eq!(config.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_rejects_bad_client_names() {
        for name in ["", "1abc", "a..b", "with-dash"] {
            let config = ObserverConfig {
                client_name: name.to_string(),
                ..ObserverConfig::default()
            };
            assert!(config.validate().is_err(), "{:?} should be rejected", name);
        }
    }

    #[test]
    fn test_rejects_unknown_keys() {
        assert!(ObserverConfig::from_toml_str("clientname = \"x\"").is_err());
    }

    #[test]
    fn test_bus_kind_from_str() {
        assert_eq!("System".parse::<BusKind>().unwrap(), BusKind::System);
        assert!("peer".parse::<BusKind>().is_err());
    }

    #[test]
    fn test_missing_candidates_give_defaults() {
        let config =
            ObserverConfig::load(None, &[PathBuf::from("/nonexistent/callwatch.toml")]).unwrap();
        assert_eq!(config, ObserverConfig::default());
    }
}
