//! Command-line arguments and how they combine with the config file

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use callwatch_infra_common::logging::{parse_log_level, LoggingConfig};
use callwatch_observer_core::{BusKind, ColourMode, ObserverConfig};

/// Watch Telepathy calls and print what happens to them
#[derive(Parser, Debug)]
#[command(name = "call-observer", author, version, about, long_about = None)]
pub struct Args {
    /// Client name under org.freedesktop.Telepathy.Client
    #[arg(short, long)]
    pub name: Option<String>,

    /// Register exactly under --name instead of appending the unique bus name
    #[arg(long)]
    pub no_uniquify: bool,

    /// Ask the dispatcher to deliver calls that are already running
    #[arg(long)]
    pub recover: bool,

    /// When to colour the output
    #[arg(long, value_enum)]
    pub colour: Option<ColourArg>,

    /// Message bus to watch
    #[arg(long, value_enum)]
    pub bus: Option<BusArg>,

    /// Configuration file (defaults to ~/.config/callwatch/config.toml if present)
    #[arg(short, long, env = "CALLWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level for diagnostics on stderr (error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit diagnostics as JSON
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColourArg {
    Auto,
    Always,
    Never,
}

impl From<ColourArg> for ColourMode {
    fn from(arg: ColourArg) -> Self {
        match arg {
            ColourArg::Auto => ColourMode::Auto,
            ColourArg::Always => ColourMode::Always,
            ColourArg::Never => ColourMode::Never,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BusArg {
    Session,
    System,
}

impl From<BusArg> for BusKind {
    fn from(arg: BusArg) -> Self {
        match arg {
            BusArg::Session => BusKind::Session,
            BusArg::System => BusKind::System,
        }
    }
}

impl Args {
    /// Where to look for a config file when none is given
    pub fn default_config_candidates() -> Vec<PathBuf> {
        dirs::config_dir()
            .map(|dir| vec![dir.join("callwatch").join("config.toml")])
            .unwrap_or_default()
    }

    /// Command-line flags take precedence over the file
    pub fn apply(&self, mut config: ObserverConfig) -> ObserverConfig {
        if let Some(name) = &self.name {
            config.client_name = name.clone();
        }
        if self.no_uniquify {
            config.uniquify = false;
        }
        if self.recover {
            config.recover = true;
        }
        if let Some(colour) = self.colour {
            config.colour = colour.into();
        }
        if let Some(bus) = self.bus {
            config.bus = bus.into();
        }
        config
    }

    pub fn logging(&self, config: &ObserverConfig) -> anyhow::Result<LoggingConfig> {
        let mut logging = config.logging.apply(LoggingConfig::default())?;
        if let Some(level) = &self.log_level {
            logging.level = parse_log_level(level)?;
        }
        if self.log_json {
            logging = logging.with_json();
        }
        Ok(logging)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_defaults_leave_config_untouched() {
        let args = Args::try_parse_from(["call-observer"]).unwrap();
        assert_eq!(args.apply(ObserverConfig::default()), ObserverConfig::default());
    }

    #[test]
    fn test_flags_override_file() {
        let args = Args::try_parse_from([
            "call-observer",
            "--name",
            "Debug",
            "--no-uniquify",
            "--recover",
            "--colour",
            "never",
            "--bus",
            "system",
        ])
        .unwrap();
        let config = args.apply(ObserverConfig::default());

        assert_eq!(config.client_name, "Debug");
        assert!(!config.uniquify);
        assert!(config.recover);
        assert_eq!(config.colour, ColourMode::Never);
        assert_eq!(config.bus, BusKind::System);
    }

    #[test]
    fn test_log_level_flag_beats_config() {
        let config =
            ObserverConfig::from_toml_str("[logging]\nlevel = \"info\"\njson = true").unwrap();

        let args = Args::try_parse_from(["call-observer"]).unwrap();
        let logging = args.logging(&config).unwrap();
        assert_eq!(logging.level, Level::INFO);
        assert!(logging.json);

        let args = Args::try_parse_from(["call-observer", "--log-level", "trace"]).unwrap();
        assert_eq!(args.logging(&config).unwrap().level, Level::TRACE);
    }

    #[test]
    fn test_bad_colour_is_rejected() {
        assert!(Args::try_parse_from(["call-observer", "--colour", "sometimes"]).is_err());
    }
}
