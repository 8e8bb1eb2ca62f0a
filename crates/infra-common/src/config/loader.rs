use crate::errors::types::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Parse a configuration value from TOML text
pub fn load_toml_str<T: DeserializeOwned>(text: &str) -> Result<T> {
    Ok(toml::from_str(text)?)
}

/// Read and parse a TOML configuration file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    load_toml_str(&text)
}

/// Resolves which configuration file (if any) should be loaded
///
/// An explicitly requested path must exist. Otherwise the first existing
/// candidate wins, and having no file at all is not an error.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
    candidates: Vec<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader with no candidates
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a path given on the command line
    pub fn with_explicit(mut self, path: Option<PathBuf>) -> Self {
        self.explicit = path;
        self
    }

    /// Add a fallback location, checked in insertion order
    pub fn with_candidate(mut self, path: impl Into<PathBuf>) -> Self {
        self.candidates.push(path.into());
        self
    }

    /// The file that would be loaded
    pub fn resolve(&self) -> Option<PathBuf> {
        if let Some(path) = &self.explicit {
            return Some(path.clone());
        }
        self.candidates.iter().find(|p| p.is_file()).cloned()
    }

    /// Load the resolved file, or the type's default when there is none
    pub fn load<T: DeserializeOwned + Default>(&self) -> Result<T> {
        match self.resolve() {
            Some(path) => {
                tracing::debug!("Loading configuration from {}", path.display());
                load_toml(&path)
            }
            None => Ok(T::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    #[serde(default)]
    struct Sample {
        name: String,
        enabled: bool,
    }

    #[test]
    fn test_load_toml_str() {
        let sample: Sample = load_toml_str("name = \"x\"\nenabled = true\n").unwrap();
        assert_eq!(sample, Sample { name: "x".to_string(), enabled: true });
    }

    #[test]
    fn test_parse_error_is_reported() {
        let result: Result<Sample> = load_toml_str("name = ");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn test_missing_candidates_fall_back_to_default() {
        let loader = ConfigLoader::new().with_candidate("/nonexistent/callwatch.toml");
        assert!(loader.resolve().is_none());
        let sample: Sample = loader.load().unwrap();
        assert_eq!(sample, Sample::default());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let loader = ConfigLoader::new()
            .with_explicit(Some(PathBuf::from("/nonexistent/explicit.toml")));
        let result: Result<Sample> = loader.load();
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }
}
