//! Instrument configuration files.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::instrument::Instrument;

use super::validation::ConfigError;

/// A list of instrument definitions, as found in an include file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentsConfig {
    #[serde(default)]
    pub instruments: Vec<Instrument>,
}

impl InstrumentsConfig {
    /// Merge another InstrumentsConfig into this one.
    #[must_use]
    pub fn merge(mut self, other: InstrumentsConfig) -> Self {
        self.instruments.extend(other.instruments);
        self
    }

    /// Validate all instrument definitions.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen_ids = HashSet::new();

        for instrument in &self.instruments {
            if !seen_ids.insert(instrument.id.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate instrument id: '{}'",
                    instrument.id
                )));
            }
            instrument.validate().map_err(ConfigError::ValidationError)?;
        }

        Ok(())
    }

    /// Load instrument definitions from all YAML files in a directory.
    ///
    /// Files are read in file-name order so the merged list is stable.
    pub fn load_from_dir(dir_path: &str) -> Result<Self, ConfigError> {
        let dir = Path::new(dir_path);
        if !dir.exists() {
            return Err(ConfigError::ValidationError(format!(
                "instrument_path '{}' does not exist",
                dir_path
            )));
        }
        if !dir.is_dir() {
            return Err(ConfigError::ValidationError(format!(
                "instrument_path '{}' is not a directory",
                dir_path
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext == "yaml" || ext == "yml" {
                paths.push(path);
            }
        }
        paths.sort();

        let mut merged = Self::default();
        for path in paths {
            tracing::debug!("Loading instrument config from: {}", path.display());
            let content = std::fs::read_to_string(&path)?;
            let file_config: Self = serde_yaml::from_str(&content).map_err(|e| {
                ConfigError::ValidationError(format!("failed to parse '{}': {}", path.display(), e))
            })?;
            merged = merged.merge(file_config);
        }

        Ok(merged)
    }
}
