//! JSON configuration bundling the defaults of every calibration.
//!
//! Files carry a schema tag (`pnpcal.config.v1`). Any section or field left
//! out keeps its default.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::backlash::BacklashConfig;
use crate::bottom_vision::{AlignerConfig, BottomVisionSettings};
use crate::runout::RunoutCalibrationConfig;
use crate::symmetry::SymmetryParams;

pub const CONFIG_SCHEMA_V1: &str = "pnpcal.config.v1";

/// Failure to load or store a JSON document.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config schema '{found}' (expected '{expected}')")]
    Schema {
        found: String,
        expected: &'static str,
    },
}

fn default_schema() -> String {
    CONFIG_SCHEMA_V1.to_string()
}

/// Machine-wide calibration defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    #[serde(default = "default_schema")]
    pub schema: String,
    pub runout: RunoutCalibrationConfig,
    pub backlash: BacklashConfig,
    /// Machine default; packages and parts may override it.
    pub bottom_vision: BottomVisionSettings,
    pub aligner: AlignerConfig,
    /// Detector parameters of the nozzle-tip and fiducial pipelines.
    pub symmetry: SymmetryParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            runout: RunoutCalibrationConfig::default(),
            backlash: BacklashConfig::default(),
            bottom_vision: BottomVisionSettings::default(),
            aligner: AlignerConfig::default(),
            symmetry: SymmetryParams::default(),
        }
    }
}

impl CalibrationConfig {
    pub fn from_json_str(data: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(data)?;
        if config.schema != CONFIG_SCHEMA_V1 {
            return Err(ConfigError::Schema {
                found: config.schema,
                expected: CONFIG_SCHEMA_V1,
            });
        }
        Ok(config)
    }

    /// Load a configuration from a JSON file.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
