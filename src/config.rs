//! Engine-wide settings.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::datum::Iteration;
use crate::error::{CsError, CsResult};
use crate::grid::{GridOptions, DEFAULT_BUFFER_SIZE};

/// Settings shared by every transformation set up by one engine.
///
/// Loaded from JSON; absent fields take their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base directory for relative grid file and catalog paths.
    pub grid_directory: Option<PathBuf>,
    /// Iterative inverse stop criterion, degrees.
    pub convergence: f64,
    /// Largest residual, degrees, accepted with a warning.
    pub error_tolerance: f64,
    pub max_iterations: usize,
    /// Read buffer for grid files, bytes.
    pub grid_buffer_size: usize,
    /// Rebuild binary grid files even when they are newer than their source.
    pub regenerate_binaries: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let iteration = Iteration::default();
        Self {
            grid_directory: None,
            convergence: iteration.convergence,
            error_tolerance: iteration.error_tolerance,
            max_iterations: iteration.max_iterations,
            grid_buffer_size: DEFAULT_BUFFER_SIZE,
            regenerate_binaries: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> CsResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CsError::Config(format!("invalid JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> CsResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| CsError::io(path, e))?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> CsResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| CsError::Config(e.to_string()))
    }

    pub fn validate(&self) -> CsResult<()> {
        if !(self.convergence > 0.0) {
            return Err(CsError::Config(format!(
                "convergence must be positive, got {}",
                self.convergence
            )));
        }
        if !(self.error_tolerance >= self.convergence) {
            return Err(CsError::Config(format!(
                "error_tolerance {} is below convergence {}",
                self.error_tolerance, self.convergence
            )));
        }
        if self.max_iterations == 0 {
            return Err(CsError::Config("max_iterations must be at least 1".into()));
        }
        if self.grid_buffer_size == 0 {
            return Err(CsError::Config("grid_buffer_size must be at least 1".into()));
        }
        Ok(())
    }

    pub fn iteration(&self) -> Iteration {
        Iteration {
            convergence: self.convergence,
            error_tolerance: self.error_tolerance,
            max_iterations: self.max_iterations,
        }
    }

    pub fn grid_options(&self) -> GridOptions {
        GridOptions {
            buffer_size: self.grid_buffer_size,
            regenerate: self.regenerate_binaries,
        }
    }
}
