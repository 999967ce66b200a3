//! Geodetic (datum) transformations.
//!
//! Points are `[lng, lat]` or `[lng, lat, h]` with angles in degrees and
//! heights in metres. Every method has a closed-form 3-D forward; the 2-D
//! inverse is solved by fixed-point iteration on the 2-D forward unless a
//! method supplies something better.

pub mod grid_shift;
pub mod molodensky;
pub mod null;
pub mod registry;
pub mod similarity;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::{CsError, CsResult, ShiftStatus};
use crate::grid::provider::{FileProvider, OsFileProvider};
use crate::grid::GridOptions;
use crate::proj::common::adj_lng_deg;
use crate::proj::ellipsoid::EllipsoidDef;

pub use registry::{lookup, setup, XfrmEntry};

/// Controls of the iterative inverses.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    /// Residual, degrees, below which the iteration stops.
    pub convergence: f64,
    /// Residual, degrees, still accepted (with a warning) when the
    /// iteration limit is reached.
    pub error_tolerance: f64,
    pub max_iterations: usize,
}

impl Default for Iteration {
    fn default() -> Self {
        Self {
            convergence: 1.0e-9,
            error_tolerance: 5.0e-8,
            max_iterations: 20,
        }
    }
}

/// Solve `forward(p) = target` for p by repeatedly correcting the guess
/// with the residual.
pub(crate) fn iterate_inverse<F>(
    target: [f64; 2],
    iteration: &Iteration,
    mut forward: F,
) -> CsResult<([f64; 2], ShiftStatus)>
where
    F: FnMut([f64; 2]) -> CsResult<[f64; 2]>,
{
    let mut guess = target;
    let mut residual = f64::INFINITY;
    for _ in 0..iteration.max_iterations {
        let out = forward(guess)?;
        let d_lng = adj_lng_deg(out[0] - target[0]);
        let d_lat = out[1] - target[1];
        residual = d_lng.abs().max(d_lat.abs());
        if residual < iteration.convergence {
            return Ok((guess, ShiftStatus::Normal));
        }
        guess = [guess[0] - d_lng, guess[1] - d_lat];
    }

    if residual <= iteration.error_tolerance {
        warn!(
            "inverse of ({}, {}) stopped after {} iterations, residual {residual:e}",
            target[0], target[1], iteration.max_iterations
        );
        Ok((guess, ShiftStatus::Unconverged))
    } else {
        Err(CsError::NoConvergence {
            iterations: iteration.max_iterations,
            residual,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    #[serde(alias = "FWD")]
    Forward,
    #[serde(alias = "INV")]
    Inverse,
}

impl Direction {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "FWD" | "FORWARD" => Some(Direction::Forward),
            "INV" | "INVERSE" => Some(Direction::Inverse),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Direction::Forward => "FWD",
            Direction::Inverse => "INV",
        }
    }
}

/// One set-up geodetic transformation.
///
/// Grid-based methods keep file handles and cell caches between calls,
/// hence `&mut self` throughout.
pub trait GeodeticTransform: Send {
    fn forward3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)>;

    fn inverse3(&mut self, llh: [f64; 3]) -> CsResult<([f64; 3], ShiftStatus)>;

    /// Controls used by the default 2-D inverse.
    fn iteration(&self) -> Iteration;

    /// The 3-D forward on the ellipsoid surface, height discarded.
    fn forward2(&mut self, ll: [f64; 2]) -> CsResult<([f64; 2], ShiftStatus)> {
        let (out, status) = self.forward3([ll[0], ll[1], 0.0])?;
        Ok(([out[0], out[1]], status))
    }

    fn inverse2(&mut self, ll: [f64; 2]) -> CsResult<([f64; 2], ShiftStatus)> {
        let iteration = self.iteration();
        iterate_inverse(ll, &iteration, |guess| Ok(self.forward2(guess)?.0))
    }

    fn apply2(&mut self, ll: [f64; 2], direction: Direction) -> CsResult<([f64; 2], ShiftStatus)> {
        match direction {
            Direction::Forward => self.forward2(ll),
            Direction::Inverse => self.inverse2(ll),
        }
    }

    fn is_null(&self) -> bool {
        false
    }

    /// Drop file handles and buffers held for grid lookups.
    fn release(&mut self) {}
}

/// A grid file referenced by a transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridFileRef {
    pub path: PathBuf,
    /// Format key; detected from the file name when absent.
    #[serde(default)]
    pub format: Option<String>,
}

/// Dictionary form of a geodetic transformation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XfrmDef {
    pub key_name: String,
    pub description: String,
    /// Registry key of the method, e.g. "7PARAM".
    pub method: String,
    pub src_ellipsoid: EllipsoidDef,
    pub trg_ellipsoid: EllipsoidDef,
    /// Geocentric translation, metres.
    pub delta_x: f64,
    pub delta_y: f64,
    pub delta_z: f64,
    /// Rotations, arc-seconds, coordinate frame convention.
    pub rot_x: f64,
    pub rot_y: f64,
    pub rot_z: f64,
    /// Scale difference, parts per million.
    pub scale_ppm: f64,
    pub grid_files: Vec<GridFileRef>,
    /// Datum catalog listing grid files, appended after `grid_files`.
    pub catalog: Option<PathBuf>,
    /// Used where no grid file covers a point.
    pub fallback: Option<Box<XfrmDef>>,
    pub max_iterations: Option<usize>,
    pub convergence: Option<f64>,
    pub error_tolerance: Option<f64>,
}

impl Default for XfrmDef {
    fn default() -> Self {
        Self {
            key_name: String::new(),
            description: String::new(),
            method: String::new(),
            src_ellipsoid: EllipsoidDef::Named("WGS84".into()),
            trg_ellipsoid: EllipsoidDef::Named("WGS84".into()),
            delta_x: 0.0,
            delta_y: 0.0,
            delta_z: 0.0,
            rot_x: 0.0,
            rot_y: 0.0,
            rot_z: 0.0,
            scale_ppm: 0.0,
            grid_files: Vec::new(),
            catalog: None,
            fallback: None,
            max_iterations: None,
            convergence: None,
            error_tolerance: None,
        }
    }
}

impl XfrmDef {
    pub fn new(key_name: &str, method: &str) -> Self {
        Self {
            key_name: key_name.to_string(),
            method: method.to_string(),
            ..Default::default()
        }
    }

    pub fn delta(&self) -> [f64; 3] {
        [self.delta_x, self.delta_y, self.delta_z]
    }

    pub fn rotation(&self) -> [f64; 3] {
        [self.rot_x, self.rot_y, self.rot_z]
    }

    /// Iteration controls: the definition's overrides on top of `base`.
    pub fn iteration(&self, base: Iteration) -> Iteration {
        Iteration {
            convergence: self.convergence.unwrap_or(base.convergence),
            error_tolerance: self.error_tolerance.unwrap_or(base.error_tolerance),
            max_iterations: self.max_iterations.unwrap_or(base.max_iterations),
        }
    }
}

/// Engine-wide inputs to transformation setup.
#[derive(Clone)]
pub struct SetupContext {
    pub iteration: Iteration,
    pub grid_options: GridOptions,
    /// Base for relative grid file and catalog paths.
    pub grid_directory: Option<PathBuf>,
    pub provider: Arc<dyn FileProvider>,
}

impl Default for SetupContext {
    fn default() -> Self {
        Self {
            iteration: Iteration::default(),
            grid_options: GridOptions::default(),
            grid_directory: None,
            provider: Arc::new(OsFileProvider),
        }
    }
}

impl SetupContext {
    pub fn new(config: &EngineConfig, provider: Arc<dyn FileProvider>) -> Self {
        Self {
            iteration: config.iteration(),
            grid_options: config.grid_options(),
            grid_directory: config.grid_directory.clone(),
            provider,
        }
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.grid_directory {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iterate_inverse_linear() {
        // forward shifts by a small position-dependent amount
        let forward = |p: [f64; 2]| Ok([p[0] + 0.001 + 1e-4 * p[1], p[1] - 0.002 + 1e-4 * p[0]]);
        let target = forward([10.0, 50.0]).unwrap();
        let (found, status) = iterate_inverse(target, &Iteration::default(), forward).unwrap();
        assert_eq!(status, ShiftStatus::Normal);
        assert_relative_eq!(found[0], 10.0, epsilon = 1e-9);
        assert_relative_eq!(found[1], 50.0, epsilon = 1e-9);
    }

    #[test]
    fn test_iterate_inverse_soft_and_hard_failure() {
        // Contracts by only half each step: needs many iterations.
        let slow = |p: [f64; 2]| Ok([2.0 * p[0], 2.0 * p[1]]);
        let tight = Iteration {
            max_iterations: 3,
            ..Iteration::default()
        };
        assert!(matches!(
            iterate_inverse([1.0, 1.0], &tight, slow),
            Err(CsError::NoConvergence { iterations: 3, .. })
        ));

        let loose = Iteration {
            max_iterations: 3,
            error_tolerance: 10.0,
            ..Iteration::default()
        };
        let (_, status) = iterate_inverse([1.0, 1.0], &loose, slow).unwrap();
        assert_eq!(status, ShiftStatus::Unconverged);
    }

    #[test]
    fn test_iterate_inverse_across_antimeridian() {
        let forward = |p: [f64; 2]| Ok([adj_lng_deg(p[0] + 0.5), p[1]]);
        let (found, _) = iterate_inverse([-179.8, 0.0], &Iteration::default(), forward).unwrap();
        assert_relative_eq!(adj_lng_deg(found[0] - 179.7), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_direction_keywords() {
        assert_eq!(Direction::from_keyword("fwd"), Some(Direction::Forward));
        assert_eq!(Direction::from_keyword(" INV "), Some(Direction::Inverse));
        assert_eq!(Direction::from_keyword("sideways"), None);
        assert_eq!(Direction::Inverse.keyword(), "INV");
    }

    #[test]
    fn test_xfrm_def_from_json() {
        let def: XfrmDef = serde_json::from_str(
            r#"{"key_name": "NAD27_to_WGS84", "method": "3PARAM",
                "src_ellipsoid": "CLRK66", "delta_x": -8.0, "delta_y": 160.0,
                "delta_z": 176.0, "max_iterations": 5}"#,
        )
        .unwrap();
        assert_eq!(def.delta(), [-8.0, 160.0, 176.0]);
        assert_eq!(def.trg_ellipsoid, EllipsoidDef::Named("WGS84".into()));
        let it = def.iteration(Iteration::default());
        assert_eq!(it.max_iterations, 5);
        assert_relative_eq!(it.convergence, 1.0e-9);
    }
}
