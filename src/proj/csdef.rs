//! Coordinate system definitions and their quality check.
//!
//! A `CsDef` is the dictionary form of a coordinate system. Before it can be
//! set up it is run through [`quality_check`], which reports every problem it
//! finds rather than stopping at the first.

use serde::{Deserialize, Serialize};

use crate::proj::ellipsoid::EllipsoidDef;
use crate::proj::registry;

/// Smallest and largest scale reduction factor accepted by projections
/// that use one.
pub const SCL_RED_MIN: f64 = 0.75;
pub const SCL_RED_MAX: f64 = 1.10;

/// Maximum number of zones in an interrupted projection.
pub const MAX_ZONES: usize = 8;

/// One zone of an interrupted projection. Longitudes in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub west: f64,
    pub central: f64,
    pub east: f64,
    /// Zone applies to the southern hemisphere.
    #[serde(default)]
    pub south: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsDef {
    pub key_name: String,
    pub description: String,
    /// Registry key of the projection method, e.g. "TM".
    pub projection: String,
    pub ellipsoid: EllipsoidDef,
    /// Origin longitude (central meridian), degrees.
    pub org_lng: f64,
    /// Origin latitude, degrees.
    pub org_lat: f64,
    /// Scale reduction factor at the origin.
    pub scl_red: f64,
    pub false_easting: f64,
    pub false_northing: f64,
    /// Axis orientation code, see [`Quadrant`].
    pub quad: i16,
    /// Size of one system unit in metres (degrees for geographic systems).
    pub unit_factor: f64,
    pub map_scale: f64,
    pub std_parallel_1: Option<f64>,
    pub std_parallel_2: Option<f64>,
    /// UTM zone number.
    pub zone: i32,
    /// UTM hemisphere: 1 north, -1 south, 0 unspecified (north).
    pub hemisphere: i32,
    pub zones: Vec<ZoneDef>,
    /// Geographic useful range, degrees.
    pub ll_min: Option<[f64; 2]>,
    pub ll_max: Option<[f64; 2]>,
    /// Cartesian useful range, system units.
    pub xy_min: Option<[f64; 2]>,
    pub xy_max: Option<[f64; 2]>,
}

impl Default for CsDef {
    fn default() -> Self {
        Self {
            key_name: String::new(),
            description: String::new(),
            projection: String::new(),
            ellipsoid: EllipsoidDef::Named("WGS84".into()),
            org_lng: 0.0,
            org_lat: 0.0,
            scl_red: 1.0,
            false_easting: 0.0,
            false_northing: 0.0,
            quad: 1,
            unit_factor: 1.0,
            map_scale: 1.0,
            std_parallel_1: None,
            std_parallel_2: None,
            zone: 0,
            hemisphere: 0,
            zones: Vec::new(),
            ll_min: None,
            ll_max: None,
            xy_min: None,
            xy_max: None,
        }
    }
}

impl CsDef {
    pub fn new(key_name: &str, projection: &str) -> Self {
        Self {
            key_name: key_name.to_string(),
            projection: projection.to_string(),
            ..Default::default()
        }
    }

    /// Linear scale from ellipsoid metres to system units.
    pub fn unit_scale(&self) -> f64 {
        1.0 / (self.unit_factor * self.map_scale)
    }
}

/// Problems a quality check can report.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QcError {
    UnknownProjection,
    OrgLng,
    OrgLat,
    SclRed,
    Quad,
    Units,
    MapScale,
    StdParallel,
    StdParallelSymmetric,
    Zone,
    Hemisphere,
    ZoneCount,
    ZoneDefinition,
    LatTrueScale,
    LlBounds,
    XyBounds,
    // Geodetic transform definitions
    UnknownTransform,
    Ellipsoid,
    Translation,
    Rotation,
    BwScale,
    GridFiles,
    IterationLimits,
}

/// Collects quality-check errors into an optional caller-supplied list of
/// bounded capacity while counting all of them.
pub struct QcSink<'a> {
    errors: Option<&'a mut Vec<QcError>>,
    capacity: usize,
    count: usize,
}

impl<'a> QcSink<'a> {
    pub fn new(errors: Option<&'a mut Vec<QcError>>, capacity: usize) -> Self {
        Self {
            errors,
            capacity,
            count: 0,
        }
    }

    pub fn push(&mut self, err: QcError) {
        if self.count < self.capacity {
            if let Some(list) = self.errors.as_deref_mut() {
                list.push(err);
            }
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

/// Run the quality check on `def`.
///
/// Errors are appended to `errors` (if given) up to `capacity` entries; the
/// return value is the total number of errors found, whether or not they fit.
/// `None` with a capacity of zero simply counts.
pub fn quality_check(def: &CsDef, errors: Option<&mut Vec<QcError>>, capacity: usize) -> usize {
    let mut sink = QcSink::new(errors, capacity);
    check_common(def, &mut sink);
    match registry::lookup(&def.projection) {
        Some(entry) => (entry.check)(def, &mut sink),
        None => sink.push(QcError::UnknownProjection),
    }
    sink.count()
}

/// Convenience wrapper returning every error found.
pub fn check_all(def: &CsDef) -> Vec<QcError> {
    let mut list = Vec::new();
    quality_check(def, Some(&mut list), usize::MAX);
    list
}

fn check_common(def: &CsDef, sink: &mut QcSink<'_>) {
    if !(def.org_lng > -180.0 && def.org_lng <= 180.0) {
        sink.push(QcError::OrgLng);
    }
    if !(-90.0..=90.0).contains(&def.org_lat) {
        sink.push(QcError::OrgLat);
    }
    if !(-4..=4).contains(&def.quad) {
        sink.push(QcError::Quad);
    }
    if !(def.unit_factor > 0.0) {
        sink.push(QcError::Units);
    }
    if !(def.map_scale > 0.0) {
        sink.push(QcError::MapScale);
    }
    if let (Some(min), Some(max)) = (def.ll_min, def.ll_max) {
        if min[0] >= max[0] || min[1] >= max[1] || min[1] < -90.0 || max[1] > 90.0 {
            sink.push(QcError::LlBounds);
        }
    }
    if let (Some(min), Some(max)) = (def.xy_min, def.xy_max) {
        if min[0] >= max[0] || min[1] >= max[1] {
            sink.push(QcError::XyBounds);
        }
    }
}

/// Shared check for projections carrying a scale reduction factor.
pub(crate) fn check_scl_red(def: &CsDef, sink: &mut QcSink<'_>) {
    if !(SCL_RED_MIN..=SCL_RED_MAX).contains(&def.scl_red) {
        sink.push(QcError::SclRed);
    }
}

/// Shared check for a standard parallel strictly between the poles.
pub(crate) fn check_parallel(lat: Option<f64>, sink: &mut QcSink<'_>) {
    match lat {
        Some(lat) if lat > -90.0 && lat < 90.0 => {}
        _ => sink.push(QcError::StdParallel),
    }
}

/// Axis orientation applied after projection math.
///
/// Codes 1 (or 0) through 4: x east/y north, x west/y north, x west/y south,
/// x east/y south. A negative code additionally swaps the axes. False origin
/// values are added in the output axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Quadrant {
    flip_x: bool,
    flip_y: bool,
    swap: bool,
}

impl Quadrant {
    pub fn from_code(code: i16) -> Self {
        let (flip_x, flip_y) = match code.abs() {
            2 => (true, false),
            3 => (true, true),
            4 => (false, true),
            _ => (false, false),
        };
        Self {
            flip_x,
            flip_y,
            swap: code < 0,
        }
    }

    pub fn is_standard(&self) -> bool {
        !self.flip_x && !self.flip_y && !self.swap
    }

    pub fn apply(&self, xx: f64, yy: f64, x_off: f64, y_off: f64) -> (f64, f64) {
        let a = if self.flip_x { -xx } else { xx };
        let b = if self.flip_y { -yy } else { yy };
        let (a, b) = if self.swap { (b, a) } else { (a, b) };
        (a + x_off, b + y_off)
    }

    pub fn remove(&self, x: f64, y: f64, x_off: f64, y_off: f64) -> (f64, f64) {
        let (a, b) = (x - x_off, y - y_off);
        let (a, b) = if self.swap { (b, a) } else { (a, b) };
        let xx = if self.flip_x { -a } else { a };
        let yy = if self.flip_y { -b } else { b };
        (xx, yy)
    }
}
