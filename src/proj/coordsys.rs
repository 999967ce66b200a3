//! A set-up coordinate system: projection math plus quadrant, false origin,
//! units and useful range, behind one degree-based interface.

use log::debug;
use rayon::prelude::*;

use crate::error::{CsError, CsResult, Status};
use crate::proj::common::{adj_lng_deg, numeric_convergence, numeric_h, numeric_k};
use crate::proj::csdef::{check_all, CsDef, Quadrant};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::{self, MethodEntry, SetupArgs};
use crate::proj::Projection;

/// Points per edge when densifying lines and boundaries.
const DENSIFY: usize = 32;

/// Keeps boundary samples off the back meridian, where both edges of the
/// map coincide.
const EDGE_NUDGE: f64 = 1.0e-9;

pub struct CoordSys {
    def: CsDef,
    method: &'static MethodEntry,
    proj: Box<dyn Projection>,
    quadrant: Quadrant,
    x_off: f64,
    y_off: f64,
    unit_scale: f64,
    ll_min: [f64; 2],
    ll_max: [f64; 2],
    xy_min: [f64; 2],
    xy_max: [f64; 2],
}

impl std::fmt::Debug for CoordSys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordSys")
            .field("key_name", &self.def.key_name)
            .field("method", &self.method.key)
            .field("ll_min", &self.ll_min)
            .field("ll_max", &self.ll_max)
            .finish()
    }
}

impl CoordSys {
    /// Quality-check `def` and set up its projection.
    pub fn new(def: CsDef) -> CsResult<Self> {
        let method = registry::lookup(&def.projection)
            .ok_or_else(|| CsError::UnknownProjection(def.projection.clone()))?;
        let errors = check_all(&def);
        if !errors.is_empty() {
            return Err(CsError::InvalidDefinition {
                name: def.key_name.clone(),
                errors,
            });
        }

        let ellipsoid = def.ellipsoid.resolve()?;
        let unit_scale = def.unit_scale();
        let proj = (method.setup)(&SetupArgs {
            def: &def,
            ellipsoid,
            unit_scale,
        })?;

        let (x_off, y_off) = proj
            .fixed_false_origin()
            .unwrap_or((def.false_easting, def.false_northing));
        let (ll_min, ll_max) = match (def.ll_min, def.ll_max) {
            (Some(min), Some(max)) => (min, max),
            _ => proj.default_ll_bounds(),
        };

        let mut cs = Self {
            quadrant: Quadrant::from_code(def.quad),
            def,
            method,
            proj,
            x_off,
            y_off,
            unit_scale,
            ll_min,
            ll_max,
            xy_min: [0.0; 2],
            xy_max: [0.0; 2],
        };
        let (xy_min, xy_max) = match (cs.def.xy_min, cs.def.xy_max) {
            (Some(min), Some(max)) => (min, max),
            _ => cs.project_ll_bounds(),
        };
        cs.xy_min = xy_min;
        cs.xy_max = xy_max;

        debug!(
            "set up {} ({}): ll {:?}..{:?}, xy {:?}..{:?}",
            cs.def.key_name, method.key, cs.ll_min, cs.ll_max, cs.xy_min, cs.xy_max
        );
        Ok(cs)
    }

    pub fn def(&self) -> &CsDef {
        &self.def
    }

    pub fn method(&self) -> &'static MethodEntry {
        self.method
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        self.proj.ellipsoid()
    }

    pub fn is_geographic(&self) -> bool {
        self.method
            .flags
            .contains(registry::MethodFlags::GEOGRAPHIC)
    }

    /// Longitude/latitude (degrees) to x/y in system units.
    pub fn ll2cs(&self, ll: [f64; 2]) -> ([f64; 2], Status) {
        let (xx, yy, status) = self.proj.forward(ll[0].to_radians(), ll[1].to_radians());
        let (x, y) = self.quadrant.apply(xx, yy, self.x_off, self.y_off);
        ([x, y], status)
    }

    /// x/y in system units to longitude/latitude (degrees).
    pub fn cs2ll(&self, xy: [f64; 2]) -> ([f64; 2], Status) {
        let (xx, yy) = self.quadrant.remove(xy[0], xy[1], self.x_off, self.y_off);
        let (lng, lat, status) = self.proj.inverse(xx, yy);
        ([lng.to_degrees(), lat.to_degrees()], status)
    }

    /// Forward conversion with input and output sharing storage.
    pub fn ll2cs_in_place(&self, pt: &mut [f64; 2]) -> Status {
        let (xy, status) = self.ll2cs(*pt);
        *pt = xy;
        status
    }

    /// Inverse conversion with input and output sharing storage.
    pub fn cs2ll_in_place(&self, pt: &mut [f64; 2]) -> Status {
        let (ll, status) = self.cs2ll(*pt);
        *pt = ll;
        status
    }

    /// Forward conversion of a batch in place, in parallel. Returns the
    /// worst status encountered.
    pub fn ll2cs_batch(&self, points: &mut [[f64; 2]]) -> Status {
        points
            .par_iter_mut()
            .map(|pt| self.ll2cs_in_place(pt))
            .reduce(|| Status::Normal, Status::worst)
    }

    /// Inverse conversion of a batch in place, in parallel.
    pub fn cs2ll_batch(&self, points: &mut [[f64; 2]]) -> Status {
        points
            .par_iter_mut()
            .map(|pt| self.cs2ll_in_place(pt))
            .reduce(|| Status::Normal, Status::worst)
    }

    /// Forward in radians with quadrant applied, for finite differences.
    fn grid_xy(&self, lng: f64, lat: f64) -> (f64, f64) {
        let (xx, yy, _) = self.proj.forward(lng, lat);
        self.quadrant.apply(xx, yy, 0.0, 0.0)
    }

    fn raw_xy(&self, lng: f64, lat: f64) -> (f64, f64) {
        let (x, y, _) = self.proj.forward(lng, lat);
        (x, y)
    }

    /// Scale along the parallel at a point (degrees).
    pub fn scale_k(&self, ll: [f64; 2]) -> f64 {
        let (lng, lat) = (ll[0].to_radians(), ll[1].to_radians());
        self.proj.scale_k(lng, lat).unwrap_or_else(|| {
            numeric_k(self.ellipsoid(), self.unit_scale, lng, lat, |l, p| {
                self.raw_xy(l, p)
            })
        })
    }

    /// Scale along the meridian at a point (degrees).
    pub fn scale_h(&self, ll: [f64; 2]) -> f64 {
        let (lng, lat) = (ll[0].to_radians(), ll[1].to_radians());
        self.proj.scale_h(lng, lat).unwrap_or_else(|| {
            numeric_h(self.ellipsoid(), self.unit_scale, lng, lat, |l, p| {
                self.raw_xy(l, p)
            })
        })
    }

    /// Point scale: the parallel scale, which for conformal systems is the
    /// scale in every direction.
    pub fn scale(&self, ll: [f64; 2]) -> f64 {
        self.scale_k(ll)
    }

    /// Grid convergence in degrees, positive when grid north lies east of
    /// true north. Axis flips and swaps are honoured.
    pub fn convergence(&self, ll: [f64; 2]) -> f64 {
        let (lng, lat) = (ll[0].to_radians(), ll[1].to_radians());
        let analytic = if self.quadrant.is_standard() {
            self.proj.convergence(lng, lat)
        } else {
            None
        };
        analytic.unwrap_or_else(|| numeric_convergence(lng, lat, |l, p| self.grid_xy(l, p)))
    }

    /// Domain check of geographic input (degrees). One point is checked as a
    /// point, two as a line, three or more as a closed region.
    pub fn ll_check(&self, points: &[[f64; 2]]) -> Status {
        match points {
            [] => Status::Normal,
            [pt] => self.ll_point_status(*pt),
            [a, b] => self.ll_line_status(*a, *b),
            _ => closed_edges(points).fold(Status::Normal, |status, (a, b)| {
                status.worst(self.ll_line_status(a, b))
            }),
        }
    }

    /// Domain check of cartesian input (system units), same conventions as
    /// [`CoordSys::ll_check`].
    pub fn xy_check(&self, points: &[[f64; 2]]) -> Status {
        match points {
            [] => Status::Normal,
            [pt] => self.xy_point_status(*pt),
            [a, b] => self.xy_line_status(*a, *b),
            _ => closed_edges(points).fold(Status::Normal, |status, (a, b)| {
                status.worst(self.xy_line_status(a, b))
            }),
        }
    }

    fn ll_point_status(&self, pt: [f64; 2]) -> Status {
        self.proj.ll_domain(pt[0].to_radians(), pt[1].to_radians())
    }

    fn ll_line_status(&self, a: [f64; 2], b: [f64; 2]) -> Status {
        if self.proj.has_back_meridian_cut() && self.crosses_back_meridian(a[0], b[0]) {
            return Status::Range;
        }
        densify(a, b).fold(Status::Normal, |status, pt| {
            status.worst(self.ll_point_status(pt))
        })
    }

    fn xy_point_status(&self, pt: [f64; 2]) -> Status {
        let (xx, yy) = self.quadrant.remove(pt[0], pt[1], self.x_off, self.y_off);
        self.proj.xy_domain(xx, yy)
    }

    fn xy_line_status(&self, a: [f64; 2], b: [f64; 2]) -> Status {
        densify(a, b).fold(Status::Normal, |status, pt| {
            status.worst(self.xy_point_status(pt))
        })
    }

    /// Whether the longitude span from `a` to `b` (degrees, not wrapped)
    /// strictly contains the meridian opposite the central meridian.
    fn crosses_back_meridian(&self, a: f64, b: f64) -> bool {
        let cm = self.proj.central_meridian().to_degrees();
        let (lo, hi) = if a <= b { (a - cm, b - cm) } else { (b - cm, a - cm) };
        let k = ((lo - 180.0) / 360.0).floor() + 1.0;
        let back = 180.0 + 360.0 * k;
        back > lo && back < hi
    }

    /// Geographic useful range, degrees.
    pub fn ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        (self.ll_min, self.ll_max)
    }

    /// Cartesian useful range, system units.
    pub fn xy_bounds(&self) -> ([f64; 2], [f64; 2]) {
        (self.xy_min, self.xy_max)
    }

    /// Whether a geographic point (degrees) lies inside the useful range.
    pub fn in_useful_range(&self, ll: [f64; 2]) -> bool {
        let mid = (self.ll_min[0] + self.ll_max[0]) / 2.0;
        let lng = mid + adj_lng_deg(ll[0] - mid);
        (self.ll_min[0]..=self.ll_max[0]).contains(&lng)
            && (self.ll_min[1]..=self.ll_max[1]).contains(&ll[1])
    }

    /// Whether a cartesian point lies inside the useful range.
    pub fn xy_in_useful_range(&self, xy: [f64; 2]) -> bool {
        (self.xy_min[0]..=self.xy_max[0]).contains(&xy[0])
            && (self.xy_min[1]..=self.xy_max[1]).contains(&xy[1])
    }

    /// Cartesian extent of the geographic useful range, from a lattice of
    /// forward-projected samples.
    fn project_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let lng0 = self.ll_min[0] + EDGE_NUDGE;
        let lng1 = self.ll_max[0] - EDGE_NUDGE;
        let (lat0, lat1) = (self.ll_min[1], self.ll_max[1]);

        let mut min = [f64::INFINITY; 2];
        let mut max = [f64::NEG_INFINITY; 2];
        for i in 0..=DENSIFY {
            let lng = lng0 + (lng1 - lng0) * i as f64 / DENSIFY as f64;
            for j in 0..=DENSIFY {
                let lat = lat0 + (lat1 - lat0) * j as f64 / DENSIFY as f64;
                let ([x, y], _) = self.ll2cs([lng, lat]);
                if !(x.is_finite() && y.is_finite()) {
                    continue;
                }
                min = [min[0].min(x), min[1].min(y)];
                max = [max[0].max(x), max[1].max(y)];
            }
        }
        (min, max)
    }
}

/// Evenly spaced points from `a` to `b`, both ends included.
fn densify(a: [f64; 2], b: [f64; 2]) -> impl Iterator<Item = [f64; 2]> {
    (0..=DENSIFY).map(move |i| {
        let t = i as f64 / DENSIFY as f64;
        [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t]
    })
}

/// Edges of a polygon, closing edge included.
fn closed_edges(points: &[[f64; 2]]) -> impl Iterator<Item = ([f64; 2], [f64; 2])> + '_ {
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| (*a, *b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::csdef::QcError;
    use approx::assert_relative_eq;
    use proj4rs::Proj;

    fn tm18() -> CsDef {
        CsDef {
            org_lng: -75.0,
            scl_red: 0.9996,
            false_easting: 500_000.0,
            ..CsDef::new("TM18", "TM")
        }
    }

    fn utm(zone: i32, hemisphere: i32) -> CoordSys {
        CoordSys::new(CsDef {
            zone,
            hemisphere,
            ..CsDef::new("UTM", "UTM")
        })
        .unwrap()
    }

    #[test]
    fn test_tm_regression_point() {
        let cs = CoordSys::new(tm18()).unwrap();
        let (xy, status) = cs.ll2cs([-75.5, 40.0]);
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(xy[0], 457_320.055, epsilon = 1e-3);
        assert_relative_eq!(xy[1], 4_427_876.924, epsilon = 1e-3);

        let (ll, status) = cs.cs2ll(xy);
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(ll[0], -75.5, epsilon = 1e-8);
        assert_relative_eq!(ll[1], 40.0, epsilon = 1e-8);
    }

    #[test]
    fn test_native_matches_proj4rs() {
        let cs = utm(18, 1);
        let geo = Proj::from_proj_string("+proj=longlat +datum=WGS84").unwrap();
        let utm18 = Proj::from_proj_string("+proj=utm +zone=18 +datum=WGS84").unwrap();

        for &(lng, lat) in &[(-75.5, 40.0), (-77.9, 10.0), (-72.1, 65.0), (-75.0, 0.5)] {
            let (xy, _) = cs.ll2cs([lng, lat]);
            let mut point = (f64::to_radians(lng), f64::to_radians(lat));
            proj4rs::transform::transform(&geo, &utm18, &mut point).unwrap();
            assert_relative_eq!(xy[0], point.0, epsilon = 1e-3);
            assert_relative_eq!(xy[1], point.1, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_utm_south_false_northing() {
        let cs = utm(33, -1);
        let (xy, _) = cs.ll2cs([15.0, -0.000_001]);
        assert_relative_eq!(xy[0], 500_000.0, epsilon = 1e-6);
        assert_relative_eq!(xy[1], 10_000_000.0, epsilon = 0.5);
    }

    #[test]
    fn test_invalid_definition_lists_errors() {
        let def = CsDef {
            scl_red: 2.0,
            quad: 7,
            ..tm18()
        };
        match CoordSys::new(def) {
            Err(CsError::InvalidDefinition { name, errors }) => {
                assert_eq!(name, "TM18");
                assert!(errors.contains(&QcError::SclRed));
                assert!(errors.contains(&QcError::Quad));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            CoordSys::new(CsDef::new("X", "BOGUS")),
            Err(CsError::UnknownProjection(_))
        ));
    }

    #[test]
    fn test_quadrant_and_units() {
        let metres = CoordSys::new(tm18()).unwrap();
        let west = CoordSys::new(CsDef { quad: 2, ..tm18() }).unwrap();
        let feet = CoordSys::new(CsDef {
            unit_factor: 0.3048,
            false_easting: 500_000.0 / 0.3048,
            ..tm18()
        })
        .unwrap();

        let ll = [-74.0, 45.0];
        let (m, _) = metres.ll2cs(ll);
        let (w, _) = west.ll2cs(ll);
        let (f, _) = feet.ll2cs(ll);
        assert_relative_eq!(w[0] - 500_000.0, -(m[0] - 500_000.0), epsilon = 1e-6);
        assert_relative_eq!(w[1], m[1], epsilon = 1e-6);
        assert_relative_eq!(f[1] * 0.3048, m[1], epsilon = 1e-6);

        let (back, _) = west.cs2ll(w);
        assert_relative_eq!(back[0], ll[0], epsilon = 1e-9);
        assert_relative_eq!(back[1], ll[1], epsilon = 1e-9);
    }

    #[test]
    fn test_in_place_aliasing() {
        let cs = CoordSys::new(tm18()).unwrap();
        let mut pt = [-75.5, 40.0];
        cs.ll2cs_in_place(&mut pt);
        assert_relative_eq!(pt[0], 457_320.055, epsilon = 1e-3);
        cs.cs2ll_in_place(&mut pt);
        assert_relative_eq!(pt[0], -75.5, epsilon = 1e-8);
        assert_relative_eq!(pt[1], 40.0, epsilon = 1e-8);
    }

    #[test]
    fn test_batch_matches_single() {
        let cs = CoordSys::new(tm18()).unwrap();
        let input: Vec<[f64; 2]> = (0..100)
            .map(|i| [-80.0 + i as f64 * 0.1, 30.0 + i as f64 * 0.2])
            .collect();
        let mut batch = input.clone();
        assert_eq!(cs.ll2cs_batch(&mut batch), Status::Normal);
        for (ll, xy) in input.iter().zip(&batch) {
            assert_eq!(cs.ll2cs(*ll).0, *xy);
        }
        cs.cs2ll_batch(&mut batch);
        for (ll, back) in input.iter().zip(&batch) {
            assert_relative_eq!(ll[1], back[1], epsilon = 1e-8);
        }
    }

    #[test]
    fn test_scale_and_convergence() {
        let cs = CoordSys::new(tm18()).unwrap();
        assert_relative_eq!(cs.scale_k([-75.0, 0.0]), 0.9996, epsilon = 1e-9);
        assert_relative_eq!(cs.scale([-75.0, 0.0]), 0.9996, epsilon = 1e-9);
        assert!(cs.convergence([-74.0, 45.0]) > 0.0);

        // Swapped axes: the numeric path sees grid north on the other axis.
        let swapped = CoordSys::new(CsDef { quad: -1, ..tm18() }).unwrap();
        let gamma = cs.convergence([-74.0, 45.0]);
        let gamma_swapped = swapped.convergence([-74.0, 45.0]);
        assert!((gamma_swapped - gamma).abs() > 1.0);

        // Mollweide has no closed form k: numeric differences give 2√2/π at the origin.
        let moll = CoordSys::new(CsDef::new("MOLL", "MOLWD")).unwrap();
        assert_relative_eq!(moll.scale_k([0.0, 0.0]), 0.900_316_316_157, epsilon = 1e-6);
    }

    #[test]
    fn test_ll_check_back_meridian() {
        let cs = CoordSys::new(CsDef::new("MOLL", "MOLWD")).unwrap();
        assert_eq!(cs.ll_check(&[[10.0, 20.0]]), Status::Normal);
        assert_eq!(cs.ll_check(&[[170.0, 0.0], [-170.0, 0.0]]), Status::Normal);
        assert_eq!(cs.ll_check(&[[170.0, 0.0], [190.0, 0.0]]), Status::Range);
        assert_eq!(
            cs.ll_check(&[[160.0, 0.0], [200.0, 0.0], [200.0, 10.0]]),
            Status::Range
        );
        assert_eq!(cs.ll_check(&[[0.0, 95.0]]), Status::Range);
    }

    #[test]
    fn test_xy_check_outside_circle() {
        let cs = CoordSys::new(CsDef::new("VDG", "VDGRN")).unwrap();
        let edge = std::f64::consts::PI * 6_378_137.0;
        assert_eq!(cs.xy_check(&[[0.0, 0.0]]), Status::Normal);
        assert_eq!(cs.xy_check(&[[0.0, 0.0], [edge * 1.1, 0.0]]), Status::Range);
    }

    #[test]
    fn test_useful_range() {
        let cs = CoordSys::new(tm18()).unwrap();
        let (ll_min, ll_max) = cs.ll_bounds();
        assert_relative_eq!(ll_min[0], -90.0);
        assert_relative_eq!(ll_max[0], -60.0);
        assert!(cs.in_useful_range([-75.0, 40.0]));
        assert!(!cs.in_useful_range([0.0, 40.0]));

        let (xy_min, xy_max) = cs.xy_bounds();
        assert!(xy_min[0] < 0.0 && xy_max[0] > 1_000_000.0);
        let (xy, _) = cs.ll2cs([-75.5, 40.0]);
        assert!(cs.xy_in_useful_range(xy));

        let explicit = CoordSys::new(CsDef {
            ll_min: Some([-76.0, 39.0]),
            ll_max: Some([-74.0, 41.0]),
            ..tm18()
        })
        .unwrap();
        assert!(!explicit.in_useful_range([-77.0, 40.0]));
    }

    #[test]
    fn test_useful_range_across_antimeridian() {
        let cs = CoordSys::new(CsDef {
            org_lng: 177.0,
            scl_red: 0.9996,
            ..CsDef::new("TM60", "TM")
        })
        .unwrap();
        assert!(cs.in_useful_range([-179.0, 10.0]));
        assert!(!cs.in_useful_range([-150.0, 10.0]));
    }

    #[test]
    fn test_geographic_system() {
        let cs = CoordSys::new(CsDef::new("LL84", "LL")).unwrap();
        assert!(cs.is_geographic());
        let (xy, status) = cs.ll2cs([12.5, -33.25]);
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(xy[0], 12.5, epsilon = 1e-12);
        assert_relative_eq!(xy[1], -33.25, epsilon = 1e-12);
    }
}
