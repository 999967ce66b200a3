pub mod albers_equal_area;
pub mod common;
pub mod coordsys;
pub mod csdef;
pub mod eckert6;
pub mod ellipsoid;
pub mod equirectangular;
pub mod goode;
pub mod lambert_conformal;
pub mod lambert_tangential;
pub mod mercator;
pub mod miller;
pub mod mollweide;
pub mod pipeline;
pub mod registry;
pub mod sinusoidal;
pub mod stereographic;
pub mod swiss;
pub mod transverse_mercator;
pub mod unity;
pub mod van_der_grinten;

use crate::error::Status;

/// Projection math of one family, as wired into a [`coordsys::CoordSys`].
///
/// Angles are radians and absolute (the implementation subtracts its own
/// central meridian). Cartesian values are in system units relative to the
/// natural origin: quadrant and false origin are applied by the caller.
/// Out-of-domain input is clamped to the nearest boundary and reported as
/// [`Status::Range`], never rejected.
pub trait Projection: Send + Sync {
    /// Forward: (lng, lat) → (x, y)
    fn forward(&self, lng: f64, lat: f64) -> (f64, f64, Status);

    /// Inverse: (x, y) → (lng, lat)
    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status);

    /// Scale along the parallel; `None` requests numerical evaluation.
    fn scale_k(&self, _lng: f64, _lat: f64) -> Option<f64> {
        None
    }

    /// Scale along the meridian; `None` requests numerical evaluation.
    fn scale_h(&self, _lng: f64, _lat: f64) -> Option<f64> {
        None
    }

    /// Grid convergence in degrees; `None` requests numerical evaluation.
    fn convergence(&self, _lng: f64, _lat: f64) -> Option<f64> {
        None
    }

    /// Domain test for a single geographic point.
    fn ll_domain(&self, _lng: f64, lat: f64) -> Status {
        if lat.abs() > std::f64::consts::FRAC_PI_2 {
            Status::Range
        } else {
            Status::Normal
        }
    }

    /// Domain test for a single cartesian point (natural origin, no quadrant).
    fn xy_domain(&self, x: f64, y: f64) -> Status {
        if x.is_finite() && y.is_finite() {
            Status::Normal
        } else {
            Status::Range
        }
    }

    /// Whether lines crossing the meridian opposite the central meridian
    /// leave the domain.
    fn has_back_meridian_cut(&self) -> bool {
        true
    }

    fn central_meridian(&self) -> f64;

    /// Default geographic useful range, degrees: ([lng_min, lat_min], [lng_max, lat_max]).
    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]);

    /// Projections with a prescribed false origin (system units) override
    /// the one in the definition.
    fn fixed_false_origin(&self) -> Option<(f64, f64)> {
        None
    }

    fn is_conformal(&self) -> bool {
        false
    }

    fn ellipsoid(&self) -> &ellipsoid::Ellipsoid;
}

/// Useful-range default of ± `half_width` degrees around a central meridian.
pub(crate) fn bounds_around(cm: f64, half_width: f64, lat_min: f64, lat_max: f64) -> ([f64; 2], [f64; 2]) {
    let cm = cm.to_degrees();
    ([cm - half_width, lat_min], [cm + half_width, lat_max])
}
