//! Miller Cylindrical projection (spherical, radius a).
//!
//! forward: x = R·(λ - λ₀), y = 1.25·R·ln tan(π/4 + 0.4·φ)
//! inverse: φ = 2.5·atan(exp(0.8·y/R)) - 0.625·π

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::adj_lng;
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

pub struct Miller {
    ellipsoid: Ellipsoid,
    lon0: f64,
    r: f64,
    y_max: f64,
}

impl Miller {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, unit_scale: f64) -> Self {
        let r = ellipsoid.a * unit_scale;
        Self {
            ellipsoid,
            lon0,
            r,
            y_max: 1.25 * r * (FRAC_PI_4 + 0.4 * FRAC_PI_2).tan().ln(),
        }
    }
}

impl Projection for Miller {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let x = self.r * adj_lng(lon - self.lon0);
        let y = 1.25 * self.r * (FRAC_PI_4 + 0.4 * lat).tan().ln();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut y = y;
        if y.abs() > self.y_max {
            status = Status::Range;
            y = self.y_max.copysign(y);
        }
        let mut dlon = x / self.r;
        if dlon.abs() > PI {
            status = Status::Range;
            dlon = PI.copysign(dlon);
        }
        let lat = 2.5 * (0.8 * y / self.r).exp().atan() - 0.625 * PI;
        (adj_lng(self.lon0 + dlon), lat, status)
    }

    fn convergence(&self, _lon: f64, _lat: f64) -> Option<f64> {
        Some(0.0)
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        bounds_around(self.lon0, 180.0, -90.0, 90.0)
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(_def: &CsDef, _sink: &mut QcSink<'_>) {}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    Ok(Box::new(Miller::new(
        args.ellipsoid,
        args.def.org_lng.to_radians(),
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_roundtrip() {
        let proj = Miller::new(Ellipsoid::sphere(6_370_997.0), 0.2, 1.0);
        for &(lon, lat) in &[(0.0_f64, 0.0_f64), (-120.0, 60.0), (45.0, -85.0), (179.0, 89.0)] {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let (x, y, _) = proj.forward(l, p);
            let (l2, p2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal);
            assert_relative_eq!(adj_lng(l2 - l), 0.0, epsilon = 1e-12);
            assert_relative_eq!(p2, p, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_snyder_example() {
        // Snyder, Map Projections: A Working Manual, p. 284: R=1, φ=50° → y=0.9536371
        let proj = Miller::new(Ellipsoid::sphere(1.0), 0.0, 1.0);
        let (_, y, _) = proj.forward(0.0, 50.0_f64.to_radians());
        assert_relative_eq!(y, 0.953_637_1, epsilon = 1e-7);
    }

    #[test]
    fn test_poles_are_finite() {
        let proj = Miller::new(Ellipsoid::sphere(1.0), 0.0, 1.0);
        let (_, y, status) = proj.forward(0.0, FRAC_PI_2);
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(y, proj.y_max);
        let (_, lat, status) = proj.inverse(0.0, 10.0);
        assert_eq!(status, Status::Range);
        assert_relative_eq!(lat, FRAC_PI_2, epsilon = 1e-12);
    }
}
