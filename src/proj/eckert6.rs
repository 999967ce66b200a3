//! Eckert VI projection (spherical, radius a).
//!
//! forward: x = R·(λ - λ₀)·(1 + cos θ)/√(2 + π), y = 2·R·θ/√(2 + π),
//!          with θ + sin θ = (1 + π/2)·sin φ

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, solve_auxiliary_angle};
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

pub struct Eckert6 {
    ellipsoid: Ellipsoid,
    lon0: f64,
    r: f64,
    /// √(2 + π)
    k: f64,
}

impl Eckert6 {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            r: ellipsoid.a * unit_scale,
            k: (2.0 + PI).sqrt(),
        }
    }

    fn theta(lat: f64) -> f64 {
        let c = 1.0 + FRAC_PI_2;
        solve_auxiliary_angle(c * lat.sin(), lat, |t| (t + t.sin(), 1.0 + t.cos()))
    }
}

impl Projection for Eckert6 {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let theta = Self::theta(lat.clamp(-FRAC_PI_2, FRAC_PI_2));
        let x = self.r * adj_lng(lon - self.lon0) * (1.0 + theta.cos()) / self.k;
        let y = 2.0 * self.r * theta / self.k;
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut theta = y * self.k / (2.0 * self.r);
        if theta.abs() > FRAC_PI_2 {
            status = Status::Range;
            theta = FRAC_PI_2.copysign(theta);
        }
        let lat = ((theta + theta.sin()) / (1.0 + FRAC_PI_2))
            .clamp(-1.0, 1.0)
            .asin();
        let mut dlam = x * self.k / (self.r * (1.0 + theta.cos()));
        if dlam.abs() > PI {
            status = Status::Range;
            dlam = PI.copysign(dlam);
        }
        (adj_lng(self.lon0 + dlam), lat, status)
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
    Ok(Box::new(Eckert6::new(
        args.ellipsoid,
        args.def.org_lng.to_radians(),
        args.unit_scale,
    )))
}
