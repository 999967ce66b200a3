//! Mollweide projection (spherical, radius a).
//!
//! forward: x = (2√2/π)·R·(λ - λ₀)·cos θ, y = √2·R·sin θ,
//!          with 2θ + sin 2θ = π·sin φ
//! inverse: θ = asin(y/(√2·R)), φ = asin((2θ + sin 2θ)/π)

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, solve_auxiliary_angle, NP_TEST};
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

/// Auxiliary angle θ of latitude `lat`.
pub(crate) fn auxiliary_angle(lat: f64) -> f64 {
    if lat.abs() > NP_TEST {
        return FRAC_PI_2.copysign(lat);
    }
    let target = PI * lat.sin();
    // Near the poles 2θ + sin 2θ ≈ π - (4/3)δ³ with δ = π/2 - |θ|.
    let start = if lat.abs() > 1.2 {
        let delta = (0.75 * (PI - target.abs())).cbrt();
        (FRAC_PI_2 - delta).copysign(lat)
    } else {
        lat
    };
    let two_theta = solve_auxiliary_angle(target, 2.0 * start, |t| (t + t.sin(), 1.0 + t.cos()));
    two_theta / 2.0
}

/// Latitude of auxiliary angle `theta`.
pub(crate) fn latitude(theta: f64) -> f64 {
    ((2.0 * theta + (2.0 * theta).sin()) / PI).clamp(-1.0, 1.0).asin()
}

pub struct Mollweide {
    ellipsoid: Ellipsoid,
    lon0: f64,
    r: f64,
}

impl Mollweide {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            r: ellipsoid.a * unit_scale,
        }
    }
}

impl Projection for Mollweide {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let theta = auxiliary_angle(lat.clamp(-FRAC_PI_2, FRAC_PI_2));
        let x = 2.0 * SQRT_2 / PI * self.r * adj_lng(lon - self.lon0) * theta.cos();
        let y = SQRT_2 * self.r * theta.sin();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut s = y / (SQRT_2 * self.r);
        if s.abs() > 1.0 {
            status = Status::Range;
            s = s.signum();
        }
        let theta = s.asin();
        let lat = latitude(theta);
        if lat.abs() > NP_TEST {
            return (self.lon0, lat, status.worst(Status::Indeterminate));
        }
        let mut dlam = PI * x / (2.0 * SQRT_2 * self.r * theta.cos());
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
    Ok(Box::new(Mollweide::new(
        args.ellipsoid,
        args.def.org_lng.to_radians(),
        args.unit_scale,
    )))
}
