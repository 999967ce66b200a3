//! Mercator projection (ellipsoidal, standard parallel).
//!
//!   forward: x = a·k₀·(λ - λ₀), y = a·k₀·(-ln(tsfn(φ, e)))
//!   inverse: λ = λ₀ + x/(a·k₀), φ = phi_from_ts(exp(-y/(a·k₀)), e)
//!
//! k₀ is the parallel radius ratio m(φ₁) of the standard parallel.

use std::f64::consts::PI;

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, msfn, phi_from_ts, tsfn, NP_TEST};
use crate::proj::csdef::{CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

/// Ellipsoidal Mercator projection with a standard parallel.
pub struct Mercator {
    ellipsoid: Ellipsoid,
    lon0: f64,
    e: f64,
    k0: f64,
    ka: f64, // a · k₀ · unit scale
}

impl Mercator {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, lat_ts: f64, unit_scale: f64) -> Self {
        // Scale factor from standard parallel
        let k0 = msfn(lat_ts, ellipsoid.e2);
        Self {
            ellipsoid,
            lon0,
            e: ellipsoid.eccentricity(),
            k0,
            ka: ellipsoid.a * k0 * unit_scale,
        }
    }
}

impl Projection for Mercator {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-NP_TEST, NP_TEST);
        let x = self.ka * adj_lng(lon - self.lon0);
        // For positive latitudes, tsfn < 1 so -ln(tsfn) > 0 → y > 0
        let y = self.ka * (-tsfn(lat, self.e).ln());
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut dlon = x / self.ka;
        if dlon.abs() > PI {
            status = Status::Range;
            dlon = PI.copysign(dlon);
        }
        let ts = (-y / self.ka).exp();
        let lat = phi_from_ts(ts, self.e);
        (adj_lng(self.lon0 + dlon), lat, status)
    }

    fn scale_k(&self, _lon: f64, lat: f64) -> Option<f64> {
        let lat = lat.clamp(-NP_TEST, NP_TEST);
        Some(self.k0 / msfn(lat, self.ellipsoid.e2))
    }

    fn scale_h(&self, lon: f64, lat: f64) -> Option<f64> {
        self.scale_k(lon, lat)
    }

    fn convergence(&self, _lon: f64, _lat: f64) -> Option<f64> {
        Some(0.0)
    }

    fn ll_domain(&self, _lon: f64, lat: f64) -> Status {
        if lat.abs() > NP_TEST {
            Status::Range
        } else {
            Status::Normal
        }
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        bounds_around(self.lon0, 180.0, -80.0, 80.0)
    }

    fn is_conformal(&self) -> bool {
        true
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    if let Some(lat_ts) = def.std_parallel_1 {
        if lat_ts.abs() >= 90.0 {
            sink.push(QcError::StdParallel);
        }
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(Mercator::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.std_parallel_1.unwrap_or(0.0).to_radians(),
        args.unit_scale,
    )))
}
