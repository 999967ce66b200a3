//! Equidistant Cylindrical projection (EPSG method 1028, ellipsoidal).
//!
//! forward: x = ν₁·cos(φ₁)·(λ - λ₀), y = M(φ) - M(φ₀)
//! inverse: λ = λ₀ + x/(ν₁·cos(φ₁)), φ = M⁻¹(y + M(φ₀))

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, meridional_arc, meridional_arc_inverse, NP_TEST};
use crate::proj::csdef::{CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

pub struct Equirectangular {
    ellipsoid: Ellipsoid,
    lon0: f64,
    unit_scale: f64,
    /// ν₁·cos φ₁ in system units.
    parallel_radius: f64,
    m0: f64,
    /// Meridian quadrant; |M| never exceeds it.
    m_pole: f64,
}

impl Equirectangular {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, lat0: f64, lat_ts: f64, unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            unit_scale,
            parallel_radius: ellipsoid.prime_vertical_radius(lat_ts) * lat_ts.cos() * unit_scale,
            m0: meridional_arc(&ellipsoid, lat0) * unit_scale,
            m_pole: meridional_arc(&ellipsoid, FRAC_PI_2) * unit_scale,
        }
    }
}

impl Projection for Equirectangular {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let x = self.parallel_radius * adj_lng(lon - self.lon0);
        let y = meridional_arc(&self.ellipsoid, lat) * self.unit_scale - self.m0;
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut m = y + self.m0;
        if m.abs() > self.m_pole {
            status = Status::Range;
            m = self.m_pole.copysign(m);
        }
        let lat = meridional_arc_inverse(&self.ellipsoid, m / self.unit_scale);
        let mut dlon = x / self.parallel_radius;
        if dlon.abs() > PI {
            status = Status::Range;
            dlon = PI.copysign(dlon);
        }
        (adj_lng(self.lon0 + dlon), lat, status)
    }

    fn scale_k(&self, _lon: f64, lat: f64) -> Option<f64> {
        let lat = lat.clamp(-NP_TEST, NP_TEST);
        let ground = self.ellipsoid.prime_vertical_radius(lat) * lat.cos() * self.unit_scale;
        Some(self.parallel_radius / ground)
    }

    fn scale_h(&self, _lon: f64, _lat: f64) -> Option<f64> {
        Some(1.0)
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

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    if let Some(lat_ts) = def.std_parallel_1 {
        if lat_ts.abs() >= 90.0 {
            sink.push(QcError::StdParallel);
        }
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(Equirectangular::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.org_lat.to_radians(),
        def.std_parallel_1.unwrap_or(0.0).to_radians(),
        args.unit_scale,
    )))
}
