//! Geographic "projection": longitude and latitude pass through, expressed
//! relative to the origin longitude (prime meridian) in the system's
//! angular unit.

use std::f64::consts::FRAC_PI_2;

use crate::error::{CsResult, Status};
use crate::proj::common::adj_lng;
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

pub struct Unity {
    ellipsoid: Ellipsoid,
    lon0: f64,
    /// Degrees to system units.
    unit_scale: f64,
}

impl Unity {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            unit_scale,
        }
    }
}

impl Projection for Unity {
    fn forward(&self, lng: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lng, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let x = adj_lng(lng - self.lon0).to_degrees() * self.unit_scale;
        (x, lat.to_degrees() * self.unit_scale, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut lat = (y / self.unit_scale).to_radians();
        if lat.abs() > FRAC_PI_2 {
            status = Status::Range;
            lat = FRAC_PI_2.copysign(lat);
        }
        let lng = (x / self.unit_scale).to_radians();
        (adj_lng(lng + self.lon0), lat, status)
    }

    fn scale_k(&self, _lng: f64, _lat: f64) -> Option<f64> {
        Some(1.0)
    }

    fn scale_h(&self, _lng: f64, _lat: f64) -> Option<f64> {
        Some(1.0)
    }

    fn convergence(&self, _lng: f64, _lat: f64) -> Option<f64> {
        Some(0.0)
    }

    fn xy_domain(&self, _x: f64, y: f64) -> Status {
        if (y / self.unit_scale).abs() > 90.0 {
            Status::Range
        } else {
            Status::Normal
        }
    }

    fn has_back_meridian_cut(&self) -> bool {
        false
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let cm = self.lon0.to_degrees();
        ([cm - 180.0, -90.0], [cm + 180.0, 90.0])
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(_def: &CsDef, _sink: &mut QcSink<'_>) {}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    Ok(Box::new(Unity::new(
        args.ellipsoid,
        args.def.org_lng.to_radians(),
        args.unit_scale,
    )))
}
