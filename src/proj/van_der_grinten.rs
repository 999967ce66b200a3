//! Van der Grinten projection (spherical, radius a), after Snyder's
//! closed forms. The whole sphere maps into a circle of radius π·R.

use std::f64::consts::{FRAC_PI_2, FRAC_PI_3, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::adj_lng;
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

const EPS: f64 = 1.0e-10;

pub struct VanDerGrinten {
    ellipsoid: Ellipsoid,
    lon0: f64,
    r: f64,
}

impl VanDerGrinten {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            r: ellipsoid.a * unit_scale,
        }
    }
}

impl Projection for VanDerGrinten {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let dlam = adj_lng(lon - self.lon0);
        let pr = PI * self.r;

        if lat.abs() < EPS {
            return (self.r * dlam, 0.0, status);
        }
        let theta = (2.0 * lat / PI).abs().min(1.0).asin();
        if dlam.abs() < EPS || (lat.abs() - FRAC_PI_2).abs() < EPS {
            return (0.0, (pr * (theta / 2.0).tan()).copysign(lat), status);
        }

        let (sin_t, cos_t) = theta.sin_cos();
        let a = 0.5 * (PI / dlam - dlam / PI).abs();
        let g = cos_t / (sin_t + cos_t - 1.0);
        let p = g * (2.0 / sin_t - 1.0);
        let q = a * a + g;
        let (a2, p2) = (a * a, p * p);

        let x_root = (a2 * (g - p2).powi(2) - (p2 + a2) * (g * g - p2)).max(0.0).sqrt();
        let x = pr * (a * (g - p2) + x_root) / (p2 + a2);
        let y_root = ((a2 + 1.0) * (p2 + a2) - q * q).max(0.0).sqrt();
        let y = pr * (p * q - a * y_root) / (p2 + a2);
        (x.copysign(dlam), y.copysign(lat), status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let pr = PI * self.r;
        let mut status = Status::Normal;
        let (mut xx, mut yy) = (x / pr, y / pr);
        let radius = xx.hypot(yy);
        if radius > 1.0 {
            status = Status::Range;
            xx /= radius;
            yy /= radius;
        }

        if yy.abs() < EPS {
            return (adj_lng(self.lon0 + PI * xx), 0.0, status);
        }

        let xy = xx * xx + yy * yy;
        let c1 = -yy.abs() * (1.0 + xy);
        let c2 = c1 - 2.0 * yy * yy + xx * xx;
        let c3 = -2.0 * c1 + 1.0 + 2.0 * yy * yy + xy * xy;
        let d = yy * yy / c3 + (2.0 * c2.powi(3) / c3.powi(3) - 9.0 * c1 * c2 / (c3 * c3)) / 27.0;
        let a1 = (c1 - c2 * c2 / (3.0 * c3)) / c3;
        let m1 = 2.0 * (-a1 / 3.0).sqrt();
        let theta1 = (3.0 * d / (a1 * m1)).clamp(-1.0, 1.0).acos() / 3.0;
        let lat = (PI * (-m1 * (theta1 + FRAC_PI_3).cos() - c2 / (3.0 * c3)))
            .clamp(-FRAC_PI_2, FRAC_PI_2)
            .copysign(yy);

        let dlam = if xx.abs() < EPS {
            0.0
        } else {
            let root = (1.0 + 2.0 * (xx * xx - yy * yy) + xy * xy).max(0.0).sqrt();
            PI * (xy - 1.0 + root) / (2.0 * xx)
        };
        (adj_lng(self.lon0 + dlam), lat, status)
    }

    fn xy_domain(&self, x: f64, y: f64) -> Status {
        if x.hypot(y) > PI * self.r {
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

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(_def: &CsDef, _sink: &mut QcSink<'_>) {}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    Ok(Box::new(VanDerGrinten::new(
        args.ellipsoid,
        args.def.org_lng.to_radians(),
        args.unit_scale,
    )))
}
