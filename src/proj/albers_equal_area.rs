//! Albers Equal Area Conic projection.
//!
//! Area-preserving conic using `qsfn` from common.rs.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, msfn, qsfn, NP_TEST};
use crate::proj::csdef::{check_parallel, CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

pub struct AlbersEqualArea {
    ellipsoid: Ellipsoid,
    lon0: f64,
    e: f64,
    ka: f64,
    n: f64,
    c: f64,
    rho0: f64,
    /// q at the poles; |q| never exceeds it.
    q_pole: f64,
}

impl AlbersEqualArea {
    pub fn new(
        ellipsoid: Ellipsoid,
        lon0: f64,
        lat0: f64,
        lat1: f64,
        lat2: f64,
        unit_scale: f64,
    ) -> Self {
        let e = ellipsoid.eccentricity();
        let e2 = ellipsoid.e2;

        let m1 = msfn(lat1, e2);
        let m2 = msfn(lat2, e2);
        let q0 = qsfn(lat0, e);
        let q1 = qsfn(lat1, e);
        let q2 = qsfn(lat2, e);

        let n = if (lat1 - lat2).abs() > 1e-10 {
            (m1 * m1 - m2 * m2) / (q2 - q1)
        } else {
            lat1.sin()
        };

        let c = m1 * m1 + n * q1;
        let ka = ellipsoid.a * unit_scale;
        let rho0 = ka * (c - n * q0).abs().sqrt() / n;

        Self {
            ellipsoid,
            lon0,
            e,
            ka,
            n,
            c,
            rho0,
            q_pole: qsfn(FRAC_PI_2, e),
        }
    }

    fn rho(&self, lat: f64) -> f64 {
        self.ka * (self.c - self.n * qsfn(lat, self.e)).abs().sqrt() / self.n
    }

    /// Inverse of qsfn: find φ from q by Newton iteration
    fn phi_from_q(&self, q: f64) -> f64 {
        let e = self.e;
        let e2 = self.ellipsoid.e2;
        let mut lat = (q / 2.0).clamp(-1.0, 1.0).asin(); // initial guess

        for _ in 0..15 {
            let cos_lat = lat.cos();
            if cos_lat.abs() < 1e-12 {
                break;
            }
            let sin_lat = lat.sin();
            let esinlat = e * sin_lat;
            let one_minus = 1.0 - esinlat * esinlat;
            let q_est = qsfn(lat, e);
            let dq_dphi = (1.0 - e2) * 2.0 * cos_lat / (one_minus * one_minus);
            let delta = (q - q_est) / dq_dphi;
            lat = (lat + delta).clamp(-FRAC_PI_2, FRAC_PI_2);
            if delta.abs() < 1e-12 {
                break;
            }
        }
        lat
    }
}

impl Projection for AlbersEqualArea {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let theta = self.n * adj_lng(lon - self.lon0);
        let rho = self.rho(lat);

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let x_ = x;
        let y_ = self.rho0 - y;

        let (xn, yn) = if self.n < 0.0 { (-x_, -y_) } else { (x_, y_) };

        let rho = xn.hypot(yn);
        let theta = xn.atan2(yn);

        let mut status = Status::Normal;
        let mut q = (self.c - (rho * self.n / self.ka).powi(2)) / self.n;
        if q.abs() > self.q_pole {
            status = Status::Range;
            q = self.q_pole.copysign(q);
        }
        let lat = self.phi_from_q(q);
        if lat.abs() > NP_TEST {
            return (self.lon0, lat, status.worst(Status::Indeterminate));
        }

        let mut dlon = theta / self.n;
        if dlon.abs() > PI {
            status = Status::Range;
            dlon = PI.copysign(dlon);
        }
        (adj_lng(self.lon0 + dlon), lat, status)
    }

    fn scale_k(&self, _lon: f64, lat: f64) -> Option<f64> {
        if lat.abs() > NP_TEST {
            return None;
        }
        let m = msfn(lat, self.ellipsoid.e2);
        Some(self.rho(lat) * self.n / (self.ka * m))
    }

    fn scale_h(&self, lon: f64, lat: f64) -> Option<f64> {
        self.scale_k(lon, lat).map(|k| 1.0 / k)
    }

    fn convergence(&self, lon: f64, _lat: f64) -> Option<f64> {
        Some((self.n * adj_lng(lon - self.lon0)).to_degrees())
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let cm = self.lon0.to_degrees();
        if self.n > 0.0 {
            ([cm - 60.0, 0.0], [cm + 60.0, 80.0])
        } else {
            ([cm - 60.0, -80.0], [cm + 60.0, 0.0])
        }
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    check_parallel(def.std_parallel_1, sink);
    check_parallel(def.std_parallel_2, sink);
    if let (Some(p1), Some(p2)) = (def.std_parallel_1, def.std_parallel_2) {
        if (p1 + p2).abs() < 1.0e-6 {
            sink.push(QcError::StdParallelSymmetric);
        }
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    let lat1 = def.std_parallel_1.unwrap_or(def.org_lat);
    let lat2 = def.std_parallel_2.unwrap_or(lat1);
    Ok(Box::new(AlbersEqualArea::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.org_lat.to_radians(),
        lat1.to_radians(),
        lat2.to_radians(),
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::common::numeric_h;
    use crate::proj::ellipsoid::WGS84;
    use approx::assert_relative_eq;

    /// USGS Albers (EPSG:5070): lat1=29.5°, lat2=45.5°, lat0=23°, lon0=-96°
    fn conus() -> AlbersEqualArea {
        AlbersEqualArea::new(
            WGS84,
            (-96.0_f64).to_radians(),
            23.0_f64.to_radians(),
            29.5_f64.to_radians(),
            45.5_f64.to_radians(),
            1.0,
        )
    }

    #[test]
    fn test_roundtrip() {
        let proj = conus();
        let cases: &[(f64, f64)] = &[
            (-96.0, 23.0),  // origin
            (-96.0, 39.0),  // on central meridian
            (-74.0, 40.7),  // NYC
            (-87.6, 41.9),  // Chicago
            (-118.2, 34.0), // LA
            (-122.4, 37.8), // SF
        ];
        for &(lon_deg, lat_deg) in cases {
            let lon = lon_deg.to_radians();
            let lat = lat_deg.to_radians();
            let (x, y, _) = proj.forward(lon, lat);
            let (lon2, lat2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal);
            assert_relative_eq!(lon2, lon, epsilon = 1e-9);
            assert_relative_eq!(lat2, lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_origin() {
        let (x, y, _) = conus().forward((-96.0_f64).to_radians(), 23.0_f64.to_radians());
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_equal_area() {
        let proj = conus();
        for &(lon, lat) in &[(-80.0_f64, 35.0_f64), (-110.0, 48.0), (-96.0, 25.0)] {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let k = proj.scale_k(l, p).unwrap();
            let h = proj.scale_h(l, p).unwrap();
            assert_relative_eq!(k * h, 1.0, epsilon = 1e-12);
            let fwd = |l: f64, p: f64| {
                let (x, y, _) = proj.forward(l, p);
                (x, y)
            };
            assert_relative_eq!(h, numeric_h(&WGS84, 1.0, l, p, fwd), epsilon = 1e-7);
        }
    }

    #[test]
    fn test_inverse_outside_disc_clamped() {
        let proj = conus();
        // Far beyond the image of the south pole.
        let (_, lat, status) = proj.inverse(0.0, -5.0e7);
        assert_eq!(status, Status::Range);
        assert!(lat.is_finite());
    }
}
