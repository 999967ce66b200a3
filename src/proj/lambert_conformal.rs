//! Lambert Conformal Conic projection: 1SP and 2SP variants.
//!
//! Uses `tsfn`, `msfn`, `phi_from_ts` from common.rs. The `LM2SP` registry
//! entry is the secant (two parallel) form; the tangent form is wired up in
//! `lambert_tangential`.

use std::f64::consts::FRAC_PI_2;

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, msfn, phi_from_ts, tsfn, MILLI_ARC_SEC, NP_TEST};
use crate::proj::csdef::{check_parallel, CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

pub struct LambertConformalConic {
    ellipsoid: Ellipsoid,
    lon0: f64,
    e: f64,
    n: f64,     // cone constant
    ka: f64,    // a · unit scale
    f_val: f64, // F = m₁/(n·t₁ⁿ)
    rho0: f64,  // ρ₀ = a·F·t₀ⁿ
    lat_min: f64,
    lat_max: f64,
}

impl LambertConformalConic {
    /// Create a Lambert Conformal Conic with two standard parallels (2SP).
    pub fn new_2sp(
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
        let t1 = tsfn(lat1, e);
        let t2 = tsfn(lat2, e);

        let n = if (lat1 - lat2).abs() > 1e-10 {
            (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
        } else {
            lat1.sin()
        };

        let f_val = m1 / (n * t1.powf(n));
        Self::from_cone(ellipsoid, lon0, lat0, n, f_val, unit_scale)
    }

    /// Create a Lambert Conformal Conic with one standard parallel (1SP),
    /// the cone tangent at the origin latitude.
    pub fn new_1sp(ellipsoid: Ellipsoid, lon0: f64, lat0: f64, k0: f64, unit_scale: f64) -> Self {
        let e = ellipsoid.eccentricity();

        let n = lat0.sin();
        let m0 = msfn(lat0, ellipsoid.e2);
        let t0 = tsfn(lat0, e);

        let f_val = m0 / (n * t0.powf(n)) * k0;
        Self::from_cone(ellipsoid, lon0, lat0, n, f_val, unit_scale)
    }

    fn from_cone(
        ellipsoid: Ellipsoid,
        lon0: f64,
        lat0: f64,
        n: f64,
        f_val: f64,
        unit_scale: f64,
    ) -> Self {
        let e = ellipsoid.eccentricity();
        let ka = ellipsoid.a * unit_scale;
        let rho0 = ka * f_val * tsfn(lat0, e).powf(n);
        // The pole away from the apex projects to infinity.
        let (lat_min, lat_max) = if n > 0.0 {
            (-NP_TEST, FRAC_PI_2)
        } else {
            (-FRAC_PI_2, NP_TEST)
        };
        Self {
            ellipsoid,
            lon0,
            e,
            n,
            ka,
            f_val,
            rho0,
            lat_min,
            lat_max,
        }
    }

    fn clamp_lat(&self, lat: f64) -> (f64, Status) {
        if lat < self.lat_min {
            (self.lat_min, Status::Range)
        } else if lat > self.lat_max {
            (self.lat_max, Status::Range)
        } else {
            (lat, Status::Normal)
        }
    }

    fn rho(&self, lat: f64) -> f64 {
        self.ka * self.f_val * tsfn(lat, self.e).powf(self.n)
    }

    pub fn cone_constant(&self) -> f64 {
        self.n
    }
}

impl Projection for LambertConformalConic {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let (lat, status) = self.clamp_lat(lat);
        let rho = self.rho(lat);
        let theta = self.n * adj_lng(lon - self.lon0);

        let x = rho * theta.sin();
        let y = self.rho0 - rho * theta.cos();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let x_ = x;
        let y_ = self.rho0 - y;

        // For n < 0, flip signs before computing angle and radius
        let (xn, yn) = if self.n < 0.0 { (-x_, -y_) } else { (x_, y_) };

        // rho carries the sign of n so the ratio to ka·F stays positive
        let rho = xn.hypot(yn).copysign(self.n);
        if rho.abs() < self.ka * MILLI_ARC_SEC {
            let lat = FRAC_PI_2.copysign(self.n);
            return (self.lon0, lat, Status::Indeterminate);
        }
        let theta = xn.atan2(yn); // atan2(x', y'), note order

        let mut status = Status::Normal;
        let mut dlon = theta / self.n;
        if dlon.abs() > std::f64::consts::PI {
            status = Status::Range;
            dlon = std::f64::consts::PI.copysign(dlon);
        }

        let ts = (rho / (self.ka * self.f_val)).powf(1.0 / self.n);
        let lat = phi_from_ts(ts, self.e);
        let lon = adj_lng(self.lon0 + dlon);

        (lon, lat, status)
    }

    fn scale_k(&self, _lon: f64, lat: f64) -> Option<f64> {
        let (lat, _) = self.clamp_lat(lat);
        if lat.abs() > NP_TEST {
            // Apex of the cone.
            return None;
        }
        let m = msfn(lat, self.ellipsoid.e2);
        Some(self.rho(lat) * self.n / (self.ka * m))
    }

    fn scale_h(&self, lon: f64, lat: f64) -> Option<f64> {
        self.scale_k(lon, lat)
    }

    fn convergence(&self, lon: f64, _lat: f64) -> Option<f64> {
        Some((self.n * adj_lng(lon - self.lon0)).to_degrees())
    }

    fn ll_domain(&self, _lon: f64, lat: f64) -> Status {
        self.clamp_lat(lat).1
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let cm = self.lon0.to_degrees();
        if self.n > 0.0 {
            ([cm - 60.0, 0.0], [cm + 60.0, 84.0])
        } else {
            ([cm - 60.0, -84.0], [cm + 60.0, 0.0])
        }
    }

    fn is_conformal(&self) -> bool {
        true
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    check_parallel(def.std_parallel_1, sink);
    check_parallel(def.std_parallel_2, sink);
    if let (Some(p1), Some(p2)) = (def.std_parallel_1, def.std_parallel_2) {
        // Parallels symmetric about the equator give a cylinder, not a cone.
        if (p1 + p2).abs() < 1.0e-6 {
            sink.push(QcError::StdParallelSymmetric);
        }
    }
    if def.org_lat.abs() >= 90.0 {
        sink.push(QcError::OrgLat);
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    let lat1 = def.std_parallel_1.unwrap_or(def.org_lat);
    let lat2 = def.std_parallel_2.unwrap_or(lat1);
    Ok(Box::new(LambertConformalConic::new_2sp(
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
    use crate::proj::common::{numeric_convergence, numeric_k};
    use crate::proj::csdef::check_all;
    use crate::proj::ellipsoid::WGS84;
    use approx::assert_relative_eq;

    fn lambert93() -> LambertConformalConic {
        // lat1=44°, lat2=49°, lat0=46.5°, lon0=3°
        LambertConformalConic::new_2sp(
            WGS84,
            3.0_f64.to_radians(),
            46.5_f64.to_radians(),
            44.0_f64.to_radians(),
            49.0_f64.to_radians(),
            1.0,
        )
    }

    #[test]
    fn test_2sp_roundtrip() {
        let proj = lambert93();
        let cases: &[(f64, f64)] = &[
            (3.0, 46.5),    // origin
            (2.35, 48.86),  // Paris
            (-1.55, 47.22), // Nantes
            (7.75, 48.58),  // Strasbourg
        ];
        for &(lon_deg, lat_deg) in cases {
            let lon = lon_deg.to_radians();
            let lat = lat_deg.to_radians();
            let (x, y, status) = proj.forward(lon, lat);
            assert_eq!(status, Status::Normal);
            let (lon2, lat2, _) = proj.inverse(x, y);
            assert_relative_eq!(lon2, lon, epsilon = 1e-9);
            assert_relative_eq!(lat2, lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_origin_point() {
        let (x, y, _) = lambert93().forward(3.0_f64.to_radians(), 46.5_f64.to_radians());
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_scale_unity_on_standard_parallels() {
        let proj = lambert93();
        for lat in [44.0_f64, 49.0] {
            let k = proj.scale_k(0.0, lat.to_radians()).unwrap();
            assert_relative_eq!(k, 1.0, epsilon = 1e-12);
        }
        let mid = proj.scale_k(0.0, 46.5_f64.to_radians()).unwrap();
        assert!(mid < 1.0);
    }

    #[test]
    fn test_analytic_matches_numeric() {
        let proj = lambert93();
        let fwd = |l: f64, p: f64| {
            let (x, y, _) = proj.forward(l, p);
            (x, y)
        };
        let (l, p) = (8.0_f64.to_radians(), 43.0_f64.to_radians());
        assert_relative_eq!(
            proj.scale_k(l, p).unwrap(),
            numeric_k(&WGS84, 1.0, l, p, fwd),
            epsilon = 1e-7
        );
        assert_relative_eq!(
            proj.convergence(l, p).unwrap(),
            numeric_convergence(l, p, fwd),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_far_pole_clamped() {
        let proj = lambert93();
        let (x, y, status) = proj.forward(0.0, -FRAC_PI_2);
        assert_eq!(status, Status::Range);
        assert!(x.is_finite() && y.is_finite());
        // The apex pole is inside the domain.
        let (_, _, status) = proj.forward(0.0, FRAC_PI_2);
        assert_eq!(status, Status::Normal);
    }

    #[test]
    fn test_apex_inverse_indeterminate() {
        let proj = lambert93();
        let (x, y, _) = proj.forward(0.0, FRAC_PI_2);
        let (lon, lat, status) = proj.inverse(x, y);
        assert_eq!(status, Status::Indeterminate);
        assert_relative_eq!(lat, FRAC_PI_2);
        assert_relative_eq!(lon, 3.0_f64.to_radians());
    }

    #[test]
    fn test_southern_cone_roundtrip() {
        let proj = LambertConformalConic::new_2sp(
            WGS84,
            135.0_f64.to_radians(),
            0.0,
            (-18.0_f64).to_radians(),
            (-36.0_f64).to_radians(),
            1.0,
        );
        assert!(proj.cone_constant() < 0.0);
        let (lon, lat) = (140.0_f64.to_radians(), (-30.0_f64).to_radians());
        let (x, y, _) = proj.forward(lon, lat);
        let (lon2, lat2, _) = proj.inverse(x, y);
        assert_relative_eq!(lon2, lon, epsilon = 1e-9);
        assert_relative_eq!(lat2, lat, epsilon = 1e-9);
    }

    #[test]
    fn test_southern_2sp_through_coordsys() {
        let cs = crate::proj::coordsys::CoordSys::new(CsDef {
            org_lng: 145.0,
            org_lat: -37.0,
            std_parallel_1: Some(-36.0),
            std_parallel_2: Some(-38.0),
            ..CsDef::new("VICGRID94", "LM2SP")
        })
        .unwrap();
        for ll in [[144.0, -37.5], [150.0, -33.0], [141.0, -39.0]] {
            let (xy, _) = cs.ll2cs(ll);
            let (back, status) = cs.cs2ll(xy);
            assert_eq!(status, Status::Normal);
            assert!(back[1].is_finite());
            assert_relative_eq!(back[0], ll[0], epsilon = 1e-9);
            assert_relative_eq!(back[1], ll[1], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_check_symmetric_parallels() {
        let def = CsDef {
            std_parallel_1: Some(30.0),
            std_parallel_2: Some(-30.0),
            ..CsDef::new("X", "LM2SP")
        };
        assert_eq!(check_all(&def), vec![QcError::StdParallelSymmetric]);

        let def = CsDef::new("X", "LM2SP");
        assert_eq!(
            check_all(&def),
            vec![QcError::StdParallel, QcError::StdParallel]
        );
    }
}
