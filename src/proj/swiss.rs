//! Swiss Oblique Cylindrical projection (swisstopo rigorous formulas).
//!
//! Double projection: the ellipsoid goes conformally onto a sphere of radius
//! R tangent at the origin, the sphere is rotated so the origin sits on the
//! equator, then a normal Mercator is applied.
//!
//! Output x is easting (Swiss "y"), output y is northing (Swiss "x").

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::error::{CsResult, Status};
use crate::proj::common::adj_lng;
use crate::proj::csdef::{CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

const MAX_ITERATIONS: usize = 20;
const LAT_TOLERANCE: f64 = 1.0e-12;

pub struct SwissOblique {
    ellipsoid: Ellipsoid,
    lon0: f64,
    e: f64,
    /// Radius of the projection sphere in system units.
    r: f64,
    alpha: f64,
    sin_b0: f64,
    cos_b0: f64,
    k: f64,
}

impl SwissOblique {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, lat0: f64, unit_scale: f64) -> Self {
        let e2 = ellipsoid.e2;
        let e = ellipsoid.eccentricity();
        let sin0 = lat0.sin();

        let r = ellipsoid.a * (1.0 - e2).sqrt() / (1.0 - e2 * sin0 * sin0);
        let alpha = (1.0 + e2 / (1.0 - e2) * lat0.cos().powi(4)).sqrt();
        let b0 = (sin0 / alpha).asin();
        let k = (FRAC_PI_4 + b0 / 2.0).tan().ln() - alpha * (FRAC_PI_4 + lat0 / 2.0).tan().ln()
            + alpha * e / 2.0 * ((1.0 + e * sin0) / (1.0 - e * sin0)).ln();

        Self {
            ellipsoid,
            lon0,
            e,
            r: r * unit_scale,
            alpha,
            sin_b0: b0.sin(),
            cos_b0: b0.cos(),
            k,
        }
    }

    /// Geodetic latitude to latitude on the projection sphere.
    fn sphere_lat(&self, lat: f64) -> f64 {
        let es = self.e * lat.sin();
        let s = self.alpha * (FRAC_PI_4 + lat / 2.0).tan().ln()
            - self.alpha * self.e / 2.0 * ((1.0 + es) / (1.0 - es)).ln()
            + self.k;
        2.0 * (s.exp().atan() - FRAC_PI_4)
    }

    /// Sphere latitude back to geodetic latitude, by fixed-point iteration.
    fn geodetic_lat(&self, b: f64) -> f64 {
        let base = ((FRAC_PI_4 + b / 2.0).tan().ln() - self.k) / self.alpha;
        let mut lat = b;
        for _ in 0..MAX_ITERATIONS {
            let s = base + self.e * (FRAC_PI_4 + (self.e * lat.sin()).asin() / 2.0).tan().ln();
            let next = 2.0 * s.exp().atan() - FRAC_PI_2;
            let delta = next - lat;
            lat = next;
            if delta.abs() < LAT_TOLERANCE {
                break;
            }
        }
        lat
    }
}

impl Projection for SwissOblique {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let mut status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let b = self.sphere_lat(lat);
        let l = self.alpha * adj_lng(lon - self.lon0);

        // Rotate the sphere: pseudo-equatorial system
        let l_bar = l
            .sin()
            .atan2(self.sin_b0 * b.tan() + self.cos_b0 * l.cos());
        let mut sin_b_bar = self.cos_b0 * b.sin() - self.sin_b0 * b.cos() * l.cos();
        // The pseudo-poles sit 90° from the origin: Mercator diverges there.
        let limit = 1.0 - 1.0e-12;
        if sin_b_bar.abs() > limit {
            status = Status::Range;
            sin_b_bar = limit.copysign(sin_b_bar);
        }

        let x = self.r * l_bar;
        let y = self.r / 2.0 * ((1.0 + sin_b_bar) / (1.0 - sin_b_bar)).ln();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let l_bar = x / self.r;
        let b_bar = 2.0 * ((y / self.r).exp().atan() - FRAC_PI_4);

        let b = (self.cos_b0 * b_bar.sin() + self.sin_b0 * b_bar.cos() * l_bar.cos())
            .clamp(-1.0, 1.0)
            .asin();
        let l = l_bar
            .sin()
            .atan2(self.cos_b0 * l_bar.cos() - self.sin_b0 * b_bar.tan());

        let lon = adj_lng(self.lon0 + l / self.alpha);
        let lat = self.geodetic_lat(b);
        let status = if l_bar.abs() > std::f64::consts::PI {
            Status::Range
        } else {
            Status::Normal
        };
        (lon, lat, status)
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        let cm = self.lon0.to_degrees();
        ([cm - 5.0, 44.0], [cm + 5.0, 49.5])
    }

    fn is_conformal(&self) -> bool {
        true
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    if def.org_lat.abs() >= 90.0 {
        sink.push(QcError::OrgLat);
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(SwissOblique::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.org_lat.to_radians(),
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::common::numeric_convergence;
    use crate::proj::ellipsoid::BESSEL1841;
    use approx::assert_relative_eq;

    fn dms(d: f64, m: f64, s: f64) -> f64 {
        (d + m / 60.0 + s / 3600.0).to_radians()
    }

    /// CH1903 / LV03: origin at the old observatory of Bern.
    fn lv03() -> SwissOblique {
        SwissOblique::new(BESSEL1841, dms(7.0, 26.0, 22.50), dms(46.0, 57.0, 8.66), 1.0)
    }

    #[test]
    fn test_origin() {
        let (x, y, status) = lv03().forward(dms(7.0, 26.0, 22.50), dms(46.0, 57.0, 8.66));
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_known_point() {
        // Bessel coordinates 8°43'49.79" E, 46°02'38.87" N
        let (x, y, _) = lv03().forward(dms(8.0, 43.0, 49.79), dms(46.0, 2.0, 38.87));
        assert_relative_eq!(x + 600_000.0, 699_914.740, epsilon = 0.001);
        assert_relative_eq!(y + 200_000.0, 99_864.921, epsilon = 0.001);
    }

    #[test]
    fn test_roundtrip() {
        let proj = lv03();
        for &(lon, lat) in &[(6.1_f64, 46.2_f64), (9.5, 47.5), (7.4, 46.9), (10.4, 45.9)] {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let (x, y, _) = proj.forward(l, p);
            let (l2, p2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal);
            assert_relative_eq!(l2, l, epsilon = 1e-11);
            assert_relative_eq!(p2, p, epsilon = 1e-11);
        }
    }

    #[test]
    fn test_convergence_sign() {
        // East of Bern grid north lies east of true north.
        let proj = lv03();
        let fwd = |l: f64, p: f64| {
            let (x, y, _) = proj.forward(l, p);
            (x, y)
        };
        let gamma = numeric_convergence(9.5_f64.to_radians(), 46.5_f64.to_radians(), fwd);
        assert!(gamma > 0.0 && gamma < 2.0, "gamma = {gamma}");
    }
}
