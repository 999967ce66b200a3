//! Transverse Mercator projection: Krüger n-series, 6th order.
//!
//! Implements the Karney (2011) formulation with 6th-order α/β series coefficients,
//! including the closed forms for point scale and grid convergence.
//! The `UTM` registry entry is the same projection with zone-derived parameters.

use std::f64::consts::FRAC_PI_2;

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, rectifying_radius, MILLI_ARC_SEC};
use crate::proj::csdef::{check_scl_red, CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

/// Normalised easting beyond which the series are not evaluated
/// (roughly 89° from the central meridian on the equator).
const ETA_MAX: f64 = 4.7;

/// Angular half-width of the singular neighbourhood at (±90°, 0°).
const SINGULAR_EPS: f64 = 1.0e-7;

pub struct TransverseMercator {
    ellipsoid: Ellipsoid,
    lon0: f64,
    k0: f64,
    // Precomputed constants
    ka_hat: f64,     // k0 · A · unit scale
    a_ratio: f64,    // A / a
    alpha: [f64; 6], // Forward series coefficients
    beta: [f64; 6],  // Inverse series coefficients
    m0: f64,         // Normalized meridional arc at lat0
    utm_origin: Option<(f64, f64)>,
}

impl TransverseMercator {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, lat0: f64, k0: f64, unit_scale: f64) -> Self {
        let n = ellipsoid.n;
        let n2 = n * n;
        let n3 = n2 * n;
        let n4 = n3 * n;
        let n5 = n4 * n;
        let n6 = n5 * n;

        let a_hat = rectifying_radius(&ellipsoid);

        let alpha = Self::alpha_coefficients(n, n2, n3, n4, n5, n6);
        let beta = Self::beta_coefficients(n, n2, n3, n4, n5, n6);

        let mut tm = Self {
            ellipsoid,
            lon0,
            k0,
            ka_hat: k0 * a_hat * unit_scale,
            a_ratio: a_hat / ellipsoid.a,
            alpha,
            beta,
            m0: 0.0,
            utm_origin: None,
        };
        // The normalised arc at lat0 is ξ of the central-meridian point.
        if lat0 != 0.0 {
            let (xi, _) = tm.conformal_series(0.0, lat0);
            tm.m0 = xi;
        }
        tm
    }

    /// Create a Transverse Mercator for a UTM zone.
    ///
    /// `hemisphere` of -1 selects the southern false northing; 0 and 1 the northern.
    pub fn utm_zone(ellipsoid: Ellipsoid, zone: i32, hemisphere: i32, unit_scale: f64) -> Self {
        let lon0 = ((zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians();
        let false_northing = if hemisphere < 0 { 10_000_000.0 } else { 0.0 };
        let mut tm = Self::new(ellipsoid, lon0, 0.0, 0.9996, unit_scale);
        tm.utm_origin = Some((500_000.0 * unit_scale, false_northing * unit_scale));
        tm
    }

    /// Forward series coefficients α₁..α₆ (Krüger, 6th order).
    fn alpha_coefficients(n: f64, n2: f64, n3: f64, n4: f64, n5: f64, n6: f64) -> [f64; 6] {
        [
            // α₁
            n / 2.0 - 2.0 / 3.0 * n2 + 5.0 / 16.0 * n3 + 41.0 / 180.0 * n4 - 127.0 / 288.0 * n5
                + 7891.0 / 37800.0 * n6,
            // α₂
            13.0 / 48.0 * n2 - 3.0 / 5.0 * n3 + 557.0 / 1440.0 * n4 + 281.0 / 630.0 * n5
                - 1983433.0 / 1935360.0 * n6,
            // α₃
            61.0 / 240.0 * n3 - 103.0 / 140.0 * n4
                + 15061.0 / 26880.0 * n5
                + 167603.0 / 181440.0 * n6,
            // α₄
            49561.0 / 161280.0 * n4 - 179.0 / 168.0 * n5 + 6601661.0 / 7257600.0 * n6,
            // α₅
            34729.0 / 80640.0 * n5 - 3418889.0 / 1995840.0 * n6,
            // α₆
            212378941.0 / 319334400.0 * n6,
        ]
    }

    /// Inverse series coefficients β₁..β₆ (Krüger, 6th order).
    fn beta_coefficients(n: f64, n2: f64, n3: f64, n4: f64, n5: f64, n6: f64) -> [f64; 6] {
        [
            // β₁
            n / 2.0 - 2.0 / 3.0 * n2 + 37.0 / 96.0 * n3 - 1.0 / 360.0 * n4 - 81.0 / 512.0 * n5
                + 96199.0 / 604800.0 * n6,
            // β₂
            1.0 / 48.0 * n2 + 1.0 / 15.0 * n3 - 437.0 / 1440.0 * n4 + 46.0 / 105.0 * n5
                - 1118711.0 / 3870720.0 * n6,
            // β₃
            17.0 / 480.0 * n3 - 37.0 / 840.0 * n4 - 209.0 / 4480.0 * n5 + 5569.0 / 90720.0 * n6,
            // β₄
            4397.0 / 161280.0 * n4 - 11.0 / 504.0 * n5 - 830251.0 / 7257600.0 * n6,
            // β₅
            4583.0 / 161280.0 * n5 - 108847.0 / 3991680.0 * n6,
            // β₆
            20648693.0 / 638668800.0 * n6,
        ]
    }

    /// Convert geodetic tangent τ to conformal tangent τ'.
    fn tau_to_tau_prime(&self, tau: f64) -> f64 {
        let e = self.ellipsoid.eccentricity();
        let tau1 = (1.0 + tau * tau).sqrt(); // = sec(φ) = hypot(1, τ)
        let sigma = (e * (e * tau / tau1).atanh()).sinh();
        tau * (1.0 + sigma * sigma).sqrt() - sigma * tau1
    }

    /// Convert conformal tangent τ' back to geodetic tangent τ via Newton iteration.
    fn tau_prime_to_tau(&self, tau_prime: f64) -> f64 {
        let e = self.ellipsoid.eccentricity();
        let e2 = self.ellipsoid.e2;
        let mut tau = tau_prime; // initial guess

        for _ in 0..15 {
            let tau1 = (1.0 + tau * tau).sqrt();
            let sigma = (e * (e * tau / tau1).atanh()).sinh();
            let tau_prime_est = tau * (1.0 + sigma * sigma).sqrt() - sigma * tau1;
            let dtau = (tau_prime - tau_prime_est) * (1.0 + (1.0 - e2) * tau * tau)
                / ((1.0 - e2) * tau1 * (1.0 + tau_prime_est * tau_prime_est).sqrt());
            tau += dtau;
            if dtau.abs() < 1e-12 * (1.0 + tau.abs()) {
                break;
            }
        }
        tau
    }

    /// Gauss-Schreiber sphere coordinates (ξ', η') of a point, with the
    /// longitude already reduced to the central meridian.
    fn gauss_schreiber(&self, dlam: f64, lat: f64) -> (f64, f64, f64) {
        let tau = lat.tan();
        let tau_prime = self.tau_to_tau_prime(tau);
        let xi_prime = tau_prime.atan2(dlam.cos());
        let eta_prime = (dlam.sin() / tau_prime.hypot(dlam.cos())).asinh();
        (xi_prime, eta_prime, tau_prime)
    }

    /// Apply the α series: (ξ', η') → (ξ, η).
    fn conformal_series(&self, dlam: f64, lat: f64) -> (f64, f64) {
        let (xi_prime, eta_prime, _) = self.gauss_schreiber(dlam, lat);
        let mut xi = xi_prime;
        let mut eta = eta_prime;
        for (j, &a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi += a * (k * xi_prime).sin() * (k * eta_prime).cosh();
            eta += a * (k * xi_prime).cos() * (k * eta_prime).sinh();
        }
        (xi, eta)
    }

    /// Clamp a geographic point into the domain |Δλ| ≤ 90°, |φ| ≤ 90°.
    fn clamp_ll(&self, lng: f64, lat: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut dlam = adj_lng(lng - self.lon0);
        let mut lat = lat;
        if lat.abs() > FRAC_PI_2 {
            status = Status::Range;
            lat = FRAC_PI_2.copysign(lat);
        }
        if dlam.abs() > FRAC_PI_2 {
            status = Status::Range;
            dlam = FRAC_PI_2.copysign(dlam);
        }
        if dlam.abs() > FRAC_PI_2 - SINGULAR_EPS && lat.abs() < SINGULAR_EPS {
            // (±90°, 0) maps to infinity.
            status = Status::Range;
            lat = SINGULAR_EPS.copysign(if lat == 0.0 { 1.0 } else { lat });
        }
        (dlam, lat, status)
    }
}

impl Projection for TransverseMercator {
    fn forward(&self, lng: f64, lat: f64) -> (f64, f64, Status) {
        let (dlam, lat, status) = self.clamp_ll(lng, lat);
        let (xi, eta) = self.conformal_series(dlam, lat);

        let x = self.ka_hat * eta;
        let y = self.ka_hat * (xi - self.m0);
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut eta = x / self.ka_hat;
        let xi = y / self.ka_hat + self.m0;
        if eta.abs() > ETA_MAX {
            status = Status::Range;
            eta = ETA_MAX.copysign(eta);
        }

        // Apply β series (inverse)
        let mut xi_prime = xi;
        let mut eta_prime = eta;
        for (j, &b) in self.beta.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            xi_prime -= b * (k * xi).sin() * (k * eta).cosh();
            eta_prime -= b * (k * xi).cos() * (k * eta).sinh();
        }

        // τ' = sin(ξ') / hypot(sinh(η'), cos(ξ'))
        let sinh_eta = eta_prime.sinh();
        let cos_xi = xi_prime.cos();
        let sin_xi = xi_prime.sin();
        let r = sinh_eta.hypot(cos_xi);
        if r < MILLI_ARC_SEC {
            // At a pole: longitude undefined, report the central meridian.
            let lat = FRAC_PI_2.copysign(sin_xi);
            return (self.lon0, lat, status.worst(Status::Indeterminate));
        }
        let tau_prime = sin_xi / r;

        // Recover geodetic tangent τ from conformal tangent τ'
        let tau = self.tau_prime_to_tau(tau_prime);

        let lat = tau.atan();
        let lng = adj_lng(self.lon0 + sinh_eta.atan2(cos_xi));
        (lng, lat, status)
    }

    fn scale_k(&self, lng: f64, lat: f64) -> Option<f64> {
        let (dlam, lat, _) = self.clamp_ll(lng, lat);
        let (xi_p, eta_p, tau_p) = self.gauss_schreiber(dlam, lat);
        let (p, q) = self.series_derivatives(xi_p, eta_p);
        let tau = lat.tan();
        let sin_lat = lat.sin();
        let k_prime = (1.0 - self.ellipsoid.e2 * sin_lat * sin_lat).sqrt() * (1.0 + tau * tau).sqrt()
            / (tau_p * tau_p + dlam.cos() * dlam.cos()).sqrt();
        Some(self.k0 * self.a_ratio * k_prime * p.hypot(q))
    }

    fn scale_h(&self, lng: f64, lat: f64) -> Option<f64> {
        self.scale_k(lng, lat)
    }

    fn convergence(&self, lng: f64, lat: f64) -> Option<f64> {
        let (dlam, lat, _) = self.clamp_ll(lng, lat);
        let (xi_p, eta_p, _) = self.gauss_schreiber(dlam, lat);
        let (p, q) = self.series_derivatives(xi_p, eta_p);
        let gamma_prime = (xi_p.tan() * eta_p.tanh()).atan();
        let gamma = gamma_prime + q.atan2(p);
        Some(gamma.to_degrees())
    }

    fn ll_domain(&self, lng: f64, lat: f64) -> Status {
        self.clamp_ll(lng, lat).2
    }

    fn xy_domain(&self, x: f64, _y: f64) -> Status {
        if (x / self.ka_hat).abs() > ETA_MAX {
            Status::Range
        } else {
            Status::Normal
        }
    }

    fn central_meridian(&self) -> f64 {
        self.lon0
    }

    fn default_ll_bounds(&self) -> ([f64; 2], [f64; 2]) {
        if self.utm_origin.is_some() {
            bounds_around(self.lon0, 3.0, -80.0, 84.0)
        } else {
            bounds_around(self.lon0, 15.0, -84.0, 84.0)
        }
    }

    fn fixed_false_origin(&self) -> Option<(f64, f64)> {
        self.utm_origin
    }

    fn is_conformal(&self) -> bool {
        true
    }

    fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }
}

impl TransverseMercator {
    /// p = 1 + Σ 2jα cos(2jξ') cosh(2jη'),  q = Σ 2jα sin(2jξ') sinh(2jη')
    fn series_derivatives(&self, xi_p: f64, eta_p: f64) -> (f64, f64) {
        let mut p = 1.0;
        let mut q = 0.0;
        for (j, &a) in self.alpha.iter().enumerate() {
            let k = 2.0 * (j as f64 + 1.0);
            p += k * a * (k * xi_p).cos() * (k * eta_p).cosh();
            q += k * a * (k * xi_p).sin() * (k * eta_p).sinh();
        }
        (p, q)
    }
}

pub(crate) fn check(def: &CsDef, sink: &mut QcSink<'_>) {
    check_scl_red(def, sink);
    if def.org_lat.abs() >= 90.0 {
        sink.push(QcError::OrgLat);
    }
}

pub(crate) fn check_utm(def: &CsDef, sink: &mut QcSink<'_>) {
    if !(1..=60).contains(&def.zone) {
        sink.push(QcError::Zone);
    }
    if !(-1..=1).contains(&def.hemisphere) {
        sink.push(QcError::Hemisphere);
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(TransverseMercator::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        def.org_lat.to_radians(),
        def.scl_red,
        args.unit_scale,
    )))
}

pub(crate) fn setup_utm(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    Ok(Box::new(TransverseMercator::utm_zone(
        args.ellipsoid,
        args.def.zone,
        args.def.hemisphere,
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::common::{numeric_convergence, numeric_k};
    use crate::proj::ellipsoid::WGS84;
    use approx::assert_relative_eq;

    fn utm(zone: i32, hemisphere: i32) -> TransverseMercator {
        TransverseMercator::utm_zone(WGS84, zone, hemisphere, 1.0)
    }

    /// Forward through the fixed UTM false origin, as a coordinate system would.
    fn utm_fwd(tm: &TransverseMercator, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let (x, y, _) = tm.forward(lon_deg.to_radians(), lat_deg.to_radians());
        let (fe, fn_) = tm.fixed_false_origin().unwrap();
        (x + fe, y + fn_)
    }

    #[test]
    fn test_roundtrip_utm33() {
        let tm = utm(33, 1);
        let cases: &[(f64, f64)] = &[
            (15.0, 52.0), // Berlin area (central meridian)
            (12.0, 50.0), // near zone boundary
            (18.0, 50.0), // near other boundary
            (15.0, 0.0),  // equator
            (15.0, 80.0), // high latitude
            (13.5, 52.5), // off-center
        ];
        for &(lon_deg, lat_deg) in cases {
            let lon = lon_deg.to_radians();
            let lat = lat_deg.to_radians();
            let (x, y, status) = tm.forward(lon, lat);
            assert_eq!(status, Status::Normal);
            let (lon2, lat2, status) = tm.inverse(x, y);
            assert_eq!(status, Status::Normal);
            assert_relative_eq!(lon2, lon, epsilon = 1e-9);
            assert_relative_eq!(lat2, lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_central_meridian_easting() {
        let tm = utm(33, 1);
        let (e, _) = utm_fwd(&tm, 15.0, 45.0);
        assert_relative_eq!(e, 500_000.0, epsilon = 0.01);
    }

    #[test]
    fn test_utm_zone33n_known_point() {
        // (15°E, 52°N) → UTM Zone 33N: on the central meridian, northing ≈ 5.76M
        let tm = utm(33, 1);
        let (e, n) = utm_fwd(&tm, 15.0, 52.0);
        assert_relative_eq!(e, 500_000.0, epsilon = 1.0);
        assert!(n > 5_760_000.0 && n < 5_762_000.0, "northing = {n}");
    }

    #[test]
    fn test_utm_zone_central_meridian() {
        assert_relative_eq!(utm(1, 1).lon0, (-177.0_f64).to_radians(), epsilon = 1e-10);
        assert_relative_eq!(utm(33, 1).lon0, 15.0_f64.to_radians(), epsilon = 1e-10);
        assert_relative_eq!(utm(60, 1).lon0, 177.0_f64.to_radians(), epsilon = 1e-10);
    }

    #[test]
    fn test_southern_hemisphere() {
        let tm = utm(33, -1);
        let (x, y) = utm_fwd(&tm, 15.0, -30.0);
        assert!(y > 0.0, "Southing should be positive with FN=10M, got {y}");
        let (lon2, lat2, _) = tm.inverse(x - 500_000.0, y - 10_000_000.0);
        assert_relative_eq!(lon2, 15.0_f64.to_radians(), epsilon = 1e-9);
        assert_relative_eq!(lat2, (-30.0_f64).to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn test_zone18_regression_point() {
        // Central meridian -75°, origin latitude 0°, k0 0.9996
        let tm = TransverseMercator::new(WGS84, (-75.0_f64).to_radians(), 0.0, 0.9996, 1.0);
        let (x, y, status) = tm.forward((-75.5_f64).to_radians(), 40.0_f64.to_radians());
        assert_eq!(status, Status::Normal);
        assert_relative_eq!(x, -42_679.945, epsilon = 0.001);
        assert_relative_eq!(y, 4_427_876.924, epsilon = 0.001);

        let (lon, lat, _) = tm.inverse(x, y);
        assert_relative_eq!(lon.to_degrees(), -75.5, epsilon = 1e-8);
        assert_relative_eq!(lat.to_degrees(), 40.0, epsilon = 1e-8);
    }

    #[test]
    fn test_origin_latitude_offsets_northing() {
        let tm = TransverseMercator::new(WGS84, 0.0, 49.0_f64.to_radians(), 1.0, 1.0);
        let (x, y, _) = tm.forward(0.0, 49.0_f64.to_radians());
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_beyond_ninety_degrees_is_clamped() {
        let tm = TransverseMercator::new(WGS84, (-75.0_f64).to_radians(), 0.0, 0.9996, 1.0);
        let lat = 40.0_f64.to_radians();
        let (xb, yb, _) = tm.forward(15.0_f64.to_radians(), lat);
        let (x, y, status) = tm.forward(15.5_f64.to_radians(), lat);
        assert_eq!(status, Status::Range);
        assert_relative_eq!(x, xb, epsilon = 1e-6);
        assert_relative_eq!(y, yb, epsilon = 1e-6);
    }

    #[test]
    fn test_singular_point_is_finite() {
        let tm = TransverseMercator::new(WGS84, 0.0, 0.0, 1.0, 1.0);
        let (x, y, status) = tm.forward(std::f64::consts::FRAC_PI_2, 0.0);
        assert_eq!(status, Status::Range);
        assert!(x.is_finite() && y.is_finite());
    }

    #[test]
    fn test_pole_inverse_indeterminate() {
        let tm = TransverseMercator::new(WGS84, 0.3, 0.0, 1.0, 1.0);
        let (_, y, _) = tm.forward(0.3, FRAC_PI_2);
        let (lon, lat, status) = tm.inverse(0.0, y);
        assert_eq!(status, Status::Indeterminate);
        assert_relative_eq!(lon, 0.3);
        assert_relative_eq!(lat, FRAC_PI_2);
    }

    #[test]
    fn test_scale_and_convergence_match_numeric() {
        let tm = TransverseMercator::new(WGS84, (-75.0_f64).to_radians(), 0.0, 0.9996, 1.0);
        let fwd = |l: f64, p: f64| {
            let (x, y, _) = tm.forward(l, p);
            (x, y)
        };
        for &(lon, lat) in &[(-72.0_f64, 40.0_f64), (-78.5, -33.0), (-75.0, 10.0)] {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let k = tm.scale_k(l, p).unwrap();
            assert_relative_eq!(k, numeric_k(&WGS84, 1.0, l, p, fwd), epsilon = 1e-7);
            let gamma = tm.convergence(l, p).unwrap();
            assert_relative_eq!(gamma, numeric_convergence(l, p, fwd), epsilon = 1e-6);
        }
        // On the central meridian, k = k0 and γ = 0
        let k = tm.scale_k((-75.0_f64).to_radians(), 0.5).unwrap();
        assert_relative_eq!(k, 0.9996, epsilon = 1e-12);
    }

    #[test]
    fn test_unit_scale_feet() {
        let us_foot = 1200.0 / 3937.0;
        let m = TransverseMercator::new(WGS84, 0.0, 0.0, 0.9996, 1.0);
        let ft = TransverseMercator::new(WGS84, 0.0, 0.0, 0.9996, 1.0 / us_foot);
        let (xm, ym, _) = m.forward(0.02, 0.7);
        let (xf, yf, _) = ft.forward(0.02, 0.7);
        assert_relative_eq!(xf * us_foot, xm, epsilon = 1e-6);
        assert_relative_eq!(yf * us_foot, ym, epsilon = 1e-6);
        assert_relative_eq!(ft.scale_k(0.02, 0.7).unwrap(), m.scale_k(0.02, 0.7).unwrap());
    }

    #[test]
    fn test_multiple_zones() {
        for zone in [1, 10, 17, 30, 33, 45, 60] {
            let tm = utm(zone, 1);
            let cm_deg = (zone as f64 - 1.0) * 6.0 - 180.0 + 3.0;
            let lon = (cm_deg + 2.0).to_radians();
            let lat = 45.0_f64.to_radians();
            let (x, y, _) = tm.forward(lon, lat);
            let (lon2, lat2, _) = tm.inverse(x, y);
            assert_relative_eq!(lon2, lon, epsilon = 1e-9);
            assert_relative_eq!(lat2, lat, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_utm_check() {
        let mut def = CsDef::new("UTM", "UTM");
        def.zone = 61;
        def.hemisphere = 2;
        let mut list = Vec::new();
        let mut sink = QcSink::new(Some(&mut list), 10);
        check_utm(&def, &mut sink);
        assert_eq!(sink.count(), 2);
        assert_eq!(list, vec![QcError::Zone, QcError::Hemisphere]);
    }
}
