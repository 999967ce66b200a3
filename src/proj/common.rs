//! Common helpers for projection math (meridional arc, latitude conversions,
//! longitude normalisation, numerical scale/convergence evaluation).

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use super::ellipsoid::Ellipsoid;

/// 0.001 arc-seconds in radians.
pub const MILLI_ARC_SEC: f64 = 4.848_136_811_095_36e-9;

/// Latitudes closer to a pole than this are treated as being at the pole.
pub const NP_TEST: f64 = FRAC_PI_2 - MILLI_ARC_SEC;

pub const TWO_PI: f64 = 2.0 * PI;

/// Normalise a longitude difference into (-π, π].
pub fn adj_lng(lng: f64) -> f64 {
    if lng > -PI && lng <= PI {
        return lng;
    }
    let mut l = lng % TWO_PI;
    if l > PI {
        l -= TWO_PI;
    } else if l <= -PI {
        l += TWO_PI;
    }
    l
}

/// Normalise a longitude in degrees into (-180, 180].
pub fn adj_lng_deg(lng: f64) -> f64 {
    adj_lng(lng.to_radians()).to_degrees()
}

/// Compute the meridional arc length from the equator to latitude phi.
/// Uses the series expansion in powers of n (third flattening).
pub fn meridional_arc(ellipsoid: &Ellipsoid, phi: f64) -> f64 {
    let n = ellipsoid.n;
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;

    let a = rectifying_radius(ellipsoid);

    let a2 = -3.0 / 2.0 * n + 9.0 / 16.0 * n3;
    let a4 = 15.0 / 16.0 * n2 - 15.0 / 32.0 * n4;
    let a6 = -35.0 / 48.0 * n3;
    let a8 = 315.0 / 512.0 * n4;

    a * (phi
        + a2 * (2.0 * phi).sin()
        + a4 * (4.0 * phi).sin()
        + a6 * (6.0 * phi).sin()
        + a8 * (8.0 * phi).sin())
}

/// Latitude whose meridional arc is `m` (footpoint latitude).
pub fn meridional_arc_inverse(ellipsoid: &Ellipsoid, m: f64) -> f64 {
    let n = ellipsoid.n;
    let n2 = n * n;
    let n3 = n2 * n;
    let n4 = n3 * n;

    let mu = m / rectifying_radius(ellipsoid);

    mu + (3.0 / 2.0 * n - 27.0 / 32.0 * n3) * (2.0 * mu).sin()
        + (21.0 / 16.0 * n2 - 55.0 / 32.0 * n4) * (4.0 * mu).sin()
        + (151.0 / 96.0 * n3) * (6.0 * mu).sin()
        + (1097.0 / 512.0 * n4) * (8.0 * mu).sin()
}

/// A = a/(1+n) · (1 + n²/4 + n⁴/64), the radius of the rectifying sphere.
pub fn rectifying_radius(ellipsoid: &Ellipsoid) -> f64 {
    let n2 = ellipsoid.n * ellipsoid.n;
    ellipsoid.a / (1.0 + ellipsoid.n) * (1.0 + n2 / 4.0 + n2 * n2 / 64.0)
}

/// m = cos φ / sqrt(1 - e² sin² φ)
pub fn msfn(phi: f64, e2: f64) -> f64 {
    let s = phi.sin();
    phi.cos() / (1.0 - e2 * s * s).sqrt()
}

/// t = tan(π/4 - φ/2) / ((1 - e sin φ) / (1 + e sin φ))^(e/2)
pub fn tsfn(phi: f64, e: f64) -> f64 {
    let es = e * phi.sin();
    (FRAC_PI_4 - phi / 2.0).tan() / ((1.0 - es) / (1.0 + es)).powf(e / 2.0)
}

const QSFN_SERIES_E: f64 = 1.0e-3;

/// q as used by the authalic (equal-area) projections.
pub fn qsfn(phi: f64, e: f64) -> f64 {
    let s = phi.sin();
    let es = e * s;
    if e < QSFN_SERIES_E {
        // s·Σ 2(k+1)/(2k+1)·(e s)^2k; the closed form cancels for small e
        let x2 = es * es;
        let sum = 2.0 + x2 * (4.0 / 3.0 + x2 * (6.0 / 5.0 + x2 * (8.0 / 7.0)));
        return (1.0 - e * e) * s * sum;
    }
    (1.0 - e * e) * (s / (1.0 - es * es) - (0.5 / e) * ((1.0 - es) / (1.0 + es)).ln())
}

/// Isometric latitude ψ = -ln(t).
pub fn isometric_lat(phi: f64, e: f64) -> f64 {
    -tsfn(phi, e).ln()
}

/// Recover φ from t by fixed-point iteration.
pub fn phi_from_ts(ts: f64, e: f64) -> f64 {
    let half_e = e / 2.0;
    let mut phi = FRAC_PI_2 - 2.0 * ts.atan();
    for _ in 0..15 {
        let es = e * phi.sin();
        let next = FRAC_PI_2 - 2.0 * (ts * ((1.0 - es) / (1.0 + es)).powf(half_e)).atan();
        let delta = next - phi;
        phi = next;
        if delta.abs() < 1.0e-14 {
            break;
        }
    }
    phi
}

/// Recover φ from an isometric latitude.
pub fn phi_from_isometric(psi: f64, e: f64) -> f64 {
    phi_from_ts((-psi).exp(), e)
}

const NUMERIC_DELTA: f64 = 1.0e-6;

/// Scale along the parallel by central differences of `forward`
/// (radians in, system units out). `unit_scale` converts metres on the
/// ellipsoid into system units.
pub fn numeric_k<F>(ellipsoid: &Ellipsoid, unit_scale: f64, lng: f64, lat: f64, forward: F) -> f64
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let lat = lat.clamp(-NP_TEST, NP_TEST);
    let (x1, y1) = forward(lng - NUMERIC_DELTA, lat);
    let (x2, y2) = forward(lng + NUMERIC_DELTA, lat);
    let grid = (x2 - x1).hypot(y2 - y1);
    let ground =
        ellipsoid.prime_vertical_radius(lat) * lat.cos() * 2.0 * NUMERIC_DELTA * unit_scale;
    grid / ground
}

/// Scale along the meridian by central differences of `forward`.
pub fn numeric_h<F>(ellipsoid: &Ellipsoid, unit_scale: f64, lng: f64, lat: f64, forward: F) -> f64
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let lat = lat.clamp(-FRAC_PI_2 + NUMERIC_DELTA, FRAC_PI_2 - NUMERIC_DELTA);
    let (x1, y1) = forward(lng, lat - NUMERIC_DELTA);
    let (x2, y2) = forward(lng, lat + NUMERIC_DELTA);
    let grid = (x2 - x1).hypot(y2 - y1);
    let ground = ellipsoid.meridian_radius(lat) * 2.0 * NUMERIC_DELTA * unit_scale;
    grid / ground
}

/// Grid convergence in degrees, positive when grid north lies east of
/// true north.
pub fn numeric_convergence<F>(lng: f64, lat: f64, forward: F) -> f64
where
    F: Fn(f64, f64) -> (f64, f64),
{
    let lat = lat.clamp(-FRAC_PI_2 + NUMERIC_DELTA, FRAC_PI_2 - NUMERIC_DELTA);
    let (x1, y1) = forward(lng, lat - NUMERIC_DELTA);
    let (x2, y2) = forward(lng, lat + NUMERIC_DELTA);
    -(x2 - x1).atan2(y2 - y1).to_degrees()
}

/// Newton solve of θ + sin θ = c·sin φ, shared by the pseudo-cylindrical
/// projections (Eckert VI with c = 1 + π/2, Mollweide in the 2θ form).
pub fn solve_auxiliary_angle(target: f64, start: f64, f: impl Fn(f64) -> (f64, f64)) -> f64 {
    let mut theta = start;
    for _ in 0..30 {
        let (value, slope) = f(theta);
        if slope.abs() < 1.0e-15 {
            break;
        }
        let delta = (value - target) / slope;
        theta -= delta;
        if delta.abs() < 1.0e-13 {
            break;
        }
    }
    theta
}
