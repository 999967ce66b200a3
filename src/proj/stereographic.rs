//! Polar Stereographic projection.
//!
//! Origin at either pole. Scale is given either as a scale reduction factor
//! at the pole or as a latitude of true scale (`std_parallel_1`).

use std::f64::consts::FRAC_PI_2;

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, msfn, phi_from_ts, tsfn, MILLI_ARC_SEC, NP_TEST};
use crate::proj::csdef::{check_scl_red, CsDef, QcError, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::Projection;

/// Polar Stereographic projection.
pub struct PolarStereographic {
    ellipsoid: Ellipsoid,
    lon0: f64,
    is_north: bool,
    e: f64,
    ka: f64,
    // Precomputed
    akm: f64, // ρ = akm · t
    k_pole: f64,
}

impl PolarStereographic {
    /// Scale reduction factor `k0` at the pole.
    pub fn with_scale(ellipsoid: Ellipsoid, lon0: f64, north: bool, k0: f64, unit_scale: f64) -> Self {
        let e = ellipsoid.eccentricity();
        let ka = ellipsoid.a * unit_scale;
        let ep = (1.0 + e).powf(1.0 + e) * (1.0 - e).powf(1.0 - e);
        Self {
            ellipsoid,
            lon0,
            is_north: north,
            e,
            ka,
            akm: ka * 2.0 * k0 / ep.sqrt(),
            k_pole: k0,
        }
    }

    /// Create a Polar Stereographic from latitude of true scale.
    pub fn with_true_scale(ellipsoid: Ellipsoid, lon0: f64, lat_ts: f64, unit_scale: f64) -> Self {
        let is_north = lat_ts >= 0.0;
        let e = ellipsoid.eccentricity();
        let ka = ellipsoid.a * unit_scale;

        let m_c = msfn(lat_ts.abs(), ellipsoid.e2);
        let t_c = tsfn(lat_ts.abs(), e);
        let akm = ka * m_c / t_c;
        let ep = (1.0 + e).powf(1.0 + e) * (1.0 - e).powf(1.0 - e);

        Self {
            ellipsoid,
            lon0,
            is_north,
            e,
            ka,
            akm,
            k_pole: akm * ep.sqrt() / (2.0 * ka),
        }
    }

    /// Latitude measured from the equator towards the origin pole.
    fn toward_pole(&self, lat: f64) -> f64 {
        if self.is_north {
            lat
        } else {
            -lat
        }
    }
}

impl Projection for PolarStereographic {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat_adj = self.toward_pole(lat).clamp(-NP_TEST, FRAC_PI_2);
        let sign = if self.is_north { 1.0 } else { -1.0 };

        let t = tsfn(lat_adj, self.e);
        let rho = self.akm * t;
        let dlam = adj_lng(lon - self.lon0);

        let x = sign * rho * dlam.sin();
        let y = -sign * rho * dlam.cos();
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let (x_adj, y_adj) = if self.is_north { (x, -y) } else { (-x, y) };

        let rho = x_adj.hypot(y_adj);
        if rho < self.ka * MILLI_ARC_SEC {
            let lat = if self.is_north { FRAC_PI_2 } else { -FRAC_PI_2 };
            return (self.lon0, lat, Status::Indeterminate);
        }
        let t = rho / self.akm;
        let lat_adj = phi_from_ts(t, self.e);

        let lon = adj_lng(self.lon0 + x_adj.atan2(y_adj));
        (lon, self.toward_pole(lat_adj), Status::Normal)
    }

    fn scale_k(&self, _lon: f64, lat: f64) -> Option<f64> {
        let lat_adj = self.toward_pole(lat).clamp(-NP_TEST, FRAC_PI_2);
        if lat_adj > NP_TEST {
            return Some(self.k_pole);
        }
        let rho = self.akm * tsfn(lat_adj, self.e);
        Some(rho / (self.ka * msfn(lat_adj, self.ellipsoid.e2)))
    }

    fn scale_h(&self, lon: f64, lat: f64) -> Option<f64> {
        self.scale_k(lon, lat)
    }

    fn convergence(&self, lon: f64, _lat: f64) -> Option<f64> {
        Some(adj_lng(lon - self.lon0).to_degrees())
    }

    fn ll_domain(&self, _lon: f64, lat: f64) -> Status {
        if lat.abs() > FRAC_PI_2 || self.toward_pole(lat) < -NP_TEST {
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
        if self.is_north {
            ([cm - 180.0, 60.0], [cm + 180.0, 90.0])
        } else {
            ([cm - 180.0, -90.0], [cm + 180.0, -60.0])
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
    if (def.org_lat.abs() - 90.0).abs() > 1.0e-9 {
        sink.push(QcError::OrgLat);
    }
    match def.std_parallel_1 {
        Some(lat_ts) => {
            if lat_ts == 0.0 || lat_ts.abs() > 90.0 || lat_ts.signum() != def.org_lat.signum() {
                sink.push(QcError::LatTrueScale);
            }
        }
        None => check_scl_red(def, sink),
    }
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    let lon0 = def.org_lng.to_radians();
    let proj = match def.std_parallel_1 {
        Some(lat_ts) => PolarStereographic::with_true_scale(
            args.ellipsoid,
            lon0,
            lat_ts.to_radians(),
            args.unit_scale,
        ),
        None => PolarStereographic::with_scale(
            args.ellipsoid,
            lon0,
            def.org_lat > 0.0,
            def.scl_red,
            args.unit_scale,
        ),
    };
    Ok(Box::new(proj))
}
