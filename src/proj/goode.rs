//! Goode Homolosine projection (spherical, radius a).
//!
//! Sinusoidal between ±40°44'11.8", Mollweide poleward of that, with the
//! Mollweide part shifted so the two meet. Interrupted into lobes; the
//! classic layout has two lobes in the north and four in the south.

use std::f64::consts::{FRAC_PI_2, PI, SQRT_2};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, NP_TEST};
use crate::proj::csdef::{CsDef, QcSink, ZoneDef};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::mollweide::{auxiliary_angle, latitude};
use crate::proj::registry::SetupArgs;
use crate::proj::sinusoidal::{check_zones, Zone, ZoneSet};
use crate::proj::{bounds_around, Projection};

/// Latitude where sinusoidal and Mollweide meet: 40°44'11.8".
const SEAM_LAT: f64 = 0.710_987_989_993;

/// Mollweide y shift (in units of R) making the two parts meet at the seam.
const MOLLWEIDE_SHIFT: f64 = 0.052_803_527_454_2;

/// The interrupted layout of the classic map, degrees from the origin.
pub fn classic_lobes() -> Vec<ZoneDef> {
    let lobe = |west: f64, central: f64, east: f64, south: bool| ZoneDef {
        west,
        central,
        east,
        south,
    };
    vec![
        lobe(-180.0, -100.0, -40.0, false),
        lobe(-40.0, 30.0, 180.0, false),
        lobe(-180.0, -160.0, -100.0, true),
        lobe(-100.0, -60.0, -20.0, true),
        lobe(-20.0, 20.0, 80.0, true),
        lobe(80.0, 140.0, 180.0, true),
    ]
}

pub struct GoodeHomolosine {
    ellipsoid: Ellipsoid,
    lon0: f64,
    r: f64,
    lobes: ZoneSet,
}

impl GoodeHomolosine {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, lobes: &[ZoneDef], unit_scale: f64) -> Self {
        let lobes = if lobes.is_empty() {
            ZoneSet::from_defs(&classic_lobes())
        } else {
            ZoneSet::from_defs(lobes)
        };
        Self {
            ellipsoid,
            lon0,
            r: ellipsoid.a * unit_scale,
            lobes,
        }
    }

    fn lobe_offset(&self, lobe: &Zone) -> f64 {
        self.r * lobe.central
    }
}

impl Projection for GoodeHomolosine {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let dlam = adj_lng(lon - self.lon0);
        let lobe = self.lobes.locate(dlam, lat);
        let local = dlam - lobe.central;

        let (x, y) = if lat.abs() <= SEAM_LAT {
            (self.r * local * lat.cos(), self.r * lat)
        } else {
            let theta = auxiliary_angle(lat);
            (
                2.0 * SQRT_2 / PI * self.r * local * theta.cos(),
                self.r * (SQRT_2 * theta.sin() - MOLLWEIDE_SHIFT.copysign(lat)),
            )
        };
        (self.lobe_offset(&lobe) + x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let y_max = self.r * (SQRT_2 - MOLLWEIDE_SHIFT);
        let mut y = y;
        if y.abs() > y_max {
            status = Status::Range;
            y = y_max.copysign(y);
        }

        let (lat, x_scale) = if y.abs() <= self.r * SEAM_LAT {
            let lat = y / self.r;
            (lat, self.r * lat.cos())
        } else {
            let s = (y / self.r + MOLLWEIDE_SHIFT.copysign(y)) / SQRT_2;
            let theta = s.clamp(-1.0, 1.0).asin();
            (latitude(theta), 2.0 * SQRT_2 / PI * self.r * theta.cos())
        };
        if lat.abs() > NP_TEST {
            return (self.lon0, lat, status.worst(Status::Indeterminate));
        }

        let (dlam, lobe_status) = self
            .lobes
            .resolve(lat, |lobe| (x - self.lobe_offset(lobe)) / x_scale);
        (adj_lng(self.lon0 + dlam), lat, status.worst(lobe_status))
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
    check_zones(&def.zones, sink);
}

pub(crate) fn setup(args: &SetupArgs<'_>) -> CsResult<Box<dyn Projection>> {
    let def = args.def;
    Ok(Box::new(GoodeHomolosine::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        &def.zones,
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit() -> GoodeHomolosine {
        GoodeHomolosine::new(Ellipsoid::sphere(1.0), 0.0, &[], 1.0)
    }

    #[test]
    fn test_seam_is_continuous() {
        let proj = unit();
        let lon = 10.0_f64.to_radians();
        let (x1, y1, _) = proj.forward(lon, SEAM_LAT - 1e-12);
        let (x2, y2, _) = proj.forward(lon, SEAM_LAT + 1e-12);
        assert_relative_eq!(x1, x2, epsilon = 1e-6);
        assert_relative_eq!(y1, y2, epsilon = 1e-9);
    }

    #[test]
    fn test_roundtrip_in_every_lobe() {
        let proj = unit();
        let cases: &[(f64, f64)] = &[
            (-120.0, 60.0), // north-west lobe, Mollweide part
            (-60.0, 20.0),  // north-west lobe, sinusoidal part
            (100.0, 70.0),  // north-east lobe
            (-170.0, -50.0),
            (-80.0, -10.0),
            (30.0, -45.0),
            (150.0, -30.0),
        ];
        for &(lon, lat) in cases {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let (x, y, status) = proj.forward(l, p);
            assert_eq!(status, Status::Normal);
            let (l2, p2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal, "({lon}, {lat})");
            assert_relative_eq!(l2, l, epsilon = 1e-9);
            assert_relative_eq!(p2, p, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_lobe_central_meridian_is_straight() {
        let proj = unit();
        let cm = (-100.0_f64).to_radians();
        let (x_eq, _, _) = proj.forward(cm, 0.0);
        let (x_hi, _, _) = proj.forward(cm, 75.0_f64.to_radians());
        assert_relative_eq!(x_eq, cm, epsilon = 1e-12);
        assert_relative_eq!(x_hi, cm, epsilon = 1e-12);
    }

    #[test]
    fn test_interruption_gap_is_range() {
        let proj = unit();
        // Between the southern lobes at -100° the map has a gap below the equator.
        let lat = (-60.0_f64).to_radians();
        let (xw, y, _) = proj.forward((-100.0_f64 - 1e-7).to_radians(), lat);
        let (xe, _, _) = proj.forward((-100.0_f64 + 1e-7).to_radians(), lat);
        let (_, _, status) = proj.inverse((xw + xe) / 2.0, y);
        assert_eq!(status, Status::Range);
    }

    #[test]
    fn test_pole_indeterminate() {
        let proj = unit();
        let (x, y, _) = proj.forward(0.5, FRAC_PI_2);
        let (_, lat, status) = proj.inverse(x, y);
        assert_eq!(status, Status::Indeterminate);
        assert_relative_eq!(lat, FRAC_PI_2, epsilon = 1e-9);
    }
}
