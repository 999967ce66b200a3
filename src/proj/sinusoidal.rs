//! Sinusoidal (Sanson–Flamsteed) projection, ellipsoidal, optionally
//! interrupted.
//!
//! forward: x = ν·cos(φ)·(λ - λc) + xc, y = M(φ)
//! inverse: φ = M⁻¹(y), λ = λc + (x - xc)/(ν·cos(φ))
//!
//! Each zone has its own central meridian λc; xc places that meridian at its
//! uninterrupted position along the equator.

use std::f64::consts::{FRAC_PI_2, PI};

use crate::error::{CsResult, Status};
use crate::proj::common::{adj_lng, meridional_arc, meridional_arc_inverse, NP_TEST};
use crate::proj::csdef::{CsDef, QcError, QcSink, ZoneDef, MAX_ZONES};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::registry::SetupArgs;
use crate::proj::{bounds_around, Projection};

/// One zone of an interrupted projection, radians relative to the
/// origin longitude.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Zone {
    pub west: f64,
    pub central: f64,
    pub east: f64,
    pub south: bool,
}

impl Zone {
    fn contains(&self, dlam: f64) -> bool {
        dlam >= self.west && dlam <= self.east
    }

    /// Distance of `dlam` outside this zone, zero when inside.
    fn excess(&self, dlam: f64) -> f64 {
        (self.west - dlam).max(dlam - self.east).max(0.0)
    }
}

/// Zones of an interrupted projection, split by hemisphere.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ZoneSet {
    zones: Vec<Zone>,
}

impl ZoneSet {
    /// The whole globe as a single zone.
    pub fn uninterrupted() -> Self {
        Self { zones: Vec::new() }
    }

    pub fn from_defs(defs: &[ZoneDef]) -> Self {
        let zones = defs
            .iter()
            .map(|z| Zone {
                west: z.west.to_radians(),
                central: z.central.to_radians(),
                east: z.east.to_radians(),
                south: z.south,
            })
            .collect();
        Self { zones }
    }

    fn hemisphere(&self, south: bool) -> impl Iterator<Item = &Zone> {
        // A hemisphere without zones of its own shares the other's.
        let has_own = self.zones.iter().any(|z| z.south == south);
        self.zones
            .iter()
            .filter(move |z| !has_own || z.south == south)
    }

    /// Zone holding longitude offset `dlam` on the hemisphere of `lat`.
    pub fn locate(&self, dlam: f64, lat: f64) -> Zone {
        let whole = Zone {
            west: -PI,
            central: 0.0,
            east: PI,
            south: false,
        };
        let south = lat < 0.0;
        let mut best: Option<(f64, Zone)> = None;
        for zone in self.hemisphere(south) {
            if zone.contains(dlam) {
                return *zone;
            }
            let excess = zone.excess(dlam);
            if best.map_or(true, |(e, _)| excess < e) {
                best = Some((excess, *zone));
            }
        }
        best.map_or(whole, |(_, z)| z)
    }

    /// Candidate zones for an inverse at latitude `lat`.
    pub fn candidates(&self, lat: f64) -> Vec<Zone> {
        let found: Vec<Zone> = self.hemisphere(lat < 0.0).copied().collect();
        if found.is_empty() {
            vec![Zone {
                west: -PI,
                central: 0.0,
                east: PI,
                south: false,
            }]
        } else {
            found
        }
    }

    /// Resolve an inverse: `dlam_of(zone)` gives the longitude offset from
    /// that zone's central meridian. Returns the offset from the origin.
    pub fn resolve(&self, lat: f64, dlam_of: impl Fn(&Zone) -> f64) -> (f64, Status) {
        let mut best: Option<(f64, f64)> = None;
        for zone in self.candidates(lat) {
            let dlam = zone.central + dlam_of(&zone);
            if zone.contains(dlam) {
                return (dlam, Status::Normal);
            }
            let excess = zone.excess(dlam);
            if best.map_or(true, |(e, _)| excess < e) {
                best = Some((excess, dlam.clamp(zone.west, zone.east)));
            }
        }
        match best {
            Some((_, dlam)) => (dlam, Status::Range),
            None => (0.0, Status::Range),
        }
    }
}

/// Zone checks shared by the interrupted projections.
pub(crate) fn check_zones(zones: &[ZoneDef], sink: &mut QcSink<'_>) {
    if zones.len() > MAX_ZONES {
        sink.push(QcError::ZoneCount);
    }
    let bad_zone = zones.iter().any(|z| {
        !(z.west >= -180.0 && z.west < z.central && z.central < z.east && z.east <= 180.0)
    });
    let overlap = zones.iter().enumerate().any(|(i, a)| {
        zones[i + 1..]
            .iter()
            .any(|b| a.south == b.south && a.west < b.east && b.west < a.east)
    });
    if bad_zone || overlap {
        sink.push(QcError::ZoneDefinition);
    }
}

pub struct Sinusoidal {
    ellipsoid: Ellipsoid,
    lon0: f64,
    unit_scale: f64,
    zones: ZoneSet,
    m_pole: f64,
}

impl Sinusoidal {
    pub fn new(ellipsoid: Ellipsoid, lon0: f64, zones: &[ZoneDef], unit_scale: f64) -> Self {
        Self {
            ellipsoid,
            lon0,
            unit_scale,
            zones: if zones.is_empty() {
                ZoneSet::uninterrupted()
            } else {
                ZoneSet::from_defs(zones)
            },
            m_pole: meridional_arc(&ellipsoid, FRAC_PI_2) * unit_scale,
        }
    }

    /// Equatorial x offset of a zone's central meridian.
    fn zone_offset(&self, zone: &Zone) -> f64 {
        self.ellipsoid.a * self.unit_scale * zone.central
    }

    /// ν·cos φ in system units.
    fn parallel_radius(&self, lat: f64) -> f64 {
        self.ellipsoid.prime_vertical_radius(lat) * lat.cos() * self.unit_scale
    }
}

impl Projection for Sinusoidal {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64, Status) {
        let status = self.ll_domain(lon, lat);
        let lat = lat.clamp(-FRAC_PI_2, FRAC_PI_2);
        let dlam = adj_lng(lon - self.lon0);
        let zone = self.zones.locate(dlam, lat);
        let x = self.zone_offset(&zone) + self.parallel_radius(lat) * (dlam - zone.central);
        let y = meridional_arc(&self.ellipsoid, lat) * self.unit_scale;
        (x, y, status)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64, Status) {
        let mut status = Status::Normal;
        let mut y = y;
        if y.abs() > self.m_pole {
            status = Status::Range;
            y = self.m_pole.copysign(y);
        }
        let lat = meridional_arc_inverse(&self.ellipsoid, y / self.unit_scale);
        if lat.abs() > NP_TEST {
            // At the poles, longitude is undefined, return lon0
            return (self.lon0, lat, status.worst(Status::Indeterminate));
        }
        let radius = self.parallel_radius(lat);
        let (dlam, zone_status) = self
            .zones
            .resolve(lat, |zone| (x - self.zone_offset(zone)) / radius);
        (adj_lng(self.lon0 + dlam), lat, status.worst(zone_status))
    }

    fn scale_h(&self, lon: f64, lat: f64) -> Option<f64> {
        // d(ν cos φ)/dφ = -ρ sin φ, so the meridian shears by sin φ · Δλ.
        let lat = lat.clamp(-NP_TEST, NP_TEST);
        let dlam = adj_lng(lon - self.lon0);
        let zone = self.zones.locate(dlam, lat);
        let shear = lat.sin() * (dlam - zone.central);
        Some((1.0 + shear * shear).sqrt())
    }

    fn scale_k(&self, _lon: f64, _lat: f64) -> Option<f64> {
        Some(1.0)
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
    Ok(Box::new(Sinusoidal::new(
        args.ellipsoid,
        def.org_lng.to_radians(),
        &def.zones,
        args.unit_scale,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proj::common::{numeric_h, numeric_k};
    use crate::proj::csdef::check_all;
    use crate::proj::ellipsoid::WGS84;
    use approx::assert_relative_eq;

    fn zone(west: f64, central: f64, east: f64, south: bool) -> ZoneDef {
        ZoneDef {
            west,
            central,
            east,
            south,
        }
    }

    #[test]
    fn test_roundtrip() {
        let proj = Sinusoidal::new(WGS84, 0.0, &[], 1.0);
        let cases: &[(f64, f64)] = &[
            (0.0, 0.0),
            (10.0, 45.0),
            (-73.9857, 40.7484),
            (139.6917, 35.6895),
        ];
        for &(lon_deg, lat_deg) in cases {
            let lon = lon_deg.to_radians();
            let lat = lat_deg.to_radians();
            let (x, y, _) = proj.forward(lon, lat);
            let (lon2, lat2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal);
            assert_relative_eq!(lon2, lon, epsilon = 1e-10);
            assert_relative_eq!(lat2, lat, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_equator_x_is_arc_length() {
        // On the equator ν = a, so x = a·(λ - λ₀)
        let proj = Sinusoidal::new(WGS84, 0.0, &[], 1.0);
        let lon = 15.0_f64.to_radians();
        let (x, y, _) = proj.forward(lon, 0.0);
        assert_relative_eq!(x, WGS84.a * lon, epsilon = 1e-6);
        assert_relative_eq!(y, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_pole() {
        // At the north pole, x is 0 for any longitude (cos(90°)=0)
        let proj = Sinusoidal::new(WGS84, 0.0, &[], 1.0);
        let (x, y, _) = proj.forward(45.0_f64.to_radians(), FRAC_PI_2);
        assert_relative_eq!(x, 0.0, epsilon = 1e-6);
        let (lon, _, status) = proj.inverse(0.0, y);
        assert_eq!(status, Status::Indeterminate);
        assert_relative_eq!(lon, 0.0);
    }

    #[test]
    fn test_scale_factors() {
        let proj = Sinusoidal::new(WGS84, 0.0, &[], 1.0);
        let fwd = |l: f64, p: f64| {
            let (x, y, _) = proj.forward(l, p);
            (x, y)
        };
        let (l, p) = (0.5, 0.8);
        assert_relative_eq!(numeric_k(&WGS84, 1.0, l, p, fwd), 1.0, epsilon = 1e-7);
        assert_relative_eq!(
            proj.scale_h(l, p).unwrap(),
            numeric_h(&WGS84, 1.0, l, p, fwd),
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_interrupted_zones() {
        let zones = [
            zone(-180.0, -90.0, 0.0, false),
            zone(0.0, 90.0, 180.0, false),
            zone(-180.0, 0.0, 180.0, true),
        ];
        let proj = Sinusoidal::new(WGS84, 0.0, &zones, 1.0);

        // On a zone's central meridian x is the uninterrupted equator position.
        let (x, _, _) = proj.forward(90.0_f64.to_radians(), 60.0_f64.to_radians());
        assert_relative_eq!(x, WGS84.a * FRAC_PI_2, epsilon = 1e-6);

        for &(lon, lat) in &[(-150.0_f64, 50.0_f64), (30.0, 10.0), (120.0, -40.0), (-5.0, 70.0)] {
            let (l, p) = (lon.to_radians(), lat.to_radians());
            let (x, y, status) = proj.forward(l, p);
            assert_eq!(status, Status::Normal);
            let (l2, p2, status) = proj.inverse(x, y);
            assert_eq!(status, Status::Normal, "({lon}, {lat})");
            assert_relative_eq!(l2, l, epsilon = 1e-10);
            assert_relative_eq!(p2, p, epsilon = 1e-10);
        }

        // The interruption leaves a gap at 0° in the north: x between the
        // two lobes' edges at 60°N is not on the map.
        let (x_edge, y, _) = proj.forward(-1.0e-9, 60.0_f64.to_radians());
        let (x_next, _, _) = proj.forward(1.0e-9, 60.0_f64.to_radians());
        assert!(x_next - x_edge > 1.0e6);
        let (_, _, status) = proj.inverse((x_edge + x_next) / 2.0, y);
        assert_eq!(status, Status::Range);
    }

    #[test]
    fn test_zone_checks() {
        let overlap = CsDef {
            zones: vec![zone(-180.0, -90.0, 10.0, false), zone(0.0, 90.0, 180.0, false)],
            ..CsDef::new("X", "SINUS")
        };
        assert_eq!(check_all(&overlap), vec![QcError::ZoneDefinition]);

        let too_many = CsDef {
            zones: (0..9)
                .map(|i| {
                    let w = -180.0 + 40.0 * i as f64;
                    zone(w, w + 20.0, w + 40.0, false)
                })
                .collect(),
            ..CsDef::new("X", "SINUS")
        };
        assert_eq!(check_all(&too_many), vec![QcError::ZoneCount]);

        let bad_order = CsDef {
            zones: vec![zone(10.0, 0.0, 20.0, true)],
            ..CsDef::new("X", "SINUS")
        };
        assert_eq!(check_all(&bad_order), vec![QcError::ZoneDefinition]);
    }
}
