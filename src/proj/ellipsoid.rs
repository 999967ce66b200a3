use std::f64::consts::FRAC_PI_2;

use serde::{Deserialize, Serialize};

use crate::error::{CsError, CsResult};

/// Reference ellipsoid parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ellipsoid {
    /// Semi-major axis (metres)
    pub a: f64,
    /// Flattening (dimensionless, zero for a sphere)
    pub f: f64,
    /// Semi-minor axis: a * (1 - f)
    pub b: f64,
    /// First eccentricity squared
    pub e2: f64,
    /// Second eccentricity squared: e^2 / (1 - e^2)
    pub ep2: f64,
    /// Third flattening: f / (2 - f)
    pub n: f64,
}

impl Ellipsoid {
    pub const fn new(a: f64, f: f64) -> Self {
        let b = a * (1.0 - f);
        let e2 = 2.0 * f - f * f;
        let ep2 = e2 / (1.0 - e2);
        let n = f / (2.0 - f);
        Self { a, f, b, e2, ep2, n }
    }

    pub const fn sphere(radius: f64) -> Self {
        Self::new(radius, 0.0)
    }

    /// Build from semi-major axis and eccentricity squared, the form in
    /// which datum transforms carry their source and target ellipsoids.
    pub fn from_e2(a: f64, e2: f64) -> Self {
        let f = 1.0 - (1.0 - e2).sqrt();
        Self::new(a, f)
    }

    /// Look up one of the built-in ellipsoids by key (case-insensitive).
    pub fn named(key: &str) -> Option<Self> {
        NAMED_ELLIPSOIDS
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, e)| *e)
    }

    /// First eccentricity.
    pub fn eccentricity(&self) -> f64 {
        self.e2.sqrt()
    }

    pub fn is_sphere(&self) -> bool {
        self.e2 == 0.0
    }

    /// Radius of curvature in the prime vertical, N.
    pub fn prime_vertical_radius(&self, phi: f64) -> f64 {
        let s = phi.sin();
        self.a / (1.0 - self.e2 * s * s).sqrt()
    }

    /// Radius of curvature in the meridian, ρ.
    pub fn meridian_radius(&self, phi: f64) -> f64 {
        let s = phi.sin();
        let w2 = 1.0 - self.e2 * s * s;
        self.a * (1.0 - self.e2) / (w2 * w2.sqrt())
    }

    /// Geodetic (degrees, degrees, height) to geocentric XYZ.
    pub fn cartesian(&self, llh: [f64; 3]) -> [f64; 3] {
        let lam = llh[0].to_radians();
        let phi = llh[1].to_radians();
        let h = llh[2];

        let nu = self.prime_vertical_radius(phi);
        let (sin_phi, cos_phi) = phi.sin_cos();
        let (sin_lam, cos_lam) = lam.sin_cos();

        [
            (nu + h) * cos_phi * cos_lam,
            (nu + h) * cos_phi * sin_lam,
            (nu * (1.0 - self.e2) + h) * sin_phi,
        ]
    }

    /// Geocentric XYZ to geodetic (degrees, degrees, height).
    ///
    /// Bowring's closed form with Fukushima's substitution, no iteration.
    #[allow(non_snake_case)]
    pub fn geographic(&self, xyz: [f64; 3]) -> [f64; 3] {
        let [X, Y, Z] = xyz;
        let b = self.b;
        let lam = Y.atan2(X);
        let p = X.hypot(Y);

        // Closer than a picometre to the polar axis: force a pole.
        if p < 1.0e-12 {
            let phi = FRAC_PI_2.copysign(Z);
            return [lam.to_degrees(), phi.to_degrees(), Z.abs() - b];
        }

        let T = (Z * self.a) / (p * b);
        let c = 1.0 / (1.0 + T * T).sqrt();
        let s = c * T;

        let phi_num = Z + self.ep2 * b * s.powi(3);
        let phi_denom = p - self.e2 * self.a * c.powi(3);
        let phi = phi_num.atan2(phi_denom);

        let len = phi_num.hypot(phi_denom);
        let sin_phi = phi_num / len;
        let cos_phi = phi_denom / len;
        let nu = self.a / (1.0 - sin_phi * sin_phi * self.e2).sqrt();

        let h = if cos_phi.abs() > 0.7 {
            p / cos_phi - nu
        } else {
            Z / sin_phi - nu * (1.0 - self.e2)
        };

        [lam.to_degrees(), phi.to_degrees(), h]
    }
}

pub const WGS84: Ellipsoid = Ellipsoid::new(6_378_137.0, 1.0 / 298.257_223_563);
pub const GRS80: Ellipsoid = Ellipsoid::new(6_378_137.0, 1.0 / 298.257_222_101);
pub const AIRY1830: Ellipsoid = Ellipsoid::new(6_377_563.396, 1.0 / 299.324_964_6);
pub const BESSEL1841: Ellipsoid = Ellipsoid::new(6_377_397.155, 1.0 / 299.152_812_8);
pub const CLARKE1866: Ellipsoid = Ellipsoid::new(6_378_206.4, 1.0 / 294.978_698_2);
pub const INTERNATIONAL: Ellipsoid = Ellipsoid::new(6_378_388.0, 1.0 / 297.0);
pub const WGS72: Ellipsoid = Ellipsoid::new(6_378_135.0, 1.0 / 298.26);

static NAMED_ELLIPSOIDS: [(&str, Ellipsoid); 8] = [
    ("WGS84", WGS84),
    ("GRS1980", GRS80),
    ("AIRY30", AIRY1830),
    ("BESSEL", BESSEL1841),
    ("CLRK66", CLARKE1866),
    ("INTNL", INTERNATIONAL),
    ("WGS72", WGS72),
    ("SPHERE", Ellipsoid::sphere(6_370_997.0)),
];

/// Dictionary form of an ellipsoid: either a built-in key or explicit
/// axis and flattening.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EllipsoidDef {
    Named(String),
    Explicit { a: f64, f: f64 },
}

impl EllipsoidDef {
    pub fn resolve(&self) -> CsResult<Ellipsoid> {
        match self {
            EllipsoidDef::Named(key) => Ellipsoid::named(key)
                .ok_or_else(|| CsError::Config(format!("unknown ellipsoid {key}"))),
            EllipsoidDef::Explicit { a, f } => {
                if *a <= 0.0 || !(0.0..0.1).contains(f) {
                    return Err(CsError::Config(format!("implausible ellipsoid a={a} f={f}")));
                }
                Ok(Ellipsoid::new(*a, *f))
            }
        }
    }
}
