//! Projection method table.
//!
//! One row per projection family. Lookup is case-insensitive by key; the
//! table itself is static and never mutated.

use std::collections::BTreeMap;

use log::debug;
use once_cell::sync::Lazy;

use crate::error::CsResult;
use crate::proj::csdef::{CsDef, QcSink};
use crate::proj::ellipsoid::Ellipsoid;
use crate::proj::{
    albers_equal_area, eckert6, equirectangular, goode, lambert_conformal, lambert_tangential,
    mercator, miller, mollweide, sinusoidal, stereographic, swiss, transverse_mercator, unity,
    van_der_grinten, Projection,
};

/// Inputs to a family's setup function.
pub struct SetupArgs<'a> {
    pub def: &'a CsDef,
    pub ellipsoid: Ellipsoid,
    /// Ellipsoid metres to system units.
    pub unit_scale: f64,
}

pub type CheckFn = fn(&CsDef, &mut QcSink<'_>);
pub type SetupFn = fn(&SetupArgs<'_>) -> CsResult<Box<dyn Projection>>;

/// Capability flags of a projection method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodFlags(u32);

impl MethodFlags {
    pub const NONE: MethodFlags = MethodFlags(0);
    pub const CONFORMAL: MethodFlags = MethodFlags(1 << 0);
    pub const EQUAL_AREA: MethodFlags = MethodFlags(1 << 1);
    pub const EQUIDISTANT: MethodFlags = MethodFlags(1 << 2);
    /// Geographic: no projection math at all.
    pub const GEOGRAPHIC: MethodFlags = MethodFlags(1 << 3);
    pub const INTERRUPTED: MethodFlags = MethodFlags(1 << 4);
    /// Uses the origin latitude.
    pub const ORIGIN_LAT: MethodFlags = MethodFlags(1 << 5);
    /// Uses a scale reduction factor.
    pub const SCALE_RED: MethodFlags = MethodFlags(1 << 6);
    /// Uses one or two standard parallels.
    pub const STD_PARALLELS: MethodFlags = MethodFlags(1 << 7);
    /// Computes its own false origin (UTM).
    pub const FIXED_ORIGIN: MethodFlags = MethodFlags(1 << 8);

    pub const fn union(self, other: MethodFlags) -> MethodFlags {
        MethodFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: MethodFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn bits(self) -> u32 {
        self.0
    }
}

pub struct MethodEntry {
    pub key: &'static str,
    /// Internal method number, stable across releases.
    pub code: u16,
    pub flags: MethodFlags,
    /// EPSG operation method code, 0 if none.
    pub epsg: u16,
    pub description: &'static str,
    pub check: CheckFn,
    pub setup: SetupFn,
}

const fn flags(list: &[MethodFlags]) -> MethodFlags {
    let mut acc = MethodFlags::NONE;
    let mut i = 0;
    while i < list.len() {
        acc = acc.union(list[i]);
        i += 1;
    }
    acc
}

pub static METHODS: &[MethodEntry] = &[
    MethodEntry {
        key: "LL",
        code: 1,
        flags: MethodFlags::GEOGRAPHIC,
        epsg: 0,
        description: "Geographic longitude/latitude",
        check: unity::check,
        setup: unity::setup,
    },
    MethodEntry {
        key: "TM",
        code: 3,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::ORIGIN_LAT, MethodFlags::SCALE_RED]),
        epsg: 9807,
        description: "Transverse Mercator",
        check: transverse_mercator::check,
        setup: transverse_mercator::setup,
    },
    MethodEntry {
        key: "UTM",
        code: 4,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::FIXED_ORIGIN]),
        epsg: 9824,
        description: "Universal Transverse Mercator, zone and hemisphere",
        check: transverse_mercator::check_utm,
        setup: transverse_mercator::setup_utm,
    },
    MethodEntry {
        key: "LMTAN",
        code: 5,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::ORIGIN_LAT, MethodFlags::SCALE_RED]),
        epsg: 9801,
        description: "Lambert Tangential Conformal Conic",
        check: lambert_tangential::check,
        setup: lambert_tangential::setup,
    },
    MethodEntry {
        key: "LM2SP",
        code: 6,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::ORIGIN_LAT, MethodFlags::STD_PARALLELS]),
        epsg: 9802,
        description: "Lambert Conformal Conic, two standard parallels",
        check: lambert_conformal::check,
        setup: lambert_conformal::setup,
    },
    MethodEntry {
        key: "AE",
        code: 7,
        flags: flags(&[MethodFlags::EQUAL_AREA, MethodFlags::ORIGIN_LAT, MethodFlags::STD_PARALLELS]),
        epsg: 9822,
        description: "Albers Equal Area Conic",
        check: albers_equal_area::check,
        setup: albers_equal_area::setup,
    },
    MethodEntry {
        key: "MRCAT",
        code: 8,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::STD_PARALLELS]),
        epsg: 9805,
        description: "Mercator, standard parallel",
        check: mercator::check,
        setup: mercator::setup,
    },
    MethodEntry {
        key: "PSTRO",
        code: 9,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::ORIGIN_LAT, MethodFlags::SCALE_RED]),
        epsg: 9810,
        description: "Polar Stereographic",
        check: stereographic::check,
        setup: stereographic::setup,
    },
    MethodEntry {
        key: "EDCYL",
        code: 10,
        flags: flags(&[MethodFlags::EQUIDISTANT, MethodFlags::STD_PARALLELS]),
        epsg: 1028,
        description: "Equidistant Cylindrical",
        check: equirectangular::check,
        setup: equirectangular::setup,
    },
    MethodEntry {
        key: "MILLER",
        code: 11,
        flags: MethodFlags::NONE,
        epsg: 0,
        description: "Miller Cylindrical",
        check: miller::check,
        setup: miller::setup,
    },
    MethodEntry {
        key: "SINUS",
        code: 12,
        flags: flags(&[MethodFlags::EQUAL_AREA, MethodFlags::INTERRUPTED]),
        epsg: 0,
        description: "Sinusoidal, optionally interrupted",
        check: sinusoidal::check,
        setup: sinusoidal::setup,
    },
    MethodEntry {
        key: "SWISS",
        code: 13,
        flags: flags(&[MethodFlags::CONFORMAL, MethodFlags::ORIGIN_LAT]),
        epsg: 0,
        description: "Swiss Oblique Cylindrical",
        check: swiss::check,
        setup: swiss::setup,
    },
    MethodEntry {
        key: "VDGRN",
        code: 14,
        flags: MethodFlags::NONE,
        epsg: 0,
        description: "Van der Grinten",
        check: van_der_grinten::check,
        setup: van_der_grinten::setup,
    },
    MethodEntry {
        key: "EKRT6",
        code: 15,
        flags: MethodFlags::EQUAL_AREA,
        epsg: 0,
        description: "Eckert VI",
        check: eckert6::check,
        setup: eckert6::setup,
    },
    MethodEntry {
        key: "MOLWD",
        code: 16,
        flags: MethodFlags::EQUAL_AREA,
        epsg: 0,
        description: "Mollweide",
        check: mollweide::check,
        setup: mollweide::setup,
    },
    MethodEntry {
        key: "GOODE",
        code: 17,
        flags: flags(&[MethodFlags::EQUAL_AREA, MethodFlags::INTERRUPTED]),
        epsg: 0,
        description: "Goode Homolosine",
        check: goode::check,
        setup: goode::setup,
    },
];

static BY_KEY: Lazy<BTreeMap<String, &'static MethodEntry>> = Lazy::new(|| {
    METHODS
        .iter()
        .map(|entry| (entry.key.to_ascii_uppercase(), entry))
        .collect()
});

/// Find a projection method by key, ignoring case.
pub fn lookup(key: &str) -> Option<&'static MethodEntry> {
    let found = BY_KEY.get(&key.trim().to_ascii_uppercase()).copied();
    if found.is_none() {
        debug!("projection key {key:?} not in registry");
    }
    found
}

/// Find a projection method by EPSG operation method code.
pub fn lookup_epsg(epsg: u16) -> Option<&'static MethodEntry> {
    if epsg == 0 {
        return None;
    }
    METHODS.iter().find(|entry| entry.epsg == epsg)
}
