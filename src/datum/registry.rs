//! Geodetic transformation method table.

use std::collections::BTreeMap;

use log::debug;
use once_cell::sync::Lazy;

use crate::datum::{grid_shift, molodensky, null, similarity, GeodeticTransform, SetupContext, XfrmDef};
use crate::error::{CsError, CsResult};
use crate::proj::csdef::{QcError, QcSink};

pub type CheckFn = fn(&XfrmDef, &mut QcSink<'_>);
pub type SetupFn = fn(&XfrmDef, &SetupContext) -> CsResult<Box<dyn GeodeticTransform>>;
pub type IsNullFn = fn(&XfrmDef) -> bool;

/// Capability flags of a transformation method.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct XfrmFlags(u32);

impl XfrmFlags {
    pub const NONE: XfrmFlags = XfrmFlags(0);
    /// Works through geocentric XYZ.
    pub const GEOCENTRIC: XfrmFlags = XfrmFlags(1 << 0);
    /// Interpolates grid files.
    pub const GRID: XfrmFlags = XfrmFlags(1 << 1);
    /// Has a closed-form 3-D inverse.
    pub const CLOSED_INVERSE: XfrmFlags = XfrmFlags(1 << 2);
    pub const USES_ROTATION: XfrmFlags = XfrmFlags(1 << 3);
    pub const USES_SCALE: XfrmFlags = XfrmFlags(1 << 4);

    pub const fn union(self, other: XfrmFlags) -> XfrmFlags {
        XfrmFlags(self.0 | other.0)
    }

    pub const fn contains(self, other: XfrmFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

pub struct XfrmEntry {
    pub key: &'static str,
    pub code: u16,
    pub flags: XfrmFlags,
    /// EPSG operation method code, 0 if none.
    pub epsg: u16,
    pub description: &'static str,
    pub check: CheckFn,
    pub setup: SetupFn,
    /// True when the parameters describe no change at all.
    pub is_null: IsNullFn,
}

const GEOCENTRIC_EXACT: XfrmFlags = XfrmFlags::GEOCENTRIC.union(XfrmFlags::CLOSED_INVERSE);

fn grid_is_null(_def: &XfrmDef) -> bool {
    false
}

pub static TRANSFORMS: &[XfrmEntry] = &[
    XfrmEntry {
        key: "NULL",
        code: 1,
        flags: XfrmFlags::CLOSED_INVERSE,
        epsg: 0,
        description: "Null transformation",
        check: null::check,
        setup: null::setup,
        is_null: null::is_null,
    },
    XfrmEntry {
        key: "3PARAM",
        code: 2,
        flags: GEOCENTRIC_EXACT,
        epsg: 9603,
        description: "Geocentric translations",
        check: similarity::check_parm3,
        setup: similarity::setup_parm3,
        is_null: similarity::parm3_is_null,
    },
    XfrmEntry {
        key: "6PARAM",
        code: 3,
        flags: XfrmFlags::GEOCENTRIC.union(XfrmFlags::USES_ROTATION),
        epsg: 0,
        description: "Geocentric translation and small-angle rotation",
        check: similarity::check_parm6,
        setup: similarity::setup_parm6,
        is_null: similarity::parm7_is_null,
    },
    XfrmEntry {
        key: "7PARAM",
        code: 4,
        flags: GEOCENTRIC_EXACT
            .union(XfrmFlags::USES_ROTATION)
            .union(XfrmFlags::USES_SCALE),
        epsg: 9607,
        description: "Seven parameter similarity, coordinate frame rotation",
        check: similarity::check_parm7,
        setup: similarity::setup_parm7,
        is_null: similarity::parm7_is_null,
    },
    XfrmEntry {
        key: "BURSA",
        code: 5,
        flags: XfrmFlags::GEOCENTRIC
            .union(XfrmFlags::USES_ROTATION)
            .union(XfrmFlags::USES_SCALE),
        epsg: 0,
        description: "Bursa-Wolf, small-angle approximation",
        check: similarity::check_parm7,
        setup: similarity::setup_bursa,
        is_null: similarity::parm7_is_null,
    },
    XfrmEntry {
        key: "MOLO",
        code: 6,
        flags: XfrmFlags::NONE,
        epsg: 9604,
        description: "Standard Molodensky",
        check: molodensky::check,
        setup: molodensky::setup,
        is_null: similarity::parm3_is_null,
    },
    XfrmEntry {
        key: "GRID",
        code: 7,
        flags: XfrmFlags::GRID,
        epsg: 0,
        description: "Grid file interpolation",
        check: grid_shift::check,
        setup: grid_shift::setup,
        is_null: grid_is_null,
    },
];

static BY_KEY: Lazy<BTreeMap<String, &'static XfrmEntry>> = Lazy::new(|| {
    TRANSFORMS
        .iter()
        .map(|entry| (entry.key.to_ascii_uppercase(), entry))
        .collect()
});

/// Find a transformation method by key, ignoring case.
pub fn lookup(key: &str) -> Option<&'static XfrmEntry> {
    let found = BY_KEY.get(&key.trim().to_ascii_uppercase()).copied();
    if found.is_none() {
        debug!("transformation key {key:?} not in registry");
    }
    found
}

pub fn lookup_epsg(epsg: u16) -> Option<&'static XfrmEntry> {
    if epsg == 0 {
        return None;
    }
    TRANSFORMS.iter().find(|entry| entry.epsg == epsg)
}

fn check_common(def: &XfrmDef, sink: &mut QcSink<'_>) {
    let bad_limit = def.max_iterations == Some(0)
        || def.convergence.is_some_and(|c| !(c > 0.0))
        || def.error_tolerance.is_some_and(|t| !(t > 0.0));
    if bad_limit {
        sink.push(QcError::IterationLimits);
    }
}

/// Run the quality check on `def`, in the manner of
/// [`crate::proj::csdef::quality_check`].
pub fn quality_check(def: &XfrmDef, errors: Option<&mut Vec<QcError>>, capacity: usize) -> usize {
    let mut sink = QcSink::new(errors, capacity);
    check_common(def, &mut sink);
    match lookup(&def.method) {
        Some(entry) => (entry.check)(def, &mut sink),
        None => sink.push(QcError::UnknownTransform),
    }
    sink.count()
}

/// Check and set up `def`.
pub fn setup(def: &XfrmDef, ctx: &SetupContext) -> CsResult<Box<dyn GeodeticTransform>> {
    let entry = lookup(&def.method).ok_or_else(|| CsError::UnknownTransform(def.method.clone()))?;
    let mut errors = Vec::new();
    if quality_check(def, Some(&mut errors), usize::MAX) > 0 {
        return Err(CsError::InvalidDefinition {
            name: def.key_name.clone(),
            errors,
        });
    }
    debug!("setting up {} as {}", def.key_name, entry.key);
    (entry.setup)(def, ctx)
}

/// True when `def` is known to leave coordinates unchanged.
pub fn is_null(def: &XfrmDef) -> bool {
    lookup(&def.method).is_some_and(|entry| (entry.is_null)(def))
}
