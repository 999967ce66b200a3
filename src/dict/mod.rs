//! Dictionary tooling: the geodetic path compiler and dictionary diffs.

pub mod compare;
pub mod geodetic_path;

pub use compare::{compare, Difference, Tolerance};
pub use geodetic_path::{GeodeticPath, PathStep};
