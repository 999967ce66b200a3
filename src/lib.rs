//! Coordinate system engine: map projections, geodetic datum shifts and
//! grid interpolation files.

pub mod config;
pub mod datum;
pub mod dict;
pub mod error;
pub mod grid;
pub mod proj;

pub use config::EngineConfig;
pub use datum::{Direction, GeodeticTransform, SetupContext, XfrmDef};
pub use error::{CsError, CsResult, ShiftStatus, Status};
pub use proj::coordsys::CoordSys;
pub use proj::csdef::CsDef;
pub use proj::pipeline::{Conversion, Outcome};
