//! Geodetic path dictionary: named chains of datum transformations.
//!
//! Source text is line oriented, one `KEY: value` per line, each `GP_NAME:`
//! starting a new path:
//!
//! ```text
//! GP_NAME: NAD27_to_WGS84
//!     DESC_NM: NAD27 to WGS84 via NAD83
//!     SRC_DTM: NAD27
//!     TRG_DTM: WGS84
//!     XFORM: NAD27_to_NAD83,FWD
//!     XFORM: WGS84_to_NAD83,INV
//!     ACCURACY: 1.0
//! ```
//!
//! The compiled dictionary is a magic number followed by the paths sorted by
//! name, all integers little endian.

use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::datum::Direction;
use crate::error::{CsError, CsResult};
use crate::grid::provider::FileProvider;

/// Longest transformation chain one path may hold.
pub const MAX_PATH_XFORMS: usize = 4;

pub const MAGIC: u32 = 0x4750_4431;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub transform: String,
    pub direction: Direction,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPath {
    pub name: String,
    pub description: String,
    pub source: String,
    pub src_datum: String,
    pub trg_datum: String,
    pub steps: Vec<PathStep>,
    pub group: String,
    pub epsg: u32,
    /// Metres, 0 when unknown.
    pub accuracy: f64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathIssue {
    MissingSourceDatum,
    MissingTargetDatum,
    SameDatums,
    NoTransforms,
    TooManyTransforms(usize),
}

impl GeodeticPath {
    pub fn validate(&self) -> Vec<PathIssue> {
        let mut issues = Vec::new();
        if self.src_datum.is_empty() {
            issues.push(PathIssue::MissingSourceDatum);
        }
        if self.trg_datum.is_empty() {
            issues.push(PathIssue::MissingTargetDatum);
        }
        if !self.src_datum.is_empty() && self.src_datum.eq_ignore_ascii_case(&self.trg_datum) {
            issues.push(PathIssue::SameDatums);
        }
        match self.steps.len() {
            0 => issues.push(PathIssue::NoTransforms),
            n if n > MAX_PATH_XFORMS => issues.push(PathIssue::TooManyTransforms(n)),
            _ => {}
        }
        issues
    }
}

/// Parse path source text. `origin` names the text in error messages.
pub fn parse(origin: &Path, text: &str) -> CsResult<Vec<GeodeticPath>> {
    let mut paths: Vec<GeodeticPath> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let bad = |what: String| CsError::format(origin, format!("line {}: {what}", index + 1));
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| bad(format!("expected KEY: value, got {line:?}")))?;
        let key = key.trim().to_ascii_uppercase();
        let value = value.trim();

        if key == "GP_NAME" {
            if value.is_empty() {
                return Err(bad("empty GP_NAME".into()));
            }
            paths.push(GeodeticPath {
                name: value.to_string(),
                ..Default::default()
            });
            continue;
        }
        let current = paths
            .last_mut()
            .ok_or_else(|| bad(format!("{key} before any GP_NAME")))?;
        match key.as_str() {
            "DESC_NM" => current.description = value.to_string(),
            "SOURCE" => current.source = value.to_string(),
            "SRC_DTM" => current.src_datum = value.to_string(),
            "TRG_DTM" => current.trg_datum = value.to_string(),
            "GROUP" => current.group = value.to_string(),
            "EPSG" => {
                current.epsg = value.parse().map_err(|_| bad(format!("bad EPSG code {value:?}")))?;
            }
            "ACCURACY" => {
                current.accuracy = value.parse().map_err(|_| bad(format!("bad accuracy {value:?}")))?;
            }
            "XFORM" => {
                let (name, dir) = value
                    .split_once(',')
                    .ok_or_else(|| bad("XFORM needs name,FWD|INV".into()))?;
                let direction = Direction::from_keyword(dir)
                    .ok_or_else(|| bad(format!("bad direction {:?}", dir.trim())))?;
                if name.trim().is_empty() {
                    return Err(bad("empty XFORM name".into()));
                }
                current.steps.push(PathStep {
                    transform: name.trim().to_string(),
                    direction,
                });
            }
            other => return Err(bad(format!("unknown key {other}"))),
        }
    }
    Ok(paths)
}

fn put_str(out: &mut Vec<u8>, s: &str) -> CsResult<()> {
    let len = u16::try_from(s.len()).map_err(|_| CsError::Internal(format!("string too long: {s:.32}...")))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Validate, sort and encode. Names are compared ignoring case.
pub fn compile(mut paths: Vec<GeodeticPath>) -> CsResult<Vec<u8>> {
    for path in &paths {
        let issues = path.validate();
        if !issues.is_empty() {
            return Err(CsError::Config(format!("geodetic path {}: {issues:?}", path.name)));
        }
    }
    paths.sort_by_key(|p| p.name.to_ascii_uppercase());
    if let Some(pair) = paths
        .windows(2)
        .find(|w| w[0].name.eq_ignore_ascii_case(&w[1].name))
    {
        return Err(CsError::DuplicateName(pair[1].name.clone()));
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC.to_le_bytes());
    out.extend_from_slice(&(paths.len() as u32).to_le_bytes());
    for path in &paths {
        put_str(&mut out, &path.name)?;
        put_str(&mut out, &path.description)?;
        put_str(&mut out, &path.source)?;
        put_str(&mut out, &path.src_datum)?;
        put_str(&mut out, &path.trg_datum)?;
        put_str(&mut out, &path.group)?;
        out.extend_from_slice(&path.epsg.to_le_bytes());
        out.extend_from_slice(&path.accuracy.to_le_bytes());
        out.push(path.steps.len() as u8);
        for step in &path.steps {
            put_str(&mut out, &step.transform)?;
            out.push(match step.direction {
                Direction::Forward => 0,
                Direction::Inverse => 1,
            });
        }
    }
    Ok(out)
}

/// Compile the text file `source` into the dictionary `target`, returning
/// the number of paths written.
pub fn compile_file(provider: &dyn FileProvider, source: &Path, target: &Path) -> CsResult<usize> {
    let text = provider.read_to_string(source)?;
    let paths = parse(source, &text)?;
    let count = paths.len();
    let bytes = compile(paths)?;
    provider.write(target, &bytes)?;
    info!("compiled {count} geodetic paths into {}", target.display());
    Ok(count)
}

struct Cursor<'a> {
    bytes: &'a [u8],
    at: usize,
    origin: &'a Path,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> CsResult<&'a [u8]> {
        let end = self.at + n;
        let slice = self
            .bytes
            .get(self.at..end)
            .ok_or_else(|| CsError::format(self.origin, format!("truncated at byte {}", self.at)))?;
        self.at = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> CsResult<[u8; N]> {
        let mut buf = [0u8; N];
        buf.copy_from_slice(self.take(N)?);
        Ok(buf)
    }

    fn u32(&mut self) -> CsResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn string(&mut self) -> CsResult<String> {
        let len = u16::from_le_bytes(self.array()?) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CsError::format(self.origin, "string is not UTF-8"))
    }
}

/// Decode a compiled dictionary.
pub fn read_dictionary(origin: &Path, bytes: &[u8]) -> CsResult<Vec<GeodeticPath>> {
    let mut cur = Cursor { bytes, at: 0, origin };
    if cur.u32()? != MAGIC {
        return Err(CsError::format(origin, "not a geodetic path dictionary"));
    }
    let count = cur.u32()? as usize;
    let mut paths = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        let mut path = GeodeticPath {
            name: cur.string()?,
            description: cur.string()?,
            source: cur.string()?,
            src_datum: cur.string()?,
            trg_datum: cur.string()?,
            group: cur.string()?,
            epsg: cur.u32()?,
            accuracy: f64::from_le_bytes(cur.array()?),
            steps: Vec::new(),
        };
        let steps = cur.take(1)?[0];
        for _ in 0..steps {
            let transform = cur.string()?;
            let direction = match cur.take(1)?[0] {
                0 => Direction::Forward,
                1 => Direction::Inverse,
                other => return Err(CsError::format(origin, format!("bad direction byte {other}"))),
            };
            path.steps.push(PathStep { transform, direction });
        }
        paths.push(path);
    }
    if cur.at != bytes.len() {
        return Err(CsError::format(origin, "trailing bytes after last path"));
    }
    Ok(paths)
}

/// Binary search of a decoded, sorted dictionary.
pub fn find<'a>(paths: &'a [GeodeticPath], name: &str) -> Option<&'a GeodeticPath> {
    let key = name.to_ascii_uppercase();
    paths
        .binary_search_by(|p| p.name.to_ascii_uppercase().cmp(&key))
        .ok()
        .map(|i| &paths[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::provider::MemoryFileProvider;
    use approx::assert_relative_eq;

    const SOURCE: &str = "# test paths\n\
GP_NAME: Tokyo_to_WGS84\n\
    DESC_NM: Tokyo to WGS84 via JGD2000\n\
    SOURCE: GSI\n\
    SRC_DTM: TOKYO\n\
    TRG_DTM: WGS84\n\
    XFORM: TOKYO_to_JGD2000,FWD\n\
    XFORM: WGS84_to_JGD2000,inv\n\
    GROUP: JAPAN\n\
    EPSG: 15484\n\
    ACCURACY: 1.5\n\
\n\
GP_NAME: ETRS89_to_OSGB36\n\
    SRC_DTM: ETRS89\n\
    TRG_DTM: OSGB36\n\
    XFORM: OSTN02,FWD\n";

    #[test]
    fn test_parse() {
        let paths = parse(Path::new("paths.asc"), SOURCE).unwrap();
        assert_eq!(paths.len(), 2);
        let tokyo = &paths[0];
        assert_eq!(tokyo.steps.len(), 2);
        assert_eq!(tokyo.steps[1].direction, Direction::Inverse);
        assert_eq!(tokyo.epsg, 15484);
        assert_relative_eq!(tokyo.accuracy, 1.5);
        assert!(tokyo.validate().is_empty());
    }

    #[test]
    fn test_parse_errors() {
        let p = Path::new("bad.asc");
        assert!(parse(p, "SRC_DTM: X\n").is_err());
        assert!(parse(p, "GP_NAME: A\nXFORM: B,SIDEWAYS\n").is_err());
        assert!(parse(p, "GP_NAME: A\nXFORM: B\n").is_err());
        assert!(parse(p, "GP_NAME: A\nCOLOUR: red\n").is_err());
        assert!(parse(p, "GP_NAME: A\nEPSG: lots\n").is_err());
    }

    #[test]
    fn test_validate() {
        let mut path = GeodeticPath {
            name: "A".into(),
            src_datum: "X".into(),
            trg_datum: "x".into(),
            ..Default::default()
        };
        assert_eq!(path.validate(), vec![PathIssue::SameDatums, PathIssue::NoTransforms]);
        path.trg_datum = "Y".into();
        path.steps = vec![
            PathStep {
                transform: "T".into(),
                direction: Direction::Forward,
            };
            5
        ];
        assert_eq!(path.validate(), vec![PathIssue::TooManyTransforms(5)]);
    }

    #[test]
    fn test_compile_sorted_and_readable() {
        let paths = parse(Path::new("paths.asc"), SOURCE).unwrap();
        let bytes = compile(paths.clone()).unwrap();
        assert_eq!(&bytes[..4], &MAGIC.to_le_bytes());

        let read = read_dictionary(Path::new("paths.dty"), &bytes).unwrap();
        assert_eq!(read.len(), 2);
        assert_eq!(read[0].name, "ETRS89_to_OSGB36");
        assert_eq!(read[1], paths[0]);
        assert_eq!(find(&read, "tokyo_to_wgs84").map(|p| p.epsg), Some(15484));
        assert!(find(&read, "nowhere").is_none());

        assert!(read_dictionary(Path::new("x"), &bytes[..bytes.len() - 1]).is_err());
        assert!(read_dictionary(Path::new("x"), b"nope").is_err());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let text = format!("{SOURCE}GP_NAME: etrs89_to_osgb36\nSRC_DTM: A\nTRG_DTM: B\nXFORM: C,FWD\n");
        let paths = parse(Path::new("dup.asc"), &text).unwrap();
        assert!(matches!(compile(paths), Err(CsError::DuplicateName(_))));
    }

    #[test]
    fn test_compile_file() {
        let provider = MemoryFileProvider::new();
        provider.insert("/dict/GeodeticPath.asc", SOURCE);
        let count = compile_file(
            &provider,
            Path::new("/dict/GeodeticPath.asc"),
            Path::new("/dict/GeodeticPath.CSD"),
        )
        .unwrap();
        assert_eq!(count, 2);
        let bytes = provider.contents(Path::new("/dict/GeodeticPath.CSD")).unwrap();
        assert_eq!(read_dictionary(Path::new("d"), &bytes).unwrap().len(), 2);
    }
}
