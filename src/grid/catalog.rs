//! Datum catalog files: ordered lists of grid files for one datum shift.
//!
//! ```text
//! # initial comment
//! ./TKY2JGD.par,65536,0,0.5
//! "../shared/grid, v2.par"
//! # middle comment
//! Fallback = TOKYO_TO_JGD2000_3P
//! # trailing comment
//! ```
//!
//! Entries are `path[,bufferSize[,flags[,density]]]`. A path starting with
//! `./` or `../` is relative to the catalog's directory; `..` is kept
//! literally. Paths may be double-quoted with `""` as an escaped quote.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::info;

use crate::error::{CsError, CsResult};
use crate::grid::provider::FileProvider;
use crate::grid::{registry, GridFile, GridOptions};

#[derive(Clone, Debug, PartialEq)]
pub struct CatalogEntry {
    /// Path as written in the catalog.
    pub raw_path: String,
    /// Path with catalog-relative prefixes resolved.
    pub path: PathBuf,
    pub relative: bool,
    /// Read buffer override, 0 for the engine default.
    pub buffer_size: usize,
    pub flags: u32,
    pub density: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatumCatalog {
    pub source: PathBuf,
    pub entries: Vec<CatalogEntry>,
    pub fallback: Option<String>,
    pub initial_comment: Vec<String>,
    pub middle_comment: Vec<String>,
    pub trailing_comment: Vec<String>,
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    Initial,
    Middle,
    Trailing,
}

fn is_relative(raw: &str) -> bool {
    ["./", "../", ".\\", "..\\"].iter().any(|p| raw.starts_with(p))
}

/// Resolve a catalog path against the catalog's directory.
fn resolve(dir: &Path, raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("./").or_else(|| raw.strip_prefix(".\\")) {
        dir.join(rest)
    } else if is_relative(raw) {
        dir.join(raw)
    } else {
        PathBuf::from(raw)
    }
}

/// Split a leading, possibly quoted, path from the rest of the line.
fn split_path(line: &str) -> Option<(String, &str)> {
    let Some(quoted) = line.strip_prefix('"') else {
        return Some(match line.find(',') {
            Some(at) => (line[..at].trim().to_string(), &line[at..]),
            None => (line.trim().to_string(), ""),
        });
    };
    let mut path = String::new();
    let mut chars = quoted.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                path.push('"');
                chars.next();
            } else {
                return Some((path, quoted[i + 1..].trim_start()));
            }
        } else {
            path.push(c);
        }
    }
    None
}

fn quote_path(raw: &str) -> String {
    if raw.contains([',', '"']) || raw.trim() != raw {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn fallback_name(line: &str) -> Option<&str> {
    let head = line.get(..8)?;
    if !head.eq_ignore_ascii_case("fallback") {
        return None;
    }
    let rest = line[8..].trim_start();
    rest.strip_prefix('=')
        .or_else(|| rest.strip_prefix(','))
        .map(str::trim)
}

impl DatumCatalog {
    pub fn parse(source: &Path, text: &str) -> CsResult<Self> {
        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        let mut catalog = DatumCatalog {
            source: source.to_path_buf(),
            ..Default::default()
        };
        let mut section = Section::Initial;

        for (index, line) in text.lines().enumerate() {
            let bad = |what: &str| CsError::format(source, format!("line {}: {what}", index + 1));
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                match section {
                    Section::Initial => catalog.initial_comment.push(line.to_string()),
                    Section::Middle => catalog.middle_comment.push(line.to_string()),
                    Section::Trailing => catalog.trailing_comment.push(line.to_string()),
                }
                continue;
            }
            if let Some(name) = fallback_name(trimmed) {
                if name.is_empty() {
                    return Err(bad("empty fallback name"));
                }
                catalog.fallback = Some(name.to_string());
                section = Section::Trailing;
                continue;
            }

            let (raw_path, rest) = split_path(trimmed).ok_or_else(|| bad("unterminated quote"))?;
            if raw_path.is_empty() {
                return Err(bad("empty path"));
            }
            let fields: Vec<&str> = match rest.strip_prefix(',') {
                Some(fields) => fields.split(',').map(str::trim).collect(),
                None if rest.is_empty() => Vec::new(),
                None => return Err(bad("text after quoted path")),
            };
            if fields.len() > 3 {
                return Err(bad("too many fields"));
            }
            let field = |i: usize| fields.get(i).copied().filter(|f| !f.is_empty());
            let buffer_size = match field(0) {
                Some(f) => f.parse().map_err(|_| bad("buffer size"))?,
                None => 0,
            };
            let flags = match field(1) {
                Some(f) => f.parse().map_err(|_| bad("flags"))?,
                None => 0,
            };
            let density = match field(2) {
                Some(f) => f.parse().map_err(|_| bad("density"))?,
                None => 0.0,
            };

            catalog.entries.push(CatalogEntry {
                path: resolve(dir, &raw_path),
                relative: is_relative(&raw_path),
                raw_path,
                buffer_size,
                flags,
                density,
            });
            if section == Section::Initial {
                section = Section::Middle;
            }
        }
        Ok(catalog)
    }

    pub fn load(path: &Path, provider: &dyn FileProvider) -> CsResult<Self> {
        let text = provider.read_to_string(path)?;
        let catalog = Self::parse(path, &text)?;
        info!(
            "catalog {}: {} grid files, fallback {:?}",
            path.display(),
            catalog.entries.len(),
            catalog.fallback
        );
        Ok(catalog)
    }

    /// Text form: initial comment, entries, middle comment, fallback,
    /// trailing comment.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for line in &self.initial_comment {
            let _ = writeln!(out, "{line}");
        }
        for entry in &self.entries {
            out.push_str(&quote_path(&entry.raw_path));
            let has_density = entry.density != 0.0;
            let has_flags = has_density || entry.flags != 0;
            if has_flags || entry.buffer_size != 0 {
                let _ = write!(out, ",{}", entry.buffer_size);
            }
            if has_flags {
                let _ = write!(out, ",{}", entry.flags);
            }
            if has_density {
                let _ = write!(out, ",{}", entry.density);
            }
            out.push('\n');
        }
        for line in &self.middle_comment {
            let _ = writeln!(out, "{line}");
        }
        if let Some(name) = &self.fallback {
            let _ = writeln!(out, "Fallback = {name}");
        }
        for line in &self.trailing_comment {
            let _ = writeln!(out, "{line}");
        }
        out
    }

    pub fn save(&self, path: &Path, provider: &dyn FileProvider) -> CsResult<()> {
        provider.write(path, self.to_text().as_bytes())
    }

    pub fn resolved_paths(&self) -> Vec<&Path> {
        self.entries.iter().map(|e| e.path.as_path()).collect()
    }

    /// Grid file objects for every entry, in catalog order. Files are not
    /// touched until queried.
    pub fn open_grids(
        &self,
        provider: &Arc<dyn FileProvider>,
        options: GridOptions,
    ) -> CsResult<Vec<Box<dyn GridFile>>> {
        self.entries
            .iter()
            .map(|entry| {
                let options = GridOptions {
                    buffer_size: if entry.buffer_size > 0 {
                        entry.buffer_size
                    } else {
                        options.buffer_size
                    },
                    ..options
                };
                registry::open(&entry.path, None, Arc::clone(provider), options)
            })
            .collect()
    }
}
