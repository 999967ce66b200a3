//! File access for grid files and catalogs.
//!
//! Grid objects never touch `std::fs` directly; they go through a
//! [`FileProvider`] so that tests (and embedders with their own storage) can
//! substitute an in-memory implementation.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use crate::error::{CsError, CsResult};

/// Random-access reader over one opened file.
pub trait GridReader: Send {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fill `buf` from `offset`. Short files are an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> CsResult<()>;
}

pub trait FileProvider: Send + Sync {
    fn open(&self, path: &Path) -> CsResult<Box<dyn GridReader>>;

    fn read_to_string(&self, path: &Path) -> CsResult<String>;

    /// Modification time, `None` when the file does not exist.
    fn modified(&self, path: &Path) -> CsResult<Option<SystemTime>>;

    fn write(&self, path: &Path, contents: &[u8]) -> CsResult<()>;
}

/// The operating system's file system.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsFileProvider;

struct OsReader {
    path: PathBuf,
    file: File,
    len: u64,
}

impl GridReader for OsReader {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> CsResult<()> {
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|e| CsError::io(&self.path, e))?;
        self.file
            .read_exact(buf)
            .map_err(|e| CsError::io(&self.path, e))
    }
}

impl FileProvider for OsFileProvider {
    fn open(&self, path: &Path) -> CsResult<Box<dyn GridReader>> {
        let file = File::open(path).map_err(|e| CsError::io(path, e))?;
        let len = file.metadata().map_err(|e| CsError::io(path, e))?.len();
        Ok(Box::new(OsReader {
            path: path.to_path_buf(),
            file,
            len,
        }))
    }

    fn read_to_string(&self, path: &Path) -> CsResult<String> {
        fs::read_to_string(path).map_err(|e| CsError::io(path, e))
    }

    fn modified(&self, path: &Path) -> CsResult<Option<SystemTime>> {
        match fs::metadata(path) {
            Ok(meta) => meta.modified().map(Some).map_err(|e| CsError::io(path, e)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CsError::io(path, e)),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> CsResult<()> {
        fs::write(path, contents).map_err(|e| CsError::io(path, e))
    }
}

#[derive(Clone)]
struct MemFile {
    data: Arc<Vec<u8>>,
    modified: SystemTime,
}

/// In-memory file system that counts reads and opens.
///
/// Writes stamp files with a logical clock that advances one second per
/// write, so later writes are always newer.
#[derive(Default)]
pub struct MemoryFileProvider {
    files: Mutex<HashMap<PathBuf, MemFile>>,
    clock: AtomicUsize,
    reads: Arc<AtomicUsize>,
    opens: AtomicUsize,
}

struct MemReader {
    path: PathBuf,
    data: Arc<Vec<u8>>,
    reads: Arc<AtomicUsize>,
}

impl GridReader for MemReader {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> CsResult<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let start = usize::try_from(offset)
            .map_err(|_| CsError::format(&self.path, "offset beyond addressable memory"))?;
        let end = start + buf.len();
        let src = self
            .data
            .get(start..end)
            .ok_or_else(|| CsError::format(&self.path, format!("short read at {offset}")))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

impl MemoryFileProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `contents` at `path` (stamped as a new write).
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        // Writes cannot fail for the in-memory store.
        let _ = self.write(&path.into(), &contents.into());
    }

    /// Number of `read_at` calls served so far, across all readers.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains_key(path)
    }

    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.lock().get(path).map(|f| f.data.as_ref().clone())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, MemFile>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn get(&self, path: &Path) -> CsResult<MemFile> {
        self.lock()
            .get(path)
            .cloned()
            .ok_or_else(|| CsError::FileNotFound(path.to_path_buf()))
    }
}

impl FileProvider for MemoryFileProvider {
    fn open(&self, path: &Path) -> CsResult<Box<dyn GridReader>> {
        let file = self.get(path)?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemReader {
            path: path.to_path_buf(),
            data: file.data,
            reads: Arc::clone(&self.reads),
        }))
    }

    fn read_to_string(&self, path: &Path) -> CsResult<String> {
        let file = self.get(path)?;
        String::from_utf8(file.data.as_ref().clone())
            .map_err(|e| CsError::format(path, e.to_string()))
    }

    fn modified(&self, path: &Path) -> CsResult<Option<SystemTime>> {
        Ok(self.lock().get(path).map(|f| f.modified))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> CsResult<()> {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) as u64 + 1;
        let file = MemFile {
            data: Arc::new(contents.to_vec()),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(tick),
        };
        self.lock().insert(path.to_path_buf(), file);
        Ok(())
    }
}
