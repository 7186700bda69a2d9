//! Storage seams: the filesystem the pipeline reads sources and fonts
//! from, and the content-addressed store it caches artifacts in.
//!
//! Both are traits so the core stays free of direct I/O. The
//! `tessera-io` crate provides the real filesystem; [`MemoryFs`] backs
//! tests and embedders that never touch disk.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::fingerprint::Fingerprint;
use crate::types::Format;

/// File access used for sources, fonts and saved output.
pub trait Filesystem {
    /// Whether `path` names an existing file.
    fn exists(&self, path: &Path) -> bool;

    /// Last modification time of `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist or its metadata
    /// cannot be read.
    fn modified(&self, path: &Path) -> io::Result<SystemTime>;

    /// Read the whole file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Write the whole file, replacing any previous contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()>;

    /// Create `path` and any missing parents.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Persistent artifacts keyed by fingerprint and format.
pub trait CacheStore {
    /// Whether an artifact exists.
    fn exists(&self, fingerprint: Fingerprint, format: Format) -> bool;

    /// Read a stored artifact.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is missing or unreadable.
    fn read(&self, fingerprint: Fingerprint, format: Format) -> io::Result<Vec<u8>>;

    /// Store an artifact, replacing an existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact cannot be written.
    fn write(&self, fingerprint: Fingerprint, format: Format, bytes: &[u8]) -> io::Result<()>;

    /// When the artifact was last written.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact is missing.
    fn modified(&self, fingerprint: Fingerprint, format: Format) -> io::Result<SystemTime>;
}

/// File name of a cache entry: `c<hex fingerprint>.<extension>`.
#[must_use]
pub fn cache_file_name(fingerprint: Fingerprint, format: Format) -> String {
    format!("c{fingerprint}.{}", format.extension())
}

/// A [`CacheStore`] that keeps one file per artifact in a directory of
/// some [`Filesystem`].
#[derive(Clone)]
pub struct FsCache {
    fs: Rc<dyn Filesystem>,
    dir: PathBuf,
}

impl FsCache {
    /// Cache rooted at `dir`. The directory is not created here.
    pub fn new(fs: Rc<dyn Filesystem>, dir: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            dir: dir.into(),
        }
    }

    /// The cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of an entry.
    #[must_use]
    pub fn entry_path(&self, fingerprint: Fingerprint, format: Format) -> PathBuf {
        self.dir.join(cache_file_name(fingerprint, format))
    }
}

impl std::fmt::Debug for FsCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FsCache").field("dir", &self.dir).finish_non_exhaustive()
    }
}

impl CacheStore for FsCache {
    fn exists(&self, fingerprint: Fingerprint, format: Format) -> bool {
        self.fs.exists(&self.entry_path(fingerprint, format))
    }

    fn read(&self, fingerprint: Fingerprint, format: Format) -> io::Result<Vec<u8>> {
        self.fs.read(&self.entry_path(fingerprint, format))
    }

    fn write(&self, fingerprint: Fingerprint, format: Format, bytes: &[u8]) -> io::Result<()> {
        self.fs.write(&self.entry_path(fingerprint, format), bytes)
    }

    fn modified(&self, fingerprint: Fingerprint, format: Format) -> io::Result<SystemTime> {
        self.fs.modified(&self.entry_path(fingerprint, format))
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    modified: SystemTime,
}

/// An in-memory [`Filesystem`].
///
/// Modification times come from a logical clock that advances one second
/// per write, so ordering between writes is always observable.
/// Directories are implicit.
#[derive(Debug)]
pub struct MemoryFs {
    files: RefCell<HashMap<PathBuf, MemoryFile>>,
    clock: Cell<u64>,
    reads: Cell<usize>,
    writes: Cell<usize>,
}

impl MemoryFs {
    /// Logical time of the first write, in seconds since the epoch.
    pub const EPOCH_SECS: u64 = 1_000_000;

    /// An empty filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self {
            files: RefCell::new(HashMap::new()),
            clock: Cell::new(Self::EPOCH_SECS),
            reads: Cell::new(0),
            writes: Cell::new(0),
        }
    }

    /// Add or replace a file without counting it as a write.
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: impl Into<Vec<u8>>) {
        let modified = self.tick();
        self.files.borrow_mut().insert(
            path.into(),
            MemoryFile {
                bytes: bytes.into(),
                modified,
            },
        );
    }

    /// Override a file's modification time.
    ///
    /// Returns `false` if the file does not exist.
    pub fn set_modified(&self, path: &Path, modified: SystemTime) -> bool {
        self.files
            .borrow_mut()
            .get_mut(path)
            .map(|file| file.modified = modified)
            .is_some()
    }

    /// Remove a file, returning its contents.
    pub fn remove(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.borrow_mut().remove(path).map(|file| file.bytes)
    }

    /// A copy of a file's contents.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.borrow().get(path).map(|file| file.bytes.clone())
    }

    /// Paths of all files, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<_> = self.files.borrow().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Number of successful [`Filesystem::read`] calls.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    /// Number of successful [`Filesystem::write`] calls.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.get()
    }

    fn tick(&self) -> SystemTime {
        let now = self.clock.get();
        self.clock.set(now + 1);
        UNIX_EPOCH + Duration::from_secs(now)
    }
}

impl Default for MemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{}: no such file", path.display()),
    )
}

impl Filesystem for MemoryFs {
    fn exists(&self, path: &Path) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        self.files
            .borrow()
            .get(path)
            .map(|file| file.modified)
            .ok_or_else(|| not_found(path))
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let bytes = self.get(path).ok_or_else(|| not_found(path))?;
        self.reads.set(self.reads.get() + 1);
        Ok(bytes)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        self.insert(path, bytes);
        self.writes.set(self.writes.get() + 1);
        Ok(())
    }

    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}
