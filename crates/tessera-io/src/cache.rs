//! The on-disk artifact cache.

use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use tessera_pipeline::{Filesystem, FsCache};
use tracing::debug;

use crate::fs::LocalFs;

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Open (creating if needed) a cache directory on the local filesystem.
///
/// Entries are stored as `c<fingerprint>.<extension>` directly inside
/// `dir`.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn open_dir_cache(dir: impl Into<PathBuf>) -> io::Result<FsCache> {
    let dir = dir.into();
    LocalFs.create_dir_all(&dir)?;
    debug!(dir = %dir.display(), "opened cache directory");
    Ok(FsCache::new(Rc::new(LocalFs), dir))
}
