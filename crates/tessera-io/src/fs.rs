//! The local filesystem.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tessera_pipeline::Filesystem;
use tracing::debug;

/// [`Filesystem`] backed by `std::fs`.
///
/// Writes go to a temporary sibling file that is renamed into place, so
/// concurrent readers never observe a partially written file.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl LocalFs {
    /// The local filesystem.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// A sibling path unique to this process and moment.
fn temp_sibling(path: &Path) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.{nanos}.tmp", std::process::id()))
}

impl Filesystem for LocalFs {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn modified(&self, path: &Path) -> io::Result<SystemTime> {
        fs::metadata(path)?.modified()
    }

    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write(&self, path: &Path, bytes: &[u8]) -> io::Result<()> {
        let temp = temp_sibling(path);
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, path) {
            let _ = fs::remove_file(&temp);
            return Err(e);
        }
        debug!(path = %path.display(), bytes = bytes.len(), "wrote file");
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "tessera_{name}_{}_{}",
            std::process::id(),
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ))
    }

    #[test]
    fn write_replaces_atomically_and_leaves_no_temp_files() {
        let dir = temp_dir("fs_write");
        LocalFs.create_dir_all(&dir).unwrap();
        let path = dir.join("out.png");

        LocalFs.write(&path, b"first").unwrap();
        LocalFs.write(&path, b"second").unwrap();
        assert_eq!(LocalFs.read(&path).unwrap(), b"second");
        assert!(LocalFs.exists(&path));
        assert!(LocalFs.modified(&path).is_ok());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn directories_are_not_files() {
        let dir = temp_dir("fs_dir");
        LocalFs.create_dir_all(&dir).unwrap();
        assert!(!LocalFs.exists(&dir));
        assert!(!LocalFs.exists(&dir.join("missing.png")));
        assert!(LocalFs.read(&dir.join("missing.png")).is_err());
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = temp_dir("fs_missing");
        assert!(LocalFs.write(&dir.join("x.png"), b"x").is_err());
    }
}
