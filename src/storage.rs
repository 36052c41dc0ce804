//! Filesystem Abstraction
//!
//! Steps never touch the filesystem directly; they go through the
//! [`FileSystem`] configured on the engine so scenarios can run against
//! the real disk, a sandboxed directory or memory.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use log::debug;

/// Minimal filesystem surface used by steps, conditions and includes.
pub trait FileSystem: Send + Sync {
    /// Returns `Ok(false)` when the path does not exist, and an error for
    /// any other failure to inspect it.
    fn exists(&self, path: &str) -> io::Result<bool>;

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    fn write_file(&self, path: &str, contents: &[u8]) -> io::Result<()>;
}

/// The host operating system's filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

impl FileSystem for OsFs {
    fn exists(&self, path: &str) -> io::Result<bool> {
        match fs::metadata(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }

        let mut file = options.open(path)?;
        file.write_all(contents)
    }
}

/// A filesystem rooted at a directory.
///
/// Every path is resolved relative to the root; a leading `/` is stripped,
/// so `/tasks/setup.yaml` and `tasks/setup.yaml` name the same file. This
/// is the usual storage for `include` steps.
#[derive(Debug, Clone)]
pub struct DirFs {
    root: PathBuf,
}

impl DirFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl FileSystem for DirFs {
    fn exists(&self, path: &str) -> io::Result<bool> {
        match fs::metadata(self.resolve(path)) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        let resolved = self.resolve(path);
        debug!("Reading {}", resolved.display());
        fs::read(resolved)
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        let resolved = self.resolve(path);
        let resolved = resolved.to_string_lossy();
        OsFs.write_file(&resolved, contents)
    }
}

/// An in-memory filesystem keyed by path string.
#[derive(Debug, Default)]
pub struct MemFs {
    files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file, returning `self` for chained setup.
    pub fn with_file(self, path: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<Vec<u8>>) {
        self.lock().insert(path.into(), contents.into());
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.lock().get(path).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FileSystem for MemFs {
    fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.lock().contains_key(path))
    }

    fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
        self.get(path).ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("file does not exist: {}", path))
        })
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> io::Result<()> {
        self.insert(path, contents.to_vec());
        Ok(())
    }
}
