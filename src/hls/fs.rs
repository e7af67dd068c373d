//! File-system abstraction for HLS output
//!
//! Fragment and playlist writes go through this trait so the muxer can be
//! pointed at a real directory tree or an in-memory store (serving segments
//! straight from RAM, and deterministic unit tests). The in-memory
//! implementation is safe for concurrent use across muxers; the disk one
//! delegates to the OS.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::Result;

/// Which implementation a [`FileSystem`] is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Disk,
    Memory,
}

/// An open fragment file
pub trait FragmentFile: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<()>;
    fn close(&mut self) -> Result<()>;
}

/// The file operations the HLS layer needs
pub trait FileSystem: Send + Sync {
    /// Create (truncate) a file for streaming writes
    fn create(&self, path: &Path) -> Result<Box<dyn FragmentFile>>;
    /// Read a whole file
    fn read_file(&self, path: &Path) -> Result<Vec<u8>>;
    /// Write a whole file
    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()>;
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;
    fn remove(&self, path: &Path) -> Result<()>;
    fn mkdir_all(&self, path: &Path) -> Result<()>;
    fn kind(&self) -> FsKind;
}

/// Whether an error is a plain file-not-found
pub fn is_not_found(err: &crate::error::Error) -> bool {
    matches!(err, crate::error::Error::Io(e) if e.kind() == io::ErrorKind::NotFound)
}

// ---- disk ----

/// OS-backed implementation
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

struct DiskFile {
    file: Option<std::fs::File>,
}

impl FragmentFile for DiskFile {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        use std::io::Write;
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file already closed"))?;
        file.write_all(data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        use std::io::Write;
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

impl FileSystem for DiskFs {
    fn create(&self, path: &Path) -> Result<Box<dyn FragmentFile>> {
        let file = std::fs::File::create(path)?;
        Ok(Box::new(DiskFile { file: Some(file) }))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        Ok(std::fs::read(path)?)
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        std::fs::write(path, data)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn mkdir_all(&self, path: &Path) -> Result<()> {
        std::fs::create_dir_all(path)?;
        Ok(())
    }

    fn kind(&self) -> FsKind {
        FsKind::Disk
    }
}

// ---- memory ----

type Store = Arc<RwLock<HashMap<PathBuf, Vec<u8>>>>;

/// In-memory implementation; clones share one store
#[derive(Debug, Default, Clone)]
pub struct MemFs {
    store: Store,
}

struct MemFile {
    store: Store,
    path: PathBuf,
    closed: bool,
}

impl FragmentFile for MemFile {
    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "file already closed").into());
        }
        let mut store = self.store.write();
        store.entry(self.path.clone()).or_default().extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a file's contents
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.store.read().get(path).cloned()
    }

    /// All stored paths, sorted
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.store.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn exists(&self, path: &Path) -> bool {
        self.store.read().contains_key(path)
    }
}

impl FileSystem for MemFs {
    fn create(&self, path: &Path) -> Result<Box<dyn FragmentFile>> {
        self.store.write().insert(path.to_path_buf(), Vec::new());
        Ok(Box::new(MemFile {
            store: Arc::clone(&self.store),
            path: path.to_path_buf(),
            closed: false,
        }))
    }

    fn read_file(&self, path: &Path) -> Result<Vec<u8>> {
        self.store
            .read()
            .get(path)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file").into())
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        self.store.write().insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut store = self.store.write();
        let data = store
            .remove(from)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file"))?;
        store.insert(to.to_path_buf(), data);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<()> {
        self.store
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no such file").into())
    }

    fn mkdir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn kind(&self) -> FsKind {
        FsKind::Memory
    }
}
