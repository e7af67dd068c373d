//! One open .ts fragment file

use std::path::Path;

use crate::error::Result;
use crate::hls::fs::{FileSystem, FragmentFile};

/// Streaming writer for the fragment currently being recorded.
///
/// Opening twice without closing, or closing while nothing is open, is a
/// muxer bug, not a runtime condition, and panics.
#[derive(Default)]
pub struct Fragment {
    file: Option<Box<dyn FragmentFile>>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn open(&mut self, fs: &dyn FileSystem, path: &Path) -> Result<()> {
        assert!(self.file.is_none(), "fragment opened twice");
        self.file = Some(fs.create(path)?);
        Ok(())
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let file = self.file.as_mut().expect("write to closed fragment");
        file.write_all(data)
    }

    pub fn close(&mut self) -> Result<()> {
        let mut file = self.file.take().expect("fragment closed twice");
        file.close()
    }

    /// Drop the handle without the double-close check; used when an IO error
    /// already invalidated the fragment.
    pub fn abandon(&mut self) {
        self.file = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::fs::MemFs;
    use std::path::PathBuf;

    #[test]
    fn test_open_write_close() {
        let fs = MemFs::new();
        let mut frag = Fragment::new();
        let path = PathBuf::from("/s/one.ts");
        frag.open(&fs, &path).unwrap();
        assert!(frag.is_open());
        frag.write_all(&[0x47; 188]).unwrap();
        frag.close().unwrap();
        assert!(!frag.is_open());
        assert_eq!(fs.read_file(&path).unwrap().len(), 188);
    }

    #[test]
    #[should_panic(expected = "fragment closed twice")]
    fn test_double_close_panics() {
        let fs = MemFs::new();
        let mut frag = Fragment::new();
        frag.open(&fs, Path::new("/s/one.ts")).unwrap();
        frag.close().unwrap();
        let _ = frag.close();
    }

    #[test]
    fn test_abandon_allows_reopen() {
        let fs = MemFs::new();
        let mut frag = Fragment::new();
        frag.open(&fs, Path::new("/s/one.ts")).unwrap();
        frag.abandon();
        frag.open(&fs, Path::new("/s/two.ts")).unwrap();
        frag.close().unwrap();
    }
}
