//! Directory-tree evidence source. The "image" is the *set of files*; the
//! iterator addresses files, not bytes — each file becomes exactly one
//! memory-mapped page with no margin.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::page_buffer::PageBuffer;
use crate::pos0::Pos0;

pub struct DirectorySource {
    files: Vec<PathBuf>,
}

impl DirectorySource {
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::NoSuchFile(root.to_path_buf()));
        }
        // jwalk's traversal order is an implementation detail of its
        // parallel directory reader and must not be relied upon; callers
        // that need stable ordering should sort `files()` themselves.
        let mut files = Vec::new();
        for entry in WalkDir::new(root).into_iter().flatten() {
            if entry.file_type().is_file() {
                files.push(entry.path());
            }
        }
        Ok(Self { files })
    }

    /// Number of files discovered — this source's notion of "size".
    #[must_use]
    pub fn file_count(&self) -> u64 {
        self.files.len() as u64
    }

    #[must_use]
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Memory-maps file number `index` as a single whole-file page.
    pub fn sbuf_alloc(&self, index: u64) -> Result<Option<PageBuffer>> {
        let Some(path) = self.files.get(index as usize) else {
            return Ok(None);
        };
        let file = std::fs::File::open(path).map_err(|_| Error::NoSuchFile(path.clone()))?;
        let meta = file.metadata().map_err(|e| Error::ReadError(e.to_string()))?;
        if meta.len() == 0 {
            // mmap of a zero-length file is an error on most platforms;
            // represent it as an empty owned buffer instead.
            let pos0 = Pos0::with_path(path.to_string_lossy().into_owned(), 0);
            return Ok(Some(PageBuffer::from_owned(pos0, Vec::new(), 0)));
        }
        let map = unsafe { Mmap::map(&file) }.map_err(|e| Error::ReadError(e.to_string()))?;
        let pos0 = Pos0::with_path(path.to_string_lossy().into_owned(), 0);
        Ok(Some(PageBuffer::from_mapped(pos0, map)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn walks_nested_tree_and_finds_regular_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let src = DirectorySource::open(dir.path()).unwrap();
        assert_eq!(src.file_count(), 2);
    }

    #[test]
    fn sbuf_alloc_maps_whole_file_with_no_margin() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(b"0123456789").unwrap();
        drop(f);

        let src = DirectorySource::open(dir.path()).unwrap();
        let page = src.sbuf_alloc(0).unwrap().unwrap();
        assert_eq!(page.bufsize(), 10);
        assert_eq!(page.pagesize(), page.bufsize());
    }

    #[test]
    fn sbuf_alloc_past_last_file_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let src = DirectorySource::open(dir.path()).unwrap();
        assert!(src.sbuf_alloc(0).unwrap().is_none());
    }

    #[test]
    fn non_directory_path_fails_with_no_such_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        std::fs::write(&path, b"x").unwrap();
        assert!(matches!(DirectorySource::open(&path), Err(Error::NoSuchFile(_))));
    }
}
