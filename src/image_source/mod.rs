//! Dispatch over the three evidence container shapes: a raw (or split-raw)
//! disk image, an E01/EWF container, and a directory tree treated as a bag
//! of files. Callers open a path once via [`ImageSource::open`] and then
//! drive the rest of the pipeline against the enum without caring which
//! variant they got.

pub mod directory;
pub mod e01;
pub mod raw;

use std::path::Path;

use crate::error::{Error, Result};
use crate::pos0::Pos0;

use directory::DirectorySource;
use e01::E01Source;
use raw::RawSource;

pub enum ImageSource {
    Raw(RawSource),
    E01(E01Source),
    Directory(DirectorySource),
}

impl ImageSource {
    /// Opens `path`, sniffing which container shape it is.
    ///
    /// A directory is only accepted when `recurse` is set — without it,
    /// the path simply isn't openable as an image, so it fails the same
    /// way a missing file would (`NoSuchFile`). With `recurse`, the
    /// directory's top-level entries are checked first: a `.E01`/`.000`/
    /// `.001` file sitting right there means this is a segmented image
    /// that was handed to us as if it were a tree, not an actual tree, and
    /// that's rejected with `InvalidInput` naming the offending file.
    /// Otherwise it's a real directory source. Extensions of the form
    /// `.E01`/`.e01` (optionally followed by a segment suffix, e.g.
    /// `case.E01.001`) select the E01 reader; everything else is handed to
    /// the raw/split-raw reader, which degrades gracefully to a single
    /// unsplit file when no sibling segments exist.
    pub fn open(path: &Path, recurse: bool) -> Result<Self> {
        if path.is_dir() {
            if !recurse {
                return Err(Error::NoSuchFile(path.to_path_buf()));
            }
            if let Some(segment) = find_top_level_segment(path)? {
                return Err(Error::InvalidInput(format!(
                    "{} contains segmented image file {}; pass its path directly instead of recursing into it",
                    path.display(),
                    segment.display()
                )));
            }
            return Ok(Self::Directory(DirectorySource::open(path)?));
        }

        if !path.exists() {
            return Err(Error::NoSuchFile(path.to_path_buf()));
        }

        if looks_like_e01(path) {
            return Ok(Self::E01(E01Source::open(path)?));
        }

        Ok(Self::Raw(RawSource::open(path)?))
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        match self {
            Self::Raw(r) => r.size(),
            Self::E01(e) => e.size(),
            Self::Directory(d) => d.file_count(),
        }
    }

}

fn looks_like_e01(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_ascii_lowercase();
    lower.ends_with(".e01") || lower.contains(".e01.")
}

/// A `.E01`/`.e01`, `.000` or `.001` file sitting directly inside `dir` —
/// evidence that `dir` is a segmented image's containing folder, not a
/// real file tree to recurse into.
fn find_top_level_segment(dir: &Path) -> Result<Option<std::path::PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|_| Error::NoSuchFile(dir.to_path_buf()))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::ReadError(e.to_string()))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".e01") || lower.contains(".e01.") || lower.ends_with(".000") || lower.ends_with(".001") {
            return Ok(Some(path));
        }
    }
    Ok(None)
}
