//! Typed error hierarchy shared by every image source, iterator and recorder.

use std::path::PathBuf;

/// Errors surfaced across the image-abstraction and scanner-dispatch core.
///
/// `OutOfRange` doubles as the "`RangeException`" the distilled design talks
/// about for the typed-read facade — there is no separate translation unit
/// to alias across in Rust, so the one variant serves both call sites.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no such file: {0}")]
    NoSuchFile(PathBuf),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("read error: {0}")]
    ReadError(String),

    /// Not a real failure — the normal iterator terminator.
    #[error("end of image")]
    EndOfImage,

    #[error("out of range: offset {offset} + {len} exceeds buffer of {bufsize} bytes")]
    OutOfRange {
        offset: usize,
        len: usize,
        bufsize: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
