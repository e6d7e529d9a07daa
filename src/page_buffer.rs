//! `sbuf` — an owned byte window over the image, annotated with its logical
//! position. Every typed read is bounds-checked against `bufsize`.

use std::sync::Arc;

use memmap2::Mmap;

use crate::error::{Error, Result};
use crate::pos0::Pos0;

/// Where a `PageBuffer`'s bytes actually live.
enum Storage {
    /// Freshly allocated and filled by an ImageSource (`Raw`/`SplitRaw`/`E01`).
    Owned(Vec<u8>),
    /// Memory-mapped whole file (`Directory` source).
    Mapped(Mmap),
    /// A sub-range of a parent buffer, kept alive by a shared reference.
    Slice { parent: Arc<PageBuffer>, start: usize, len: usize },
}

impl Storage {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Owned(v) => v,
            Self::Mapped(m) => m,
            Self::Slice { parent, start, len } => &parent.bytes()[*start..*start + *len],
        }
    }
}

/// A read-only view over contiguous image bytes.
///
/// `pagesize` bytes (`[0, pagesize)`) belong to *this* page; any trailing
/// bytes up to `bufsize` are margin borrowed from the next page so that
/// artifacts straddling a page boundary are still visible to a scanner,
/// exactly once, via the page whose `[0, pagesize)` contains the artifact's
/// start offset.
pub struct PageBuffer {
    pos0: Pos0,
    storage: Storage,
    pagesize: usize,
}

impl PageBuffer {
    #[must_use]
    pub fn from_owned(pos0: Pos0, data: Vec<u8>, pagesize: usize) -> Self {
        let pagesize = pagesize.min(data.len());
        Self { pos0, storage: Storage::Owned(data), pagesize }
    }

    #[must_use]
    pub fn from_mapped(pos0: Pos0, map: Mmap) -> Self {
        let pagesize = map.len();
        Self { pos0, storage: Storage::Mapped(map), pagesize }
    }

    /// Carves out a sub-buffer `[start, start+len)` of `self`, sharing
    /// storage rather than copying. Used for nested/recursive carving.
    #[must_use]
    pub fn slice(self: &Arc<Self>, start: usize, len: usize) -> Self {
        let len = len.min(self.bufsize().saturating_sub(start));
        Self {
            pos0: self.pos0.advance(start as u64),
            storage: Storage::Slice { parent: Arc::clone(self), start, len },
            pagesize: len,
        }
    }

    #[must_use]
    pub fn pos0(&self) -> &Pos0 {
        &self.pos0
    }

    /// Total bytes available, including margin.
    #[must_use]
    pub fn bufsize(&self) -> usize {
        self.storage.bytes().len()
    }

    /// Bytes that belong to this page (excludes margin).
    #[must_use]
    pub const fn pagesize(&self) -> usize {
        self.pagesize
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        self.storage.bytes()
    }

    fn check(&self, offset: usize, len: usize) -> Result<()> {
        let in_range = matches!(offset.checked_add(len), Some(end) if end <= self.bufsize());
        if !in_range {
            return Err(Error::OutOfRange { offset, len, bufsize: self.bufsize() });
        }
        Ok(())
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8> {
        self.check(offset, 1)?;
        Ok(self.bytes()[offset])
    }

    pub fn get_u16_le(&self, offset: usize) -> Result<u16> {
        self.check(offset, 2)?;
        Ok(u16::from_le_bytes(self.bytes()[offset..offset + 2].try_into().unwrap()))
    }

    pub fn get_u16_be(&self, offset: usize) -> Result<u16> {
        self.check(offset, 2)?;
        Ok(u16::from_be_bytes(self.bytes()[offset..offset + 2].try_into().unwrap()))
    }

    pub fn get_u32_le(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4)?;
        Ok(u32::from_le_bytes(self.bytes()[offset..offset + 4].try_into().unwrap()))
    }

    pub fn get_u32_be(&self, offset: usize) -> Result<u32> {
        self.check(offset, 4)?;
        Ok(u32::from_be_bytes(self.bytes()[offset..offset + 4].try_into().unwrap()))
    }

    pub fn get_u64_le(&self, offset: usize) -> Result<u64> {
        self.check(offset, 8)?;
        Ok(u64::from_le_bytes(self.bytes()[offset..offset + 8].try_into().unwrap()))
    }

    /// 48-bit little-endian value (NTFS MFT record references).
    pub fn get_u48_le(&self, offset: usize) -> Result<u64> {
        self.check(offset, 6)?;
        let mut buf = [0u8; 8];
        buf[..6].copy_from_slice(&self.bytes()[offset..offset + 6]);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn get_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.check(offset, len)?;
        Ok(&self.bytes()[offset..offset + len])
    }

    /// First occurrence of `needle` at or after `start`, or `None`.
    #[must_use]
    pub fn find(&self, needle: &[u8], start: usize) -> Option<usize> {
        if start >= self.bufsize() {
            return None;
        }
        memchr::memmem::find(&self.bytes()[start..], needle).map(|i| i + start)
    }

    /// True if `[offset, offset+len)` is a run of a single repeated byte
    /// (all zero, or any other constant fill value).
    #[must_use]
    pub fn is_constant(&self, offset: usize, len: usize) -> bool {
        let Ok(slice) = self.get_slice(offset, len) else { return false };
        match slice.first() {
            None => true,
            Some(&first) => slice.iter().all(|&b| b == first),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buf(data: &[u8], pagesize: usize) -> PageBuffer {
        PageBuffer::from_owned(Pos0::new(0), data.to_vec(), pagesize)
    }

    #[test]
    fn typed_reads_respect_bufsize() {
        let b = buf(&[1, 2, 3, 4, 5, 6, 7, 8], 8);
        assert_eq!(b.get_u16_le(0).unwrap(), 0x0201);
        assert_eq!(b.get_u32_be(0).unwrap(), 0x01020304);
        assert!(b.get_u64_le(2).is_err());
    }

    #[test]
    fn out_of_range_reports_offsets() {
        let b = buf(&[0u8; 4], 4);
        let err = b.get_u32_le(2).unwrap_err();
        match err {
            Error::OutOfRange { offset, len, bufsize } => {
                assert_eq!((offset, len, bufsize), (2, 4, 4));
            }
            _ => panic!("wrong error variant"),
        }
    }

    #[test]
    fn find_locates_needle_after_start() {
        let b = buf(b"xxHELLOxxHELLOxx", 16);
        assert_eq!(b.find(b"HELLO", 0), Some(2));
        assert_eq!(b.find(b"HELLO", 3), Some(9));
        assert_eq!(b.find(b"NOPE", 0), None);
    }

    #[test]
    fn is_constant_detects_zero_runs_and_fill_bytes() {
        let b = buf(&[0u8; 32], 32);
        assert!(b.is_constant(0, 32));
        let b2 = buf(&[0xffu8; 32], 32);
        assert!(b2.is_constant(0, 32));
        let mut data = vec![0u8; 32];
        data[5] = 1;
        let b3 = buf(&data, 32);
        assert!(!b3.is_constant(0, 32));
    }

    #[test]
    fn pagesize_clipped_to_data_len_margin_is_remainder() {
        let b = buf(&[0u8; 10], 6);
        assert_eq!(b.pagesize(), 6);
        assert_eq!(b.bufsize(), 10);
    }

    #[test]
    fn slice_shares_storage_and_offsets_pos0() {
        let parent = Arc::new(buf(b"0123456789", 10));
        let child = parent.slice(3, 4);
        assert_eq!(child.bytes(), b"3456");
        assert_eq!(child.pos0().offset(), 3);
    }
}
