//! Raw and split-raw (multi-part) image sources. A single raw file is just
//! a `SplitRaw` whose segment list happens to have one entry.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// One contiguous piece of a (possibly split) raw image.
///
/// Segments are ordered by `global_offset`, non-overlapping and contiguous:
/// `sum(length) == size()`.
#[derive(Debug, Clone)]
pub struct FileSegment {
    pub path: PathBuf,
    pub global_offset: u64,
    pub length: u64,
}

/// Raw / split-raw image source. Keeps a single cached file descriptor —
/// the resource-scoping policy calls for one active handle, reopened on
/// segment-boundary crossings.
pub struct RawSource {
    segments: Vec<FileSegment>,
    open: Option<(usize, File)>,
}

fn is_readable(path: &Path) -> bool {
    File::open(path).is_ok()
}

/// Does `name` look like the first segment of a split image, and if so,
/// what's the 3-digit-counter template and starting counter?
///
/// Matches filenames ending `.000`, `.001`, or `001.vmdk` — the trailing
/// run of ASCII digits is replaced by a `{:03}`-style placeholder.
fn split_template(path: &Path) -> Option<(PathBuf, u32)> {
    let name = path.file_name()?.to_str()?;
    let bytes = name.as_bytes();
    let mut end = bytes.len();
    // Skip a known non-digit suffix such as ".vmdk" before looking for digits.
    let (core_end, suffix) = if name.ends_with(".vmdk") {
        (name.len() - ".vmdk".len(), ".vmdk")
    } else {
        (name.len(), "")
    };
    end = core_end;
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start == end {
        return None; // no trailing digit run at all
    }
    let digits = &name[start..end];
    if digits.len() < 3 {
        return None;
    }
    let counter: u32 = digits.parse().ok()?;
    // Require the whole-name shape the spec calls out: .000 / .001 / NNN.vmdk
    let looks_like_split = (suffix.is_empty() && (name.ends_with(".000") || name.ends_with(".001")))
        || (suffix == ".vmdk" && name[..core_end].ends_with("001"));
    if !looks_like_split {
        return None;
    }
    let prefix = &name[..start];
    let template_name = format!("{prefix}{{:03}}{suffix}");
    Some((path.with_file_name(template_name), counter + 1))
}

fn candidate_for(template: &Path, counter: u32) -> PathBuf {
    let name = template.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    let filled = name.replacen("{:03}", &format!("{counter:03}"), 1);
    template.with_file_name(filled)
}

impl RawSource {
    pub fn open(path: &Path) -> Result<Self> {
        if !is_readable(path) {
            return Err(Error::NoSuchFile(path.to_path_buf()));
        }

        let mut segments = Vec::new();
        let first_len = segment_len(path)?;
        segments.push(FileSegment { path: path.to_path_buf(), global_offset: 0, length: first_len });

        if let Some((template, mut counter)) = split_template(path) {
            loop {
                let candidate = candidate_for(&template, counter);
                if !is_readable(&candidate) {
                    break;
                }
                let len = segment_len(&candidate)?;
                let offset = segments.iter().map(|s| s.length).sum();
                segments.push(FileSegment { path: candidate, global_offset: offset, length: len });
                counter += 1;
            }
        }

        Ok(Self { segments, open: None })
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.segments.iter().map(|s| s.length).sum()
    }

    #[must_use]
    pub fn segments(&self) -> &[FileSegment] {
        &self.segments
    }

    fn segment_index_for(&self, offset: u64) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| offset >= s.global_offset && offset < s.global_offset + s.length)
    }

    fn open_segment(&mut self, idx: usize) -> Result<()> {
        if let Some((open_idx, _)) = &self.open {
            if *open_idx == idx {
                return Ok(());
            }
        }
        let f = File::open(&self.segments[idx].path)
            .map_err(|_| Error::NoSuchFile(self.segments[idx].path.clone()))?;
        self.open = Some((idx, f));
        Ok(())
    }

    /// Reads up to `dst.len()` bytes starting at `offset`, crossing segment
    /// boundaries as needed. Returns the number of bytes actually read (0
    /// past the end of the image, never a short read from a mid-stream
    /// I/O failure — those are reported as `ReadError`).
    pub fn pread(&mut self, dst: &mut [u8], offset: u64) -> Result<usize> {
        let mut got = 0usize;
        let mut cur_offset = offset;
        while got < dst.len() {
            let Some(idx) = self.segment_index_for(cur_offset) else {
                break;
            };
            self.open_segment(idx)?;
            let seg = &self.segments[idx];
            let seg_local_offset = cur_offset - seg.global_offset;
            let remaining_in_segment = (seg.length - seg_local_offset) as usize;
            let want = (dst.len() - got).min(remaining_in_segment);
            if want == 0 {
                break;
            }

            let (_, file) = self.open.as_mut().expect("segment just opened");
            use std::io::Seek;
            file.seek(std::io::SeekFrom::Start(seg_local_offset))
                .map_err(|e| Error::ReadError(e.to_string()))?;
            let dst_slice = &mut dst[got..got + want];
            read_exact_or_eof(file, dst_slice)?;

            got += want;
            cur_offset += want as u64;
        }
        Ok(got)
    }
}

/// Reads as much of `dst` as the file has left, treating a clean EOF as a
/// short (but not erroneous) read; any other I/O failure is `ReadError`.
fn read_exact_or_eof(file: &mut File, dst: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < dst.len() {
        match file.read(&mut dst[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) => return Err(Error::ReadError(e.to_string())),
        }
    }
    Ok(())
}

fn segment_len(path: &Path) -> Result<u64> {
    let meta = std::fs::metadata(path).map_err(|_| Error::NoSuchFile(path.to_path_buf()))?;
    let len = meta.len();
    if len == 0 {
        if let Some(geom) = windows_physical_drive_size(path) {
            return Ok(geom);
        }
    }
    Ok(len)
}

#[cfg(windows)]
fn windows_physical_drive_size(path: &Path) -> Option<u64> {
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::Storage::FileSystem::{
        CreateFileW, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    };
    use windows::Win32::System::Ioctl::{IOCTL_DISK_GET_LENGTH_INFO, GET_LENGTH_INFORMATION};
    use windows::Win32::System::IO::DeviceIoControl;
    use windows::core::PCWSTR;
    use std::os::windows::ffi::OsStrExt;

    let wide: Vec<u16> = path.as_os_str().encode_wide().chain(std::iter::once(0)).collect();

    unsafe {
        let handle = CreateFileW(
            PCWSTR(wide.as_ptr()),
            windows::Win32::Storage::FileSystem::FILE_GENERIC_READ.0,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            None,
            OPEN_EXISTING,
            Default::default(),
            None,
        )
        .ok()?;
        if handle.is_invalid() {
            return None;
        }
        let mut info = GET_LENGTH_INFORMATION::default();
        let mut returned = 0u32;
        let ok = DeviceIoControl(
            handle,
            IOCTL_DISK_GET_LENGTH_INFO,
            None,
            0,
            Some(&mut info as *mut _ as *mut _),
            std::mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            Some(&mut returned),
            None,
        );
        let _ = CloseHandle(handle);
        if ok.is_err() {
            return None;
        }
        Some(info.Length as u64)
    }
}

#[cfg(not(windows))]
fn windows_physical_drive_size(_path: &Path) -> Option<u64> {
    None
}
