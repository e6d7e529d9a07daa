//! `windirs`: carves FAT32 directory entries and NTFS MFT records out of
//! raw pages by validating their on-disk structure well enough to reject
//! the overwhelming majority of random bytes, without ever mounting or
//! otherwise interpreting a filesystem.
//!
//! Both formats are validated the same way: decode the fixed fields, run
//! a battery of hard reject rules, then count how many of the surviving
//! fields look "weird" (implausible for a real file — see
//! [`WindirsConfig`]) and reject the candidate once too many weird
//! signals pile up. None of the thresholds are exact rules a real
//! filesystem enforces; they're carving heuristics tuned to keep false
//! positives rare without also rejecting real, if unusual, files.

use crate::config::WindirsConfig;
use crate::dfxml::FileObjectBuilder;
use crate::error::Result;
use crate::page_buffer::PageBuffer;
use crate::scanner::{Scanner, ScannerFlags, ScannerInfo, ScannerParams};

const FAT_DENTRY_SIZE: usize = 32;
const SECTOR_SIZE: usize = 512;
const SLOTS_PER_SECTOR: usize = SECTOR_SIZE / FAT_DENTRY_SIZE;
const MFT_CANDIDATE_STRIDE: usize = 512;
const MFT_RECORD_SIZE: usize = 1024;
const MFT_MAGIC: u32 = 0x454c_4946; // "FILE" little-endian as u32
const MFT_MAGIC_BAAD: u32 = 0x4441_4142; // "BAAD" little-endian as u32

pub struct WindirsScanner {
    config: WindirsConfig,
}

impl WindirsScanner {
    #[must_use]
    pub fn new(config: WindirsConfig) -> Self {
        Self { config }
    }
}

impl Scanner for WindirsScanner {
    fn info(&self) -> ScannerInfo {
        ScannerInfo { name: "windirs", flags: ScannerFlags::empty(), feature_names: &["windirs"] }
    }

    fn scan(&self, params: &ScannerParams) -> Result<()> {
        let page = params.page;
        let recorder = params
            .recorders
            .named("windirs")
            .expect("windirs recorder registered at INIT");

        let mut sector_start = 0usize;
        while sector_start < page.pagesize() && sector_start + SECTOR_SIZE <= page.bufsize() {
            for (off, info) in scan_fat_sector(page, sector_start, &self.config) {
                if off < page.pagesize() {
                    recorder.write(&page.pos0().advance(off as u64), "fat32_dentry", &info)?;
                }
            }
            sector_start += SECTOR_SIZE;
        }

        let mut offset = 0usize;
        while offset < page.pagesize() && offset + MFT_RECORD_SIZE <= page.bufsize() {
            if let Some(info) = validate_mft_record(page, offset, &self.config) {
                recorder.write(&page.pos0().advance(offset as u64), "ntfs_mft", &info)?;
            }
            offset += MFT_CANDIDATE_STRIDE;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------
// FAT32 pass
// ---------------------------------------------------------------------

/// FAT short (8.3) directory entry, decoded in full.
struct FatDentry {
    name: [u8; 11],
    attrib: u8,
    ctimeten: u8,
    ctime: u16,
    cdate: u16,
    adate: u16,
    wtime: u16,
    wdate: u16,
    first_cluster: u32,
    file_size: u32,
}

fn read_fat_dentry(page: &PageBuffer, offset: usize) -> Option<FatDentry> {
    let name = page.get_slice(offset, 11).ok()?.try_into().ok()?;
    let attrib = page.get_u8(offset + 11).ok()?;
    let ctimeten = page.get_u8(offset + 13).ok()?;
    let ctime = page.get_u16_le(offset + 14).ok()?;
    let cdate = page.get_u16_le(offset + 16).ok()?;
    let adate = page.get_u16_le(offset + 18).ok()?;
    let cluster_hi = page.get_u16_le(offset + 20).ok()? as u32;
    let wtime = page.get_u16_le(offset + 22).ok()?;
    let wdate = page.get_u16_le(offset + 24).ok()?;
    let cluster_lo = page.get_u16_le(offset + 26).ok()? as u32;
    let file_size = page.get_u32_le(offset + 28).ok()?;
    Some(FatDentry {
        name,
        attrib,
        ctimeten,
        ctime,
        cdate,
        adate,
        wtime,
        wdate,
        first_cluster: (cluster_hi << 16) | cluster_lo,
        file_size,
    })
}

/// Known FAT attribute bits: READ_ONLY, HIDDEN, SYSTEM, VOLUME_ID,
/// DIRECTORY, ARCHIVE. A byte with bits set outside this mask can't be a
/// real attribute value.
const FAT_ATTRIB_MASK: u8 = 0b0011_1111;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_ARCHIVE: u8 = 0x20;
const ATTR_DEVICE: u8 = 0x40;
const ATTR_LFN: u8 = 0x0f;

/// One slot's outcome while walking the 16 slots of a 512-byte sector.
enum SlotOutcome {
    /// `ALL_NULL` / `VALID_LAST_DENTRY` / a malformed LFN entry — stop
    /// walking this sector's remaining slots.
    EndSector,
    /// A recognized-but-uninteresting slot (valid LFN continuation) — keep
    /// walking, contributes nothing to the valid-entry count.
    Skip,
    /// A short dentry that passed every reject rule and the weird-count
    /// budget, along with whether its dates look like an ordinary
    /// (non-suspicious) timestamp.
    Valid { plausible_year: bool, info: String },
    /// A short dentry that failed validation — keep walking.
    Rejected,
}

/// Scans one 512-byte sector's 16 dentry slots and returns the
/// `(page_offset, dfxml_context)` pairs worth emitting, applying the
/// sector-level anti-false-positive suppression: a sector with exactly
/// one valid entry and no plausible-looking year is presumed to be noise.
fn scan_fat_sector(page: &PageBuffer, sector_start: usize, config: &WindirsConfig) -> Vec<(usize, String)> {
    let mut valid = Vec::new();

    for slot in 0..SLOTS_PER_SECTOR {
        let off = sector_start + slot * FAT_DENTRY_SIZE;
        match scan_fat_slot(page, off, config) {
            SlotOutcome::EndSector => break,
            SlotOutcome::Skip | SlotOutcome::Rejected => continue,
            SlotOutcome::Valid { plausible_year, info } => valid.push((off, plausible_year, info)),
        }
    }

    if valid.len() == 1 && !valid[0].1 {
        return Vec::new(); // lone entry, no plausible year: likely noise
    }
    valid.into_iter().map(|(off, _, info)| (off, info)).collect()
}

fn scan_fat_slot(page: &PageBuffer, off: usize, config: &WindirsConfig) -> SlotOutcome {
    if page.is_constant(off, FAT_DENTRY_SIZE) {
        return SlotOutcome::EndSector; // ALL_NULL
    }

    let Some(first_byte) = page.get_u8(off).ok() else { return SlotOutcome::EndSector };
    if first_byte == 0x00 {
        return SlotOutcome::EndSector; // VALID_LAST_DENTRY
    }

    let Some(attrib) = page.get_u8(off + 11).ok() else { return SlotOutcome::EndSector };
    if attrib == ATTR_LFN {
        let Some(seq) = page.get_u8(off).ok() else { return SlotOutcome::EndSector };
        let Some(reserved1) = page.get_u8(off + 12).ok() else { return SlotOutcome::EndSector };
        let Some(fst_clus_lo) = page.get_u16_le(off + 26).ok() else { return SlotOutcome::EndSector };
        let lfn_valid = seq <= 10 + 0x40 && reserved1 == 0 && fst_clus_lo == 0;
        return if lfn_valid { SlotOutcome::Skip } else { SlotOutcome::EndSector };
    }

    match validate_short_dentry(page, off, config) {
        Some((plausible_year, info)) => SlotOutcome::Valid { plausible_year, info },
        None => SlotOutcome::Rejected,
    }
}

fn validate_short_dentry(page: &PageBuffer, offset: usize, config: &WindirsConfig) -> Option<(bool, String)> {
    let d = read_fat_dentry(page, offset)?;

    if d.name[0] == 0xe5 {
        return None; // deleted slot, not a carving candidate
    }
    if !is_valid_short_name(&d.name) {
        return None;
    }
    if d.attrib & !FAT_ATTRIB_MASK != 0 {
        return None; // reserved attribute bit outside the defined mask
    }
    if d.attrib & ATTR_LFN == ATTR_LFN && d.attrib != ATTR_LFN {
        return None; // LFN + non-LFN attributes coexist
    }
    if d.attrib & ATTR_DIRECTORY != 0 && d.attrib & ATTR_ARCHIVE != 0 {
        return None; // DIRECTORY and ARCHIVE both set
    }
    if d.attrib & ATTR_DEVICE != 0 {
        return None;
    }
    if d.ctimeten > 199 {
        return None;
    }
    if !is_valid_fat_time(d.ctime) || !is_valid_fat_time(d.wtime) {
        return None;
    }
    if !is_valid_fat_date(d.cdate) || !is_valid_fat_date(d.adate) || !is_valid_fat_date(d.wdate) {
        return None;
    }
    if d.ctime == d.cdate || d.wtime == d.wdate || d.adate == d.ctime || d.adate == d.wtime {
        return None; // equal raw time/date fields: forged-looking
    }
    if d.cdate == 0 && d.wdate == 0 && d.adate == 0 && d.attrib & ATTR_VOLUME_ID == 0 {
        return None; // zero dates without the volume attribute
    }

    let (cyear, _, _) = fat_date_parts(d.cdate);
    let (ayear, _, _) = fat_date_parts(d.adate);

    let mut weird = 0u32;
    if cyear > config.opt_last_year {
        weird += 1;
    }
    if ayear > config.opt_last_year {
        weird += 1;
    }
    if d.file_size > config.opt_weird_file_size {
        weird += 1;
    }
    if d.file_size > config.opt_weird_file_size2 {
        weird += 1;
    }
    if d.attrib.count_ones() > config.opt_max_bits_in_attrib {
        weird += 1;
    }
    if d.first_cluster > config.opt_weird_cluster_count {
        weird += 1;
    }
    if d.first_cluster > config.opt_weird_cluster_count2 {
        weird += 1;
    }
    if d.ctimeten != 0 && d.ctimeten != 100 {
        weird += 1;
    }
    if d.adate == 0 && d.cdate == 0 {
        weird += 1;
    }
    if d.adate == 0 && d.wdate == 0 {
        weird += 1;
    }
    if weird > config.opt_max_weird_count {
        return None;
    }

    let plausible_year = is_plausible_year(cyear, config.opt_last_year) || is_plausible_year(ayear, config.opt_last_year);
    Some((plausible_year, format_fat_fileobject(&d)))
}

/// An "unremarkable" year for a real file to carry — not the degenerate
/// epoch value and not up against the far-future weird-count threshold.
fn is_plausible_year(year: u32, last_year: u32) -> bool {
    year >= 1996 && year + 5 <= last_year
}

fn format_fat_fileobject(d: &FatDentry) -> String {
    let (cyear, cmonth, cday) = fat_date_parts(d.cdate);
    let (wyear, wmonth, wday) = fat_date_parts(d.wdate);
    let (ayear, amonth, aday) = fat_date_parts(d.adate);
    let (chour, cminute, csecond) = fat_time_parts(d.ctime);
    let (whour, wminute, wsecond) = fat_time_parts(d.wtime);

    FileObjectBuilder::new()
        .field("filename", fat_short_name_to_string(&d.name))
        .field("src", "fat")
        .field("ctimeten", d.ctimeten)
        .field("ctime", format!("{cyear:04}-{cmonth:02}-{cday:02}T{chour:02}:{cminute:02}:{csecond:02}"))
        .field("atime", format!("{ayear:04}-{amonth:02}-{aday:02}"))
        .field("mtime", format!("{wyear:04}-{wmonth:02}-{wday:02}T{whour:02}:{wminute:02}:{wsecond:02}"))
        .field("startcluster", d.first_cluster)
        .field("filesize", d.file_size)
        .field("attrib", format!("0x{:02x}", d.attrib))
        .build()
}

fn fat_short_name_to_string(name: &[u8; 11]) -> String {
    if name == b".          " {
        return ".".to_string();
    }
    if name == b"..         " {
        return "..".to_string();
    }
    let base = String::from_utf8_lossy(&name[0..8]).trim_end().to_string();
    let ext = String::from_utf8_lossy(&name[8..11]).trim_end().to_string();
    if ext.is_empty() {
        base
    } else {
        format!("{base}.{ext}")
    }
}

/// Short 8.3 name whitelist: uppercase letters, digits, space (padding)
/// and the documented punctuation set — or the special `.`/`..` entries.
fn is_valid_short_name(name: &[u8; 11]) -> bool {
    if name == b".          " || name == b"..         " {
        return true;
    }
    name.iter().all(|&b| is_fat_name_byte(b))
}

fn is_fat_name_byte(b: u8) -> bool {
    b.is_ascii_uppercase()
        || b.is_ascii_digit()
        || matches!(
            b,
            b' ' | b'!'
                | b'#'
                | b'$'
                | b'%'
                | b'&'
                | b'\''
                | b'('
                | b')'
                | b'-'
                | b'@'
                | b'^'
                | b'_'
                | b'`'
                | b'{'
                | b'}'
                | b'~'
        )
}

fn fat_date_parts(date: u16) -> (u32, u32, u32) {
    let year = 1980 + ((date >> 9) & 0x7f) as u32;
    let month = ((date >> 5) & 0x0f) as u32;
    let day = (date & 0x1f) as u32;
    (year, month, day)
}

fn fat_time_parts(time: u16) -> (u32, u32, u32) {
    let hour = ((time >> 11) & 0x1f) as u32;
    let minute = ((time >> 5) & 0x3f) as u32;
    let second = ((time & 0x1f) as u32) * 2;
    (hour, minute, second)
}

fn is_valid_fat_time(time: u16) -> bool {
    let hour = (time >> 11) & 0x1f;
    let minute = (time >> 5) & 0x3f;
    let sec2 = time & 0x1f;
    hour <= 23 && minute <= 59 && sec2 <= 29
}

fn is_valid_fat_date(date: u16) -> bool {
    let month = (date >> 5) & 0x0f;
    let day = date & 0x1f;
    (1..=12).contains(&month) && (1..=31).contains(&day)
}

// ---------------------------------------------------------------------
// NTFS MFT pass
// ---------------------------------------------------------------------

/// MFT attribute type codes this scanner looks for while walking a
/// record's attribute chain.
const ATTR_STANDARD_INFORMATION: u32 = 0x10;
const ATTR_ATTRIBUTE_LIST: u32 = 0x20;
const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_OBJECT_ID: u32 = 0x40;
const ATTR_END: u32 = 0xffff_ffff;
const MAX_PLAUSIBLE_FILE_BYTES: u64 = 1_000_000_000_000_000; // 10^15

fn validate_mft_record(page: &PageBuffer, offset: usize, _config: &WindirsConfig) -> Option<String> {
    let magic = page.get_u32_le(offset).ok()?;
    if magic != MFT_MAGIC && magic != MFT_MAGIC_BAAD {
        return None;
    }
    if magic == MFT_MAGIC_BAAD {
        return Some("magic=BAAD (marked bad by filesystem)".to_string());
    }

    let hard_link_count = page.get_u16_le(offset + 18).ok()?;
    if hard_link_count >= 10 {
        return None;
    }

    let attrs_offset = page.get_u16_le(offset + 20).ok()? as usize;
    if attrs_offset < 24 || attrs_offset >= MFT_RECORD_SIZE {
        return None;
    }

    let mut cursor = attrs_offset;
    let mut seen = Vec::new();
    let mut file_name = None;
    let mut std_info = None;
    let mut object_id_guids: Vec<String> = Vec::new();

    for _ in 0..64 {
        if cursor + 24 > MFT_RECORD_SIZE {
            break;
        }
        let attr_type = page.get_u32_le(offset + cursor).ok()?;
        if attr_type == ATTR_END {
            break;
        }
        let attr_len = page.get_u32_le(offset + cursor + 4).ok()? as usize;
        if attr_len == 0 {
            return None; // zero-length attribute: abort the whole record
        }
        if cursor + attr_len > MFT_RECORD_SIZE {
            return None; // overrun
        }
        let resident = page.get_u8(offset + cursor + 8).ok()?;

        if resident == 0 {
            match attr_type {
                ATTR_STANDARD_INFORMATION => {
                    seen.push("STANDARD_INFORMATION");
                    let content_offset = page.get_u16_le(offset + cursor + 20).ok()? as usize;
                    std_info = read_standard_information(page, offset + cursor + content_offset);
                }
                ATTR_FILE_NAME => {
                    seen.push("FILE_NAME");
                    let content_offset = page.get_u16_le(offset + cursor + 20).ok()? as usize;
                    file_name = read_file_name(page, offset + cursor + content_offset)?;
                }
                ATTR_OBJECT_ID => {
                    seen.push("OBJECT_ID");
                    let content_offset = page.get_u16_le(offset + cursor + 20).ok()? as usize;
                    let content_len = attr_len.saturating_sub(content_offset);
                    object_id_guids = read_object_id_guids(page, offset + cursor + content_offset, content_len);
                }
                ATTR_ATTRIBUTE_LIST => seen.push("ATTRIBUTE_LIST"),
                _ => {}
            }
        }

        cursor += attr_len;
    }

    if seen.is_empty() {
        return None;
    }

    let mut builder = FileObjectBuilder::new()
        .field("filename", file_name.as_ref().map(|f| f.name.clone()).unwrap_or_else(|| "$NOFILENAME".to_string()))
        .field("src", "mft")
        .field("attrs", seen.join(","));

    if let Some(si) = &std_info {
        builder = builder
            .field("crtime_si", si.crtime)
            .field("mtime_si", si.mtime)
            .field("ctime_si", si.ctime)
            .field("atime_si", si.atime);
    }
    if let Some(fname) = &file_name {
        builder = builder
            .field("parent_mft_ref", fname.parent_ref)
            .field("parent_seq", fname.parent_seq)
            .field("crtime_fn", fname.crtime)
            .field("mtime_fn", fname.mtime)
            .field("ctime_fn", fname.ctime)
            .field("atime_fn", fname.atime)
            .field("filesize_alloc", fname.filesize_alloc)
            .field("filesize", fname.filesize)
            .field("fn_attrib", format!("0x{:08x}", fname.attributes));
    }
    if !object_id_guids.is_empty() {
        builder = builder.field("object_ids", object_id_guids.join(","));
    }

    Some(builder.build())
}

struct StandardInformation {
    crtime: i64,
    mtime: i64,
    ctime: i64,
    atime: i64,
}

fn read_standard_information(page: &PageBuffer, content_offset: usize) -> Option<StandardInformation> {
    let crtime = filetime_to_unix(page.get_u64_le(content_offset).ok()?);
    let mtime = filetime_to_unix(page.get_u64_le(content_offset + 8).ok()?);
    let ctime = filetime_to_unix(page.get_u64_le(content_offset + 16).ok()?);
    let atime = filetime_to_unix(page.get_u64_le(content_offset + 24).ok()?);
    Some(StandardInformation { crtime, mtime, ctime, atime })
}

struct FileNameAttr {
    name: String,
    parent_ref: u64,
    parent_seq: u16,
    crtime: i64,
    mtime: i64,
    ctime: i64,
    atime: i64,
    filesize_alloc: u64,
    filesize: u64,
    attributes: u32,
}

fn read_file_name(page: &PageBuffer, content_offset: usize) -> Option<Option<FileNameAttr>> {
    let parent_ref = page.get_u48_le(content_offset).ok()?;
    let parent_seq = page.get_u16_le(content_offset + 6).ok()?;

    let crtime = filetime_to_unix(page.get_u64_le(content_offset + 8).ok()?);
    let mtime = filetime_to_unix(page.get_u64_le(content_offset + 16).ok()?);
    let ctime = filetime_to_unix(page.get_u64_le(content_offset + 24).ok()?);
    let atime = filetime_to_unix(page.get_u64_le(content_offset + 32).ok()?);

    let filesize_alloc = page.get_u64_le(content_offset + 40).ok()?;
    let filesize = page.get_u64_le(content_offset + 48).ok()?;
    if filesize_alloc > MAX_PLAUSIBLE_FILE_BYTES || filesize > MAX_PLAUSIBLE_FILE_BYTES {
        return Some(None); // implausible sizes: attribute rejected, record continues
    }
    let attributes = page.get_u32_le(content_offset + 56).ok()?;

    let name_len_chars = page.get_u8(content_offset + 64).ok()? as usize;
    let name_start = content_offset + 66;
    let raw = page.get_slice(name_start, name_len_chars * 2).ok()?;
    let name = utf16le_lossy(raw);

    Some(Some(FileNameAttr { name, parent_ref, parent_seq, crtime, mtime, ctime, atime, filesize_alloc, filesize, attributes }))
}

/// Up to four GUIDs (object, birth-volume, birth-object, domain), each
/// only present if `content_len` is long enough to hold it.
fn read_object_id_guids(page: &PageBuffer, content_offset: usize, content_len: usize) -> Vec<String> {
    let mut guids = Vec::new();
    for i in 0..4 {
        let start = i * 16;
        if start + 16 > content_len {
            break;
        }
        let Ok(bytes) = page.get_slice(content_offset + start, 16) else { break };
        guids.push(format_guid(bytes));
    }
    guids
}

/// Canonical mixed-endian Microsoft GUID formatting: the first three
/// fields are little-endian, the trailing 8-byte field is taken byte by
/// byte in on-disk order.
fn format_guid(b: &[u8]) -> String {
    let d1 = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
    let d2 = u16::from_le_bytes([b[4], b[5]]);
    let d3 = u16::from_le_bytes([b[6], b[7]]);
    format!(
        "{d1:08x}-{d2:04x}-{d3:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
    )
}

/// Windows FILETIME (100ns ticks since 1601-01-01) to Unix seconds.
fn filetime_to_unix(filetime: u64) -> i64 {
    const TICKS_PER_SECOND: u64 = 10_000_000;
    const EPOCH_DIFF_SECONDS: i64 = 11_644_473_600;
    (filetime / TICKS_PER_SECOND) as i64 - EPOCH_DIFF_SECONDS
}

fn utf16le_lossy(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
    String::from_utf16_lossy(&units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureRecorderSet;
    use crate::pos0::Pos0;

    fn make_fat_dentry(name: &[u8; 11], attrib: u8, cdate: u16, wdate: u16, adate: u16, size: u32, cluster: u32) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[0..11].copy_from_slice(name);
        buf[11] = attrib;
        buf[13] = 0; // ctimeten
        buf[14..16].copy_from_slice(&0x0021u16.to_le_bytes()); // ctime: 00:01:02
        buf[16..18].copy_from_slice(&cdate.to_le_bytes());
        buf[18..20].copy_from_slice(&adate.to_le_bytes());
        buf[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
        buf[22..24].copy_from_slice(&0x0421u16.to_le_bytes()); // wtime: different from ctime
        buf[24..26].copy_from_slice(&wdate.to_le_bytes());
        buf[26..28].copy_from_slice(&((cluster & 0xffff) as u16).to_le_bytes());
        buf[28..32].copy_from_slice(&size.to_le_bytes());
        buf
    }

    fn plausible_date() -> u16 {
        // 2015-06-15: year offset 35, month 6, day 15
        ((35u16) << 9) | (6 << 5) | 15
    }

    fn fill_sector(entries: &[[u8; 32]]) -> Vec<u8> {
        let mut sector = vec![0u8; SECTOR_SIZE];
        for (i, e) in entries.iter().enumerate() {
            sector[i * FAT_DENTRY_SIZE..(i + 1) * FAT_DENTRY_SIZE].copy_from_slice(e);
        }
        sector
    }

    #[test]
    fn two_plausible_entries_in_a_sector_both_emit() {
        let date = plausible_date();
        let e1 = make_fat_dentry(b"FOO     TXT", 0x20, date, date, date, 1024, 5);
        let e2 = make_fat_dentry(b"BAR     TXT", 0x20, date, date, date, 2048, 6);
        let sector = fill_sector(&[e1, e2]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        let emitted = scan_fat_sector(&page, 0, &config);
        assert_eq!(emitted.len(), 2);
        assert!(emitted[0].1.contains("FOO.TXT"));
    }

    #[test]
    fn lone_entry_without_plausible_year_is_suppressed() {
        // year 1980 (offset 0), month 2 day 1 — outside the plausible window
        // (>=1996) and distinct from the fixed ctime/wtime fixture values so
        // this exercises the plausible-year suppression, not a forged-equal-field reject.
        let epoch_date = (2u16 << 5) | 1;
        let e1 = make_fat_dentry(b"FOO     TXT", 0x20, epoch_date, epoch_date, epoch_date, 1024, 5);
        let sector = fill_sector(&[e1]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_short_dentry(&page, 0, &config).is_some(), "entry should pass validation on its own");
        assert!(scan_fat_sector(&page, 0, &config).is_empty());
    }

    #[test]
    fn lone_entry_with_plausible_year_is_kept() {
        let date = plausible_date();
        let e1 = make_fat_dentry(b"FOO     TXT", 0x20, date, date, date, 1024, 5);
        let sector = fill_sector(&[e1]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert_eq!(scan_fat_sector(&page, 0, &config).len(), 1);
    }

    #[test]
    fn lowercase_name_byte_is_rejected() {
        let date = plausible_date();
        let e1 = make_fat_dentry(b"foo     TXT", 0x20, date, date, date, 1024, 5);
        let sector = fill_sector(&[e1]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_short_dentry(&page, 0, &config).is_none());
    }

    #[test]
    fn directory_and_archive_both_set_is_rejected() {
        let date = plausible_date();
        let e1 = make_fat_dentry(b"FOO     TXT", ATTR_DIRECTORY | ATTR_ARCHIVE, date, date, date, 0, 5);
        let sector = fill_sector(&[e1]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_short_dentry(&page, 0, &config).is_none());
    }

    #[test]
    fn equal_ctime_and_cdate_is_forged_looking() {
        let same = 0x4321u16;
        let mut buf = make_fat_dentry(b"FOO     TXT", 0x20, same, same, same, 1024, 5);
        buf[14..16].copy_from_slice(&same.to_le_bytes()); // force ctime == cdate
        let sector = fill_sector(&[buf]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_short_dentry(&page, 0, &config).is_none());
    }

    #[test]
    fn weirdness_cutoff_rejects_combined_signals() {
        // cluster over both thresholds, size over both thresholds, ctimeten
        // not in {0,100}: five weird signals, well over the default budget of 2.
        let date = plausible_date();
        let mut buf = make_fat_dentry(b"BIG     BIN", 0x20, date, date, date, u32::MAX, u32::MAX);
        buf[13] = 50; // ctimeten
        let sector = fill_sector(&[buf]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector, SECTOR_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_short_dentry(&page, 0, &config).is_none());
    }

    #[test]
    fn bad_magic_mft_record_is_rejected() {
        let data = vec![0u8; MFT_RECORD_SIZE];
        let page = PageBuffer::from_owned(Pos0::new(0), data, MFT_RECORD_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_mft_record(&page, 0, &config).is_none());
    }

    #[test]
    fn baad_magic_is_reported() {
        let mut data = vec![0u8; MFT_RECORD_SIZE];
        data[0..4].copy_from_slice(&MFT_MAGIC_BAAD.to_le_bytes());
        let page = PageBuffer::from_owned(Pos0::new(0), data, MFT_RECORD_SIZE);
        let config = WindirsConfig::default();
        let info = validate_mft_record(&page, 0, &config).unwrap();
        assert!(info.contains("BAAD"));
    }

    #[test]
    fn high_hard_link_count_is_rejected() {
        let mut data = vec![0u8; MFT_RECORD_SIZE];
        data[0..4].copy_from_slice(&MFT_MAGIC.to_le_bytes());
        data[18..20].copy_from_slice(&20u16.to_le_bytes()); // nlink = 20, >= 10
        data[20..22].copy_from_slice(&56u16.to_le_bytes());
        data[56..60].copy_from_slice(&ATTR_END.to_le_bytes());
        let page = PageBuffer::from_owned(Pos0::new(0), data, MFT_RECORD_SIZE);
        let config = WindirsConfig::default();
        assert!(validate_mft_record(&page, 0, &config).is_none());
    }

    #[test]
    fn guid_formats_in_mixed_endian_canonical_form() {
        let bytes: [u8; 16] = [
            0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f, 0x10,
        ];
        assert_eq!(format_guid(&bytes), "04030201-0605-0807-090a-0b0c0d0e0f10");
    }

    #[test]
    fn scanner_writes_feature_for_valid_page() {
        let date = plausible_date();
        let e1 = make_fat_dentry(b"FOO     TXT", 0x20, date, date, date, 1024, 5);
        let e2 = make_fat_dentry(b"BAR     TXT", 0x20, date, date, date, 2048, 6);
        let sector = fill_sector(&[e1, e2]);
        let page = PageBuffer::from_owned(Pos0::new(0), sector.clone(), SECTOR_SIZE);

        let dir = tempfile::tempdir().unwrap();
        let recorders = FeatureRecorderSet::create(dir.path(), &["windirs"]).unwrap();
        let config = crate::config::PipelineConfig::default();
        let scanner = WindirsScanner::new(WindirsConfig::default());
        let params = ScannerParams { page: &page, recorders: &recorders, config: &config };
        scanner.scan(&params).unwrap();
        recorders.flush_all().unwrap();

        let contents = std::fs::read_to_string(dir.path().join("windirs.txt")).unwrap();
        assert!(contents.contains("fat32_dentry"));
    }
}
