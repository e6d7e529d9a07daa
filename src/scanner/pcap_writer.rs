//! `pcap_writer`: carves plausible IPv4 datagrams out of a page and
//! synthesizes them into a single libpcap capture file, wrapped in a
//! fabricated Ethernet header so the result opens directly in any packet
//! analyzer. Unlike the text/file feature recorders, this scanner owns one
//! binary output file shared across every worker thread scanning pages
//! concurrently — hence the lazily-opened, mutex-guarded handle below
//! instead of a `FeatureRecorder`.

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::scanner::{Scanner, ScannerFlags, ScannerInfo, ScannerParams};

const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const LINKTYPE_ETHERNET: u32 = 1;
/// Both the global header's `snaplen` and the ceiling a synthesized frame's
/// `cap_len + 14` must stay under before a synthetic Ethernet header is
/// added — past that, the record is written as captured, unsynthesized.
const PCAP_MAX_PKT_LEN: u32 = 65535;

/// What to prepend to a carved packet before it's written, and whether it's
/// allowed to fire this time.
struct FrameSynthesis {
    ethertype: u16,
}

pub struct PcapWriterScanner {
    out_path: PathBuf,
    file: Mutex<Option<File>>,
}

impl PcapWriterScanner {
    #[must_use]
    pub fn new(out_path: PathBuf) -> Self {
        Self { out_path, file: Mutex::new(None) }
    }

    /// Opens the output file and writes the global header exactly once,
    /// no matter how many worker threads race to call this first.
    fn ensure_open<'a>(&self, guard: &'a mut Option<File>) -> Result<&'a mut File> {
        if guard.is_none() {
            let mut f = File::create(&self.out_path)
                .map_err(|e| Error::ReadError(format!("{}: {e}", self.out_path.display())))?;
            f.write_u32::<LittleEndian>(PCAP_MAGIC).map_err(io_err)?;
            f.write_u16::<LittleEndian>(2).map_err(io_err)?;
            f.write_u16::<LittleEndian>(4).map_err(io_err)?;
            f.write_i32::<LittleEndian>(0).map_err(io_err)?;
            f.write_u32::<LittleEndian>(0).map_err(io_err)?;
            f.write_u32::<LittleEndian>(PCAP_MAX_PKT_LEN).map_err(io_err)?;
            f.write_u32::<LittleEndian>(LINKTYPE_ETHERNET).map_err(io_err)?;
            *guard = Some(f);
        }
        Ok(guard.as_mut().expect("just opened"))
    }

    /// Writes one packet record. `cap_len`/`pkt_len` are the captured and
    /// original lengths of the raw packet itself, before any synthesis;
    /// `synth` requests a 14-byte Ethernet header be prepended, which only
    /// happens if `cap_len + 14` still fits under `PCAP_MAX_PKT_LEN` —
    /// otherwise the record is written exactly as captured.
    #[allow(clippy::too_many_arguments)]
    fn write_packet(
        &self,
        seconds: u32,
        useconds: u32,
        cap_len: u32,
        pkt_len: u32,
        payload: &[u8],
        synth: Option<FrameSynthesis>,
    ) -> Result<()> {
        let mut guard = self.file.lock().expect("pcap writer mutex poisoned");
        let f = self.ensure_open(&mut guard)?;

        let synth = synth.filter(|_| cap_len + 14 <= PCAP_MAX_PKT_LEN);
        let header_len: u32 = if synth.is_some() { 14 } else { 0 };

        f.write_u32::<LittleEndian>(seconds).map_err(io_err)?;
        f.write_u32::<LittleEndian>(useconds).map_err(io_err)?;
        f.write_u32::<LittleEndian>(cap_len + header_len).map_err(io_err)?;
        f.write_u32::<LittleEndian>(pkt_len + header_len).map_err(io_err)?;

        if let Some(synth) = synth {
            f.write_all(&[0u8; 6]).map_err(io_err)?; // synthetic destination MAC
            f.write_all(&[0u8; 6]).map_err(io_err)?; // synthetic source MAC
            f.write_u16::<byteorder::BigEndian>(synth.ethertype).map_err(io_err)?;
        }
        f.write_all(payload).map_err(io_err)?;
        Ok(())
    }
}

fn io_err(e: std::io::Error) -> Error {
    Error::ReadError(e.to_string())
}

impl Scanner for PcapWriterScanner {
    fn info(&self) -> ScannerInfo {
        ScannerInfo { name: "pcap_writer", flags: ScannerFlags::empty(), feature_names: &["pcap_writer"] }
    }

    fn scan(&self, params: &ScannerParams) -> Result<()> {
        let page = params.page;
        let recorder = params.recorders.named("pcap_writer").expect("pcap_writer recorder registered at INIT");

        let mut pos = 0usize;
        while let Some(idx) = page.find(&[0x45], pos) {
            if idx >= page.pagesize() {
                break;
            }
            if let Some(len) = ipv4_datagram_len(page, idx) {
                let available = page.bufsize() - idx;
                let take = len.min(available);
                if let Ok(bytes) = page.get_slice(idx, take) {
                    self.write_packet(
                        0,
                        0,
                        take as u32,
                        len as u32,
                        bytes,
                        Some(FrameSynthesis { ethertype: 0x0800 }),
                    )?;
                    recorder.write(&page.pos0().advance(idx as u64), "ipv4_datagram", &format!("len={take}"))?;
                }
            }
            pos = idx + 1;
        }
        Ok(())
    }
}

/// A byte `0x45` at `offset` reads as an IPv4 header (version 4, a 5-word
/// minimum header) with a plausible total-length field.
fn ipv4_datagram_len(page: &crate::page_buffer::PageBuffer, offset: usize) -> Option<usize> {
    let first = page.get_u8(offset).ok()?;
    if first >> 4 != 4 || (first & 0x0f) < 5 {
        return None;
    }
    let total_len = page.get_u16_be(offset + 2).ok()? as usize;
    if total_len < 20 || total_len > 65535 {
        return None;
    }
    Some(total_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureRecorderSet;
    use crate::page_buffer::PageBuffer;
    use crate::pos0::Pos0;

    fn fake_ipv4_datagram(total_len: u16) -> Vec<u8> {
        let mut v = vec![0u8; total_len as usize];
        v[0] = 0x45;
        v[2..4].copy_from_slice(&total_len.to_be_bytes());
        v
    }

    #[test]
    fn ipv4_candidate_is_recognized_by_version_and_length() {
        let data = fake_ipv4_datagram(40);
        let page = PageBuffer::from_owned(Pos0::new(0), data, 40);
        assert_eq!(ipv4_datagram_len(&page, 0), Some(40));
    }

    #[test]
    fn non_ipv4_byte_is_rejected() {
        let data = vec![0x55u8; 40];
        let page = PageBuffer::from_owned(Pos0::new(0), data, 40);
        assert_eq!(ipv4_datagram_len(&page, 0), None);
    }

    #[test]
    fn scan_writes_global_header_and_one_packet() {
        let data = fake_ipv4_datagram(30);
        let page = PageBuffer::from_owned(Pos0::new(100), data, 30);

        let dir = tempfile::tempdir().unwrap();
        let recorders = FeatureRecorderSet::create(dir.path(), &["pcap_writer"]).unwrap();
        let config = crate::config::PipelineConfig::default();
        let pcap_path = dir.path().join("carved.pcap");
        let scanner = PcapWriterScanner::new(pcap_path.clone());

        let params = ScannerParams { page: &page, recorders: &recorders, config: &config };
        scanner.scan(&params).unwrap();

        let bytes = std::fs::read(&pcap_path).unwrap();
        assert!(bytes.len() >= 24 + 16 + 14 + 30);
        assert_eq!(&bytes[0..4], &PCAP_MAGIC.to_le_bytes());
    }

    #[test]
    fn single_packet_synthesis_is_exactly_114_bytes_with_ethertype_at_38() {
        let data = fake_ipv4_datagram(60);
        let page = PageBuffer::from_owned(Pos0::new(100), data, 60);

        let dir = tempfile::tempdir().unwrap();
        let recorders = FeatureRecorderSet::create(dir.path(), &["pcap_writer"]).unwrap();
        let config = crate::config::PipelineConfig::default();
        let pcap_path = dir.path().join("carved.pcap");
        let scanner = PcapWriterScanner::new(pcap_path.clone());

        let params = ScannerParams { page: &page, recorders: &recorders, config: &config };
        scanner.scan(&params).unwrap();

        let bytes = std::fs::read(&pcap_path).unwrap();
        assert_eq!(bytes.len(), 24 + 16 + 14 + 60);
        assert_eq!(bytes[38], 0x08);
    }

    #[test]
    fn synthesis_is_skipped_when_it_would_overflow_max_packet_length() {
        let dir = tempfile::tempdir().unwrap();
        let recorders = FeatureRecorderSet::create(dir.path(), &["pcap_writer"]).unwrap();
        let pcap_path = dir.path().join("carved.pcap");
        let scanner = PcapWriterScanner::new(pcap_path.clone());
        let _ = &recorders;

        let payload = vec![0x42u8; 40];
        scanner
            .write_packet(0, 0, PCAP_MAX_PKT_LEN, PCAP_MAX_PKT_LEN, &payload, Some(FrameSynthesis { ethertype: 0x0800 }))
            .unwrap();

        let bytes = std::fs::read(&pcap_path).unwrap();
        // global header (24) + record header (16) + payload only, no synthetic 14
        assert_eq!(bytes.len(), 24 + 16 + payload.len());
        let incl_len = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
        assert_eq!(incl_len, PCAP_MAX_PKT_LEN);
    }
}
