//! The scanner contract: what a scanner is handed per page, and the three
//! lifecycle phases every scanner runs through over the life of a scan.

pub mod pcap_writer;
pub mod registry;
pub mod text_match;
pub mod windirs;

use bitflags::bitflags;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::feature::FeatureRecorderSet;
use crate::page_buffer::PageBuffer;

bitflags! {
    /// Scheduling hints a scanner declares about itself.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ScannerFlags: u32 {
        /// Only meaningful on the first page of a source (depth 0) — e.g.
        /// a scanner that looks at a filesystem superblock.
        const DEPTH0_ONLY = 1 << 0;
        /// Wants to see pages even when they come from a filesystem-backed
        /// `Directory` source rather than raw disk bytes.
        const WANTS_FILESYSTEMS = 1 << 1;
    }
}

/// Lifecycle phase, mirrored onto every scanner in lockstep by the
/// dispatcher: all scanners INIT before any SCAN runs, all scanners
/// SHUTDOWN only after every page has been SCANned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Scan,
    Shutdown,
}

#[derive(Debug, Clone, Copy)]
pub struct ScannerInfo {
    pub name: &'static str,
    pub flags: ScannerFlags,
    pub feature_names: &'static [&'static str],
}

/// Everything a scanner needs to process one page.
pub struct ScannerParams<'a> {
    pub page: &'a PageBuffer,
    pub recorders: &'a FeatureRecorderSet,
    pub config: &'a PipelineConfig,
}

/// A single-purpose artifact detector. Scanners never touch each other's
/// state and never see more than one page at a time — any cross-page logic
/// (the `pcap_writer` singleton file handle, `text_match`'s jump-forward
/// cursor) lives inside the scanner's own interior-mutable state.
pub trait Scanner: Send + Sync {
    fn info(&self) -> ScannerInfo;

    /// Runs once, before any page is scanned. Default: nothing to do.
    fn init(&self, _recorders: &FeatureRecorderSet) -> Result<()> {
        Ok(())
    }

    /// Runs once per page, serially within a worker thread (each worker
    /// thread's pages run every scanner's `scan` before moving to the next
    /// page). Must be safe to call concurrently from multiple threads on
    /// different pages.
    fn scan(&self, params: &ScannerParams) -> Result<()>;

    /// Runs once, after every page has been scanned. Default: nothing to do.
    fn shutdown(&self, _recorders: &FeatureRecorderSet) -> Result<()> {
        Ok(())
    }
}
