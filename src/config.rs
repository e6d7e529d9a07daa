//! Process-wide configuration, built once from the CLI and threaded through
//! the pipeline by value/reference — no global mutable statics anywhere
//! (the teacher's eight windirs tuning constants are exactly this kind of
//! thing and are here reshaped into an immutable value).

use chrono::Datelike;

/// Bytes per page the iterator hands to scanners (excludes margin).
pub const DEFAULT_PAGESIZE: usize = 16 * 1024 * 1024;

/// Overlap carried into the next page so boundary-straddling artifacts are
/// still visible to whichever page contains their start offset.
pub const DEFAULT_MARGIN: usize = 4096 + 16;

/// The eight windirs tuning knobs from the external configuration surface,
/// collected into one immutable value built at scanner INIT instead of
/// living as process-wide mutable statics.
#[derive(Debug, Clone, Copy)]
pub struct WindirsConfig {
    pub opt_weird_file_size: u32,
    pub opt_weird_file_size2: u32,
    pub opt_weird_cluster_count: u32,
    pub opt_weird_cluster_count2: u32,
    pub opt_max_bits_in_attrib: u32,
    pub opt_max_weird_count: u32,
    pub opt_last_year: u32,
}

impl Default for WindirsConfig {
    fn default() -> Self {
        let current_year = chrono::Utc::now().year() as u32;
        Self {
            opt_weird_file_size: 150 * 1024 * 1024,
            opt_weird_file_size2: 512 * 1024 * 1024,
            opt_weird_cluster_count: 32 * (1 << 21),
            opt_weird_cluster_count2: 128 * (1 << 21),
            opt_max_bits_in_attrib: 3,
            opt_max_weird_count: 2,
            opt_last_year: current_year + 5,
        }
    }
}

/// Top-level run configuration: I/O shape, worker count, output location
/// and the scanner-specific knobs above.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub recurse: bool,
    pub jobs: usize,
    pub pagesize: usize,
    pub margin: usize,
    pub out_dir: std::path::PathBuf,
    pub windirs: WindirsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recurse: false,
            jobs: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            pagesize: DEFAULT_PAGESIZE,
            margin: DEFAULT_MARGIN,
            out_dir: std::path::PathBuf::from("sectorscan-out"),
            windirs: WindirsConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windirs_default_last_year_is_ahead_of_now() {
        let cfg = WindirsConfig::default();
        let now = chrono::Utc::now().year() as u32;
        assert_eq!(cfg.opt_last_year, now + 5);
    }

    #[test]
    fn pipeline_default_has_nonzero_jobs_and_pagesize() {
        let cfg = PipelineConfig::default();
        assert!(cfg.jobs >= 1);
        assert_eq!(cfg.pagesize, DEFAULT_PAGESIZE);
    }
}
