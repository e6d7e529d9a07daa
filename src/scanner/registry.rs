//! Runs a `PageIterator` through every registered scanner, one producer
//! thread driving the iterator, a rayon worker pool fanning the per-page
//! work out. `rayon::iter::ParallelBridge` is exactly the adapter needed
//! here: it serializes calls to the iterator's `next()` behind one logical
//! producer while handing each yielded item to the pool, which is the
//! "single thread drives the iterator; a pool of workers processes pages"
//! shape the pipeline is built around.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::iter::{ParallelBridge, ParallelIterator};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::feature::FeatureRecorderSet;
use crate::image_source::ImageSource;
use crate::page_iterator::PageIterator;
use crate::scanner::{Scanner, ScannerFlags, ScannerParams};

pub struct ScannerRegistry {
    scanners: Vec<Box<dyn Scanner>>,
}

impl ScannerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { scanners: Vec::new() }
    }

    pub fn register(&mut self, scanner: Box<dyn Scanner>) {
        self.scanners.push(scanner);
    }

    #[must_use]
    pub fn feature_names(&self) -> Vec<&'static str> {
        self.scanners.iter().flat_map(|s| s.info().feature_names.iter().copied()).collect()
    }

    #[must_use]
    pub fn scanners(&self) -> &[Box<dyn Scanner>] {
        &self.scanners
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Dispatcher {
    registry: ScannerRegistry,
    jobs: usize,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: ScannerRegistry, jobs: usize) -> Self {
        Self { registry, jobs: jobs.max(1) }
    }

    /// Drives `pages` to completion: INIT every scanner, fan pages out to
    /// the worker pool running every scanner serially per page, SHUTDOWN
    /// every scanner. A page-level read error is logged and skipped rather
    /// than aborting the run; `cancel` lets a caller stop early (e.g. on
    /// Ctrl-C) without losing already-recorded features.
    pub fn run(
        &self,
        pages: PageIterator,
        recorders: &FeatureRecorderSet,
        config: &PipelineConfig,
        cancel: Arc<AtomicBool>,
    ) -> Result<()> {
        for scanner in self.registry.scanners() {
            info!(scanner = scanner.info().name, "init");
            scanner.init(recorders)?;
        }

        let is_filesystem = matches!(pages.source(), ImageSource::Directory(_));

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| crate::error::Error::ReadError(e.to_string()))?;

        pool.install(|| {
            pages.par_bridge().for_each(|page_result| {
                if cancel.load(Ordering::Relaxed) {
                    return;
                }
                match page_result {
                    Ok(page) => {
                        let params = ScannerParams { page: &page, recorders, config };
                        let depth0 = page.pos0().offset() == 0;
                        for scanner in self.registry.scanners() {
                            let flags = scanner.info().flags;
                            if is_filesystem && !flags.contains(ScannerFlags::WANTS_FILESYSTEMS) {
                                continue; // this scanner only looks at raw/E01 bytes, not file-tree pages
                            }
                            if flags.contains(ScannerFlags::DEPTH0_ONLY) && !depth0 {
                                continue;
                            }
                            if let Err(e) = scanner.scan(&params) {
                                warn!(scanner = scanner.info().name, error = %e, "scan failed on page");
                            }
                        }
                    }
                    Err(e) => {
                        error!(error = %e, "failed to read page, skipping");
                    }
                }
            });
        });

        for scanner in self.registry.scanners() {
            info!(scanner = scanner.info().name, "shutdown");
            scanner.shutdown(recorders)?;
        }
        recorders.flush_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_source::raw::RawSource;
    use crate::image_source::ImageSource;
    use crate::scanner::{ScannerFlags, ScannerInfo};
    use std::sync::atomic::AtomicUsize;

    struct CountingScanner {
        count: AtomicUsize,
    }

    impl Scanner for CountingScanner {
        fn info(&self) -> ScannerInfo {
            ScannerInfo { name: "counter", flags: ScannerFlags::empty(), feature_names: &["counter"] }
        }

        fn scan(&self, params: &ScannerParams) -> Result<()> {
            self.count.fetch_add(1, Ordering::Relaxed);
            params.recorders.named("counter").unwrap().write(params.page.pos0(), "seen", "")?;
            Ok(())
        }
    }

    #[test]
    fn dispatcher_runs_every_scanner_over_every_page() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0u8; 1000];
        let img_path = dir.path().join("img.dd");
        std::fs::write(&img_path, &data).unwrap();

        let src = ImageSource::Raw(RawSource::open(&img_path).unwrap());
        let pages = PageIterator::new(src, Some("img.dd".to_string()), 100, 0);

        let mut registry = ScannerRegistry::new();
        registry.register(Box::new(CountingScanner { count: AtomicUsize::new(0) }));

        let out_dir = dir.path().join("out");
        let recorders = FeatureRecorderSet::create(&out_dir, &registry.feature_names()).unwrap();
        let config = PipelineConfig::default();

        let dispatcher = Dispatcher::new(registry, 2);
        dispatcher.run(pages, &recorders, &config, Arc::new(AtomicBool::new(false))).unwrap();

        let contents = std::fs::read_to_string(out_dir.join("counter.txt")).unwrap();
        assert_eq!(contents.lines().count(), 10);
    }

    #[test]
    fn depth0_only_scanner_runs_once_per_source_not_once_per_page() {
        let dir = tempfile::tempdir().unwrap();
        let data = vec![0u8; 1000];
        let img_path = dir.path().join("img.dd");
        std::fs::write(&img_path, &data).unwrap();

        let src = ImageSource::Raw(RawSource::open(&img_path).unwrap());
        let pages = PageIterator::new(src, Some("img.dd".to_string()), 100, 0);

        struct Depth0Scanner {
            count: AtomicUsize,
        }
        impl Scanner for Depth0Scanner {
            fn info(&self) -> ScannerInfo {
                ScannerInfo { name: "depth0", flags: ScannerFlags::DEPTH0_ONLY, feature_names: &["depth0"] }
            }
            fn scan(&self, params: &ScannerParams) -> Result<()> {
                self.count.fetch_add(1, Ordering::Relaxed);
                params.recorders.named("depth0").unwrap().write(params.page.pos0(), "seen", "")?;
                Ok(())
            }
        }

        let mut registry = ScannerRegistry::new();
        registry.register(Box::new(Depth0Scanner { count: AtomicUsize::new(0) }));

        let out_dir = dir.path().join("out");
        let recorders = FeatureRecorderSet::create(&out_dir, &registry.feature_names()).unwrap();
        let config = PipelineConfig::default();

        let dispatcher = Dispatcher::new(registry, 2);
        dispatcher.run(pages, &recorders, &config, Arc::new(AtomicBool::new(false))).unwrap();

        let contents = std::fs::read_to_string(out_dir.join("depth0.txt")).unwrap();
        assert_eq!(contents.lines().count(), 1);
    }

    #[test]
    fn non_filesystem_scanner_is_skipped_over_directory_pages() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join("a.txt"), b"hello").unwrap();

        let src = ImageSource::Directory(crate::image_source::directory::DirectorySource::open(&tree).unwrap());
        let pages = PageIterator::new(src, None, 100, 0);

        let mut registry = ScannerRegistry::new();
        registry.register(Box::new(CountingScanner { count: AtomicUsize::new(0) }));

        let out_dir = dir.path().join("out");
        let recorders = FeatureRecorderSet::create(&out_dir, &registry.feature_names()).unwrap();
        let config = PipelineConfig::default();

        let dispatcher = Dispatcher::new(registry, 2);
        dispatcher.run(pages, &recorders, &config, Arc::new(AtomicBool::new(false))).unwrap();

        let contents = std::fs::read_to_string(out_dir.join("counter.txt")).unwrap();
        assert_eq!(contents.lines().count(), 0);
    }
}
