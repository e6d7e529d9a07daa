use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use sectorscan::config::{PipelineConfig, WindirsConfig, DEFAULT_MARGIN, DEFAULT_PAGESIZE};
use sectorscan::feature::FeatureRecorderSet;
use sectorscan::image_source::ImageSource;
use sectorscan::page_iterator::PageIterator;
use sectorscan::scanner::pcap_writer::PcapWriterScanner;
use sectorscan::scanner::registry::{Dispatcher, ScannerRegistry};
use sectorscan::scanner::text_match::TextMatchScanner;
use sectorscan::scanner::windirs::WindirsScanner;

/// Bulk forensic feature-extraction pipeline: scans a raw image, an E01
/// container, or a directory tree page by page and records carved
/// artifacts into per-scanner feature files.
#[derive(Parser, Debug)]
#[command(name = "sectorscan", version, about)]
struct Cli {
    /// Path to a raw/split-raw image, an E01 container, or a directory.
    image: PathBuf,

    /// Treat `image` as a directory tree instead of a disk image.
    #[arg(short, long)]
    recurse: bool,

    /// Worker thread count. Defaults to available parallelism.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Directory feature files are written into.
    #[arg(short, long, default_value = "sectorscan-out")]
    out_dir: PathBuf,

    /// Bytes of content handed to scanners per page.
    #[arg(long, default_value_t = DEFAULT_PAGESIZE)]
    pagesize: usize,

    /// Bytes of lookahead margin carried into the next page.
    #[arg(long, default_value_t = DEFAULT_MARGIN)]
    margin: usize,

    /// Needles for the text_match scanner; may be repeated.
    #[arg(long = "needle")]
    needles: Vec<String>,

    #[arg(long)]
    weird_file_size: Option<u32>,
    #[arg(long)]
    weird_file_size2: Option<u32>,
    #[arg(long)]
    weird_cluster_count: Option<u32>,
    #[arg(long)]
    weird_cluster_count2: Option<u32>,
    #[arg(long)]
    max_bits_in_attrib: Option<u32>,
    #[arg(long)]
    max_weird_count: Option<u32>,
    #[arg(long)]
    last_year: Option<u32>,
}

impl Cli {
    fn windirs_config(&self) -> WindirsConfig {
        let mut cfg = WindirsConfig::default();
        if let Some(v) = self.weird_file_size {
            cfg.opt_weird_file_size = v;
        }
        if let Some(v) = self.weird_file_size2 {
            cfg.opt_weird_file_size2 = v;
        }
        if let Some(v) = self.weird_cluster_count {
            cfg.opt_weird_cluster_count = v;
        }
        if let Some(v) = self.weird_cluster_count2 {
            cfg.opt_weird_cluster_count2 = v;
        }
        if let Some(v) = self.max_bits_in_attrib {
            cfg.opt_max_bits_in_attrib = v;
        }
        if let Some(v) = self.max_weird_count {
            cfg.opt_max_weird_count = v;
        }
        if let Some(v) = self.last_year {
            cfg.opt_last_year = v;
        }
        cfg
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "scan failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> sectorscan::Result<()> {
    let config = PipelineConfig {
        recurse: cli.recurse,
        jobs: cli.jobs.unwrap_or_else(|| PipelineConfig::default().jobs),
        pagesize: cli.pagesize,
        margin: cli.margin,
        out_dir: cli.out_dir.clone(),
        windirs: cli.windirs_config(),
    };

    info!(image = %cli.image.display(), recurse = config.recurse, jobs = config.jobs, "opening image");
    let source = ImageSource::open(&cli.image, config.recurse)?;
    let label = cli.image.to_str().map(str::to_string);
    let pages = PageIterator::new(source, label, config.pagesize, config.margin);

    let mut registry = ScannerRegistry::new();
    registry.register(Box::new(WindirsScanner::new(config.windirs)));
    registry.register(Box::new(PcapWriterScanner::new(config.out_dir.join("carved.pcap"))));
    registry.register(Box::new(TextMatchScanner::new(cli.needles.iter().map(|s| s.as_bytes().to_vec()))));

    let recorders = FeatureRecorderSet::create(&config.out_dir, &registry.feature_names())?;

    // TODO: wire SIGINT into `cancel` so a scan can be stopped cleanly
    // without losing features already flushed to disk.
    let cancel = Arc::new(AtomicBool::new(false));

    let dispatcher = Dispatcher::new(registry, config.jobs);
    dispatcher.run(pages, &recorders, &config, cancel)?;

    info!(out_dir = %recorders.out_dir().display(), "scan complete");
    Ok(())
}
