//! `text_match`: a minimal multi-needle search scanner, kept around mainly
//! as a worked example of the three things every byte-pattern scanner
//! needs to get right — a context window around each hit, proximity
//! deduplication so one repeated string doesn't flood the feature file
//! with near-identical hits, and graceful needle abandonment once too
//! little of the page remains for a match to fit.

use crate::error::Result;
use crate::page_buffer::PageBuffer;
use crate::scanner::{Scanner, ScannerFlags, ScannerInfo, ScannerParams};

/// Bytes of surrounding context captured around each hit (split evenly
/// before/after the match).
const CONTEXT_WINDOW: usize = 4096;
/// Two hits of the same needle closer together than this are treated as
/// one event — only the first is recorded.
const PROXIMITY_SUPPRESS: usize = 2048;

pub struct TextMatchScanner {
    needles: Vec<Vec<u8>>,
}

impl TextMatchScanner {
    #[must_use]
    pub fn new(needles: impl IntoIterator<Item = impl Into<Vec<u8>>>) -> Self {
        Self { needles: needles.into_iter().map(Into::into).collect() }
    }
}

impl Scanner for TextMatchScanner {
    fn info(&self) -> ScannerInfo {
        ScannerInfo { name: "text_match", flags: ScannerFlags::empty(), feature_names: &["text_match"] }
    }

    fn scan(&self, params: &ScannerParams) -> Result<()> {
        let page = params.page;
        let recorder = params.recorders.named("text_match").expect("text_match recorder registered at INIT");

        for needle in &self.needles {
            let mut cursor = 0usize;
            let mut last_hit: Option<usize> = None;

            loop {
                if needle.is_empty() || cursor + needle.len() > page.bufsize() {
                    break; // not enough room left for this needle to fit
                }
                let Some(idx) = page.find(needle, cursor) else { break };
                if idx >= page.pagesize() {
                    break; // match lives entirely in borrowed margin, the next page owns it
                }

                let suppressed = last_hit.is_some_and(|h| idx.saturating_sub(h) < PROXIMITY_SUPPRESS);
                if !suppressed {
                    let half = CONTEXT_WINDOW / 2;
                    let start = idx.saturating_sub(half);
                    let end = (idx + needle.len() + half).min(page.bufsize());
                    let context = page.get_slice(start, end - start)?;
                    recorder.write(
                        &page.pos0().advance(idx as u64),
                        &String::from_utf8_lossy(needle),
                        &String::from_utf8_lossy(context),
                    )?;
                    last_hit = Some(idx);
                }

                cursor = idx + CONTEXT_WINDOW; // jump the full window width past every hit, suppressed or not
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::FeatureRecorderSet;
    use crate::pos0::Pos0;

    fn run(data: Vec<u8>, needles: &[&str]) -> String {
        let page = PageBuffer::from_owned(Pos0::new(0), data.clone(), data.len());
        let dir = tempfile::tempdir().unwrap();
        let recorders = FeatureRecorderSet::create(dir.path(), &["text_match"]).unwrap();
        let config = crate::config::PipelineConfig::default();
        let scanner = TextMatchScanner::new(needles.iter().map(|s| s.as_bytes().to_vec()));
        let params = ScannerParams { page: &page, recorders: &recorders, config: &config };
        scanner.scan(&params).unwrap();
        recorders.flush_all().unwrap();
        std::fs::read_to_string(dir.path().join("text_match.txt")).unwrap()
    }

    #[test]
    fn single_needle_is_found_with_context() {
        let mut data = vec![b'x'; 100];
        data[50..57].copy_from_slice(b"PASSWRD");
        let out = run(data, &["PASSWRD"]);
        assert_eq!(out.lines().count(), 1);
        assert!(out.contains("PASSWRD"));
    }

    #[test]
    fn nearby_repeats_are_suppressed() {
        let mut data = vec![b'x'; 6000];
        data[100..107].copy_from_slice(b"PASSWRD");
        data[500..507].copy_from_slice(b"PASSWRD"); // within the post-hit window jump, never even searched
        data[4300..4307].copy_from_slice(b"PASSWRD"); // past the jump, far enough to not be suppressed
        let out = run(data, &["PASSWRD"]);
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn cursor_jumps_full_window_past_every_hit() {
        let mut data = vec![b'x'; 9000];
        data[100..107].copy_from_slice(b"PASSWRD");
        // Sits inside [100, 100+CONTEXT_WINDOW) — the cursor jump skips over
        // it entirely, so it's never found at all, not merely suppressed.
        data[4195..4202].copy_from_slice(b"PASSWRD");
        data[8500..8507].copy_from_slice(b"PASSWRD");
        let out = run(data, &["PASSWRD"]);
        assert_eq!(out.lines().count(), 2);
    }

    #[test]
    fn needle_abandoned_when_it_cannot_fit_near_buffer_end() {
        let data = vec![b'x'; 10];
        let out = run(data, &["THIS_NEEDLE_IS_LONGER_THAN_THE_BUFFER"]);
        assert!(out.is_empty());
    }
}
