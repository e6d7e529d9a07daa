//! Feature recorders: the append-only, thread-safe sinks scanners write
//! discovered artifacts into. One named recorder per feature type
//! (`windirs`, `email`, …), each backed by its own output file so that
//! multiple worker threads writing different feature types never contend
//! on the same lock.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::pos0::Pos0;

/// One discovered artifact: where it was found, and what.
#[derive(Debug, Clone)]
pub struct Feature {
    pub pos0: Pos0,
    pub feature: String,
    pub context: String,
}

/// A single named output stream. Lines are `<offset>\t<feature>\t<context>`,
/// matching the forensic feature-file convention the scanners are built
/// around — plain tab-separated text, append-only, one writer lock per
/// recorder rather than one global lock for the whole run.
pub struct FeatureRecorder {
    name: String,
    writer: Mutex<BufWriter<File>>,
}

impl FeatureRecorder {
    fn create(name: &str, out_dir: &Path) -> Result<Self> {
        let path = out_dir.join(format!("{name}.txt"));
        let file = File::create(&path).map_err(|e| Error::ReadError(format!("{}: {e}", path.display())))?;
        Ok(Self { name: name.to_string(), writer: Mutex::new(BufWriter::new(file)) })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends one feature line. Failures to flush are swallowed at the
    /// call site today — logged, not propagated, so one bad write doesn't
    /// abort an otherwise-healthy scan; see `registry::Dispatcher::run`.
    pub fn write(&self, pos0: &Pos0, feature: &str, context: &str) -> Result<()> {
        let sanitized_context: String = context.chars().map(|c| if c == '\t' || c == '\n' { ' ' } else { c }).collect();
        let mut w = self.writer.lock().expect("feature recorder mutex poisoned");
        writeln!(w, "{pos0}\t{feature}\t{sanitized_context}").map_err(|e| Error::ReadError(e.to_string()))
    }

    fn flush(&self) -> Result<()> {
        let mut w = self.writer.lock().expect("feature recorder mutex poisoned");
        w.flush().map_err(|e| Error::ReadError(e.to_string()))
    }
}

/// The set of all feature recorders for a run, keyed by name and created
/// up front at scanner INIT time.
pub struct FeatureRecorderSet {
    out_dir: PathBuf,
    recorders: HashMap<String, FeatureRecorder>,
}

impl FeatureRecorderSet {
    pub fn create(out_dir: &Path, names: &[&str]) -> Result<Self> {
        std::fs::create_dir_all(out_dir).map_err(|e| Error::ReadError(format!("{}: {e}", out_dir.display())))?;
        let mut recorders = HashMap::new();
        for name in names {
            recorders.insert((*name).to_string(), FeatureRecorder::create(name, out_dir)?);
        }
        Ok(Self { out_dir: out_dir.to_path_buf(), recorders })
    }

    #[must_use]
    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Looks up a recorder by name. Scanners are expected to request their
    /// own recorders at INIT and hold onto the reference — an unknown name
    /// here means a scanner and the set were built with mismatched name
    /// lists, which is a programming error, not a runtime condition.
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&FeatureRecorder> {
        self.recorders.get(name)
    }

    pub fn flush_all(&self) -> Result<()> {
        for r in self.recorders.values() {
            r.flush()?;
        }
        Ok(())
    }
}
