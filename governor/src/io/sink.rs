//! Append-only trace sinks.
//!
//! Sinks receive one record per governed invocation as a single NDJSON line.
//! Writers must serialize access themselves or use per-run sink paths; the
//! file sink makes no concurrency guarantee.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::io::emitter::TraceRecord;

/// Destination for trace/feedback records.
pub trait TraceSink {
    fn append(&mut self, record: &TraceRecord) -> Result<()>;
    /// Short identifier used when logging a failed write.
    fn describe(&self) -> String;
}

/// Appends one JSON line per record to a file, creating it on first write.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for FileSink {
    fn append(&mut self, record: &TraceRecord) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        let mut line = serde_json::to_string(record).context("serialize trace record")?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open trace sink {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("append to trace sink {}", self.path.display()))?;
        Ok(())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
