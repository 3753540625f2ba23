//! Extraction and pipeline reporting.

use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::PipelineStage;

/// A regular file written during extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedEntry {
    /// Path relative to the extraction root.
    pub relative_path: PathBuf,
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Bytes written.
    pub size: u64,
}

/// Report of an archive extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// Files written, in archive order.
    pub entries: Vec<ExtractedEntry>,

    /// Directory entries seen; directories are created on demand.
    pub directories_skipped: usize,

    /// Symlink entries skipped.
    pub symlinks_skipped: usize,

    /// Total bytes written to disk.
    pub bytes_written: u64,

    /// Duration of the extraction.
    pub duration: Duration,

    /// Warnings generated during extraction.
    pub warnings: Vec<String>,
}

impl ExtractionReport {
    /// Creates a new empty extraction report.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files written.
    #[must_use]
    pub fn files_extracted(&self) -> usize {
        self.entries.len()
    }

    /// Adds a warning message to the report.
    pub fn add_warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    /// Returns whether any warnings were generated.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Time spent in one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTiming {
    /// The stage that was entered.
    pub stage: PipelineStage,
    /// Time from the previous stage to this one.
    pub elapsed: Duration,
}

/// Summary of a successful pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Identifier of the workspace used for the request.
    pub workspace_id: String,
    /// Sanitized upload filename.
    pub filename: String,
    /// Upload size in bytes.
    pub upload_bytes: u64,
    /// Files written during extraction.
    pub files_extracted: usize,
    /// Bytes written during extraction.
    pub bytes_extracted: u64,
    /// Converter attempts, including the successful one.
    pub converter_attempts: u32,
    /// Files placed into the output archive.
    pub output_files: usize,
    /// Size of the output archive in bytes.
    pub output_bytes: u64,
    /// Stage transitions in order.
    pub stages: Vec<StageTiming>,
    /// Wall-clock duration of the whole run.
    pub duration: Duration,
    /// Warnings collected along the way.
    pub warnings: Vec<String>,
}

impl PipelineReport {
    /// Returns the time spent reaching `stage`, if it was entered.
    #[must_use]
    pub fn stage_elapsed(&self, stage: PipelineStage) -> Option<Duration> {
        self.stages
            .iter()
            .find(|timing| timing.stage == stage)
            .map(|timing| timing.elapsed)
    }
}
