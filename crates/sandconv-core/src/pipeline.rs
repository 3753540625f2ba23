//! End-to-end conversion pipeline.
//!
//! One request moves through a fixed sequence of stages:
//!
//! ```text
//! Idle -> WorkspaceAcquired -> Validated -> Extracted -> Converted -> Packaged -> Complete
//! ```
//!
//! Any stage may move to `Failed`. The workspace is released on both terminal
//! stages, and no stage is entered before its predecessor succeeded.

use std::sync::Arc;
use std::time::Instant;

use tracing::Instrument;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::info_span;
use tracing::warn;

use crate::PipelineError;
use crate::Result;
use crate::SandboxConfig;
use crate::extraction::SecureExtractor;
use crate::packaging::OutputArchive;
use crate::packaging::ResultAssembler;
use crate::process::ConverterCommand;
use crate::process::InfoFlag;
use crate::process::ProcessSupervisor;
use crate::process::SubprocessOutcome;
use crate::report::PipelineReport;
use crate::report::StageTiming;
use crate::security::ArchiveValidator;
use crate::security::ValidationVerdict;
use crate::types::UploadedArchive;
use crate::workspace::EXTRACTED_DIR;
use crate::workspace::OUTPUT_DIR;
use crate::workspace::Workspace;
use crate::workspace::WorkspaceManager;

/// Longest stderr or stdout excerpt kept in a conversion failure.
const FAILURE_OUTPUT_EXCERPT: usize = 4 * 1024;

/// Stage of a single pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineStage {
    /// Nothing has happened yet.
    Idle,
    /// A private workspace exists.
    WorkspaceAcquired,
    /// The upload passed validation.
    Validated,
    /// The archive was extracted into the workspace.
    Extracted,
    /// The converter exited successfully.
    Converted,
    /// Output files were packaged.
    Packaged,
    /// The run finished and the workspace was released.
    Complete,
    /// The run failed and the workspace was released.
    Failed,
}

impl PipelineStage {
    /// Stage that follows this one on success, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Idle => Some(Self::WorkspaceAcquired),
            Self::WorkspaceAcquired => Some(Self::Validated),
            Self::Validated => Some(Self::Extracted),
            Self::Extracted => Some(Self::Converted),
            Self::Converted => Some(Self::Packaged),
            Self::Packaged => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Returns `true` for `Complete` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    /// Lower-case label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::WorkspaceAcquired => "workspace_acquired",
            Self::Validated => "validated",
            Self::Extracted => "extracted",
            Self::Converted => "converted",
            Self::Packaged => "packaged",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records stage transitions and their timings.
#[derive(Debug)]
struct StageTracker {
    stage: PipelineStage,
    mark: Instant,
    timings: Vec<StageTiming>,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: PipelineStage::Idle,
            mark: Instant::now(),
            timings: Vec::new(),
        }
    }

    /// Moves to the next stage in sequence.
    fn advance(&mut self) -> PipelineStage {
        let next = self.stage.next().unwrap_or(PipelineStage::Failed);
        self.enter(next);
        next
    }

    fn fail(&mut self) {
        self.enter(PipelineStage::Failed);
    }

    fn enter(&mut self, stage: PipelineStage) {
        let now = Instant::now();
        self.timings.push(StageTiming {
            stage,
            elapsed: now.duration_since(self.mark),
        });
        self.mark = now;
        self.stage = stage;
        debug!(stage = %stage, "pipeline stage");
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The packaged conversion result.
    pub archive: OutputArchive,
    /// What happened along the way.
    pub report: PipelineReport,
}

/// Validates, extracts, converts, and packages uploaded archives.
///
/// A `Pipeline` is cheap to share: it holds its configuration behind an
/// `Arc` and keeps no per-request state, so concurrent calls to
/// [`Pipeline::run`] each get their own workspace.
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::Pipeline;
/// use sandconv_core::SandboxConfig;
/// use sandconv_core::types::UploadedArchive;
///
/// # async fn example() -> Result<(), sandconv_core::PipelineError> {
/// let pipeline = Pipeline::new(SandboxConfig::default())?;
/// let upload = UploadedArchive::new("Docs.doccarchive.zip", std::fs::read("docs.zip")?);
///
/// let output = pipeline.run(upload).await?;
/// std::fs::write("docs-markdown.zip", output.archive.bytes())?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<SandboxConfig>,
    workspaces: WorkspaceManager,
    supervisor: ProcessSupervisor,
}

impl Pipeline {
    /// Builds a pipeline after validating `config`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfig` if the configuration is
    /// incoherent.
    pub fn new(config: SandboxConfig) -> Result<Self> {
        let supervisor = ProcessSupervisor::new(config.converter.clone());
        Self::with_supervisor(config, supervisor)
    }

    /// Builds a pipeline around an existing supervisor.
    ///
    /// The supervisor's converter policy replaces `config.converter`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidConfig` if the configuration is
    /// incoherent.
    pub fn with_supervisor(mut config: SandboxConfig, supervisor: ProcessSupervisor) -> Result<Self> {
        config.converter = supervisor.config().clone();
        config.validate()?;
        Ok(Self {
            workspaces: WorkspaceManager::new(config.workspace.clone()),
            config: Arc::new(config),
            supervisor,
        })
    }

    /// Configuration in force.
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Workspace manager, for orphan sweeps.
    #[must_use]
    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Runs validation only, without touching the filesystem.
    ///
    /// # Errors
    ///
    /// Returns the same errors as the validation stage of [`Pipeline::run`].
    pub fn validate(&self, upload: &UploadedArchive) -> Result<ValidationVerdict> {
        ArchiveValidator::new(&self.config.limits).validate(upload)
    }

    /// Asks the converter for its version.
    ///
    /// # Errors
    ///
    /// Returns a supervisor error if the converter cannot be run, or
    /// `PipelineError::ConversionFailed` if it exits non-zero.
    pub async fn probe_converter(&self) -> Result<SubprocessOutcome> {
        let outcome = self
            .supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), None)
            .await?;
        if !outcome.success() {
            return Err(conversion_failed(&outcome));
        }
        Ok(outcome)
    }

    /// Converts one uploaded archive.
    ///
    /// The workspace is removed before this returns, on success and failure
    /// alike.
    ///
    /// # Errors
    ///
    /// Returns the first stage failure; see [`PipelineError`].
    pub async fn run(&self, upload: UploadedArchive) -> Result<PipelineOutput> {
        let start = Instant::now();
        let mut tracker = StageTracker::new();

        let workspace = match self.workspaces.acquire() {
            Ok(workspace) => workspace,
            Err(e) => {
                tracker.fail();
                error!(error = %e, kind = %e.kind(), "workspace allocation failed");
                return Err(e);
            }
        };
        tracker.advance();
        let workspace = Arc::new(workspace);

        let workspace_id = workspace.id().to_string();
        let span = info_span!(
            "pipeline",
            workspace = %workspace_id,
            upload_bytes = upload.len(),
            content_type = upload.content_type().unwrap_or("unknown"),
        );

        let result = self
            .run_stages(&workspace, &upload, &mut tracker)
            .instrument(span.clone())
            .await;

        release(workspace).instrument(span.clone()).await;

        let _guard = span.enter();
        match result {
            Ok((archive, mut report)) => {
                tracker.advance();
                report.workspace_id = workspace_id;
                report.stages = tracker.timings;
                report.duration = start.elapsed();
                info!(
                    files = report.output_files,
                    output_bytes = report.output_bytes,
                    duration = ?report.duration,
                    "conversion complete"
                );
                Ok(PipelineOutput { archive, report })
            }
            Err(e) => {
                let stage = tracker.stage;
                tracker.fail();
                log_failure(&e, stage);
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        workspace: &Arc<Workspace>,
        upload: &UploadedArchive,
        tracker: &mut StageTracker,
    ) -> Result<(OutputArchive, PipelineReport)> {
        let config = Arc::clone(&self.config);
        let checked = upload.clone();
        let verdict = run_blocking(move || ArchiveValidator::new(&config.limits).validate(&checked)).await?;
        tracker.advance();

        let extract_root = workspace.extraction_root()?;
        let config = Arc::clone(&self.config);
        let bytes = upload.shared_bytes();
        let held = Arc::clone(workspace);
        let extraction = run_blocking(move || {
            let report = SecureExtractor::new(&config.limits).extract(&bytes, &extract_root);
            drop(held);
            report
        })
        .await?;
        tracker.advance();

        // Workspace-relative: the child runs inside the workspace.
        let command = ConverterCommand::convert(
            EXTRACTED_DIR,
            OUTPUT_DIR,
            &self.config.converter.convert_flags,
        );
        let outcome = self.supervisor.run(&command, Some(workspace.path())).await?;
        if !outcome.success() {
            return Err(conversion_failed(&outcome));
        }
        if outcome.stderr.total() > 0 {
            debug!(stderr = %outcome.stderr.text(), "converter stderr");
        }
        tracker.advance();

        let config = Arc::clone(&self.config);
        let output_dir = workspace.output_dir();
        let held = Arc::clone(workspace);
        let archive = run_blocking(move || {
            let archive = ResultAssembler::new(&config.converter.output_extensions).collect(&output_dir);
            drop(held);
            archive
        })
        .await?;
        tracker.advance();

        let mut warnings = extraction.warnings.clone();
        if outcome.stdout.is_truncated() || outcome.stderr.is_truncated() {
            warnings.push("converter output was truncated".to_string());
        }

        let report = PipelineReport {
            workspace_id: String::new(),
            filename: verdict.sanitized_name,
            upload_bytes: upload.len(),
            files_extracted: extraction.files_extracted(),
            bytes_extracted: extraction.bytes_written,
            converter_attempts: outcome.attempts,
            output_files: archive.files().len(),
            output_bytes: archive.len(),
            stages: Vec::new(),
            duration: std::time::Duration::ZERO,
            warnings,
        };

        Ok((archive, report))
    }
}

/// Runs blocking filesystem work off the async executor.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(format!("blocking task failed: {e}"))))?
}

/// Removes the workspace once no blocking stage holds it.
///
/// A stage detached by cancellation keeps its handle and removes the
/// workspace itself when it finishes.
async fn release(workspace: Arc<Workspace>) {
    let Ok(workspace) = Arc::try_unwrap(workspace) else {
        debug!("workspace still held by a blocking stage, removal deferred");
        return;
    };
    if let Err(e) = tokio::task::spawn_blocking(move || workspace.release()).await {
        error!(error = %e, "workspace release task failed");
    }
}

fn conversion_failed(outcome: &SubprocessOutcome) -> PipelineError {
    PipelineError::ConversionFailed {
        exit_code: outcome.exit_code,
        stderr: excerpt(&outcome.stderr.text()),
        stdout: excerpt(&outcome.stdout.text()),
    }
}

fn excerpt(text: &str) -> String {
    if text.len() <= FAILURE_OUTPUT_EXCERPT {
        return text.to_string();
    }
    let mut end = FAILURE_OUTPUT_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &text[..end])
}

fn log_failure(err: &PipelineError, stage: PipelineStage) {
    match err {
        PipelineError::PathTraversal { path } => {
            error!(stage = %stage, kind = %err.kind(), path = %path.display(), "path traversal attempt rejected");
        }
        PipelineError::CommandRejected { .. } => {
            error!(stage = %stage, kind = %err.kind(), error = %err, "converter command rejected");
        }
        _ if err.is_client_error() => {
            warn!(stage = %stage, kind = %err.kind(), error = %err, "upload rejected");
        }
        _ => {
            error!(stage = %stage, kind = %err.kind(), error = %err, "conversion failed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_sequence() {
        let mut stage = PipelineStage::Idle;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            seen.push(next);
            stage = next;
        }
        assert_eq!(seen, vec![
            PipelineStage::Idle,
            PipelineStage::WorkspaceAcquired,
            PipelineStage::Validated,
            PipelineStage::Extracted,
            PipelineStage::Converted,
            PipelineStage::Packaged,
            PipelineStage::Complete,
        ]);
        assert!(PipelineStage::Failed.next().is_none());
        assert!(PipelineStage::Failed.is_terminal());
        assert!(!PipelineStage::Converted.is_terminal());
    }

    #[test]
    fn test_tracker_records_timings_in_order() {
        let mut tracker = StageTracker::new();
        tracker.advance();
        tracker.advance();
        tracker.fail();
        let stages: Vec<_> = tracker.timings.iter().map(|t| t.stage).collect();
        assert_eq!(stages, vec![
            PipelineStage::WorkspaceAcquired,
            PipelineStage::Validated,
            PipelineStage::Failed,
        ]);
        assert_eq!(tracker.stage, PipelineStage::Failed);
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        let text = "é".repeat(FAILURE_OUTPUT_EXCERPT);
        let cut = excerpt(&text);
        assert!(cut.ends_with("... [truncated]"));
        assert!(cut.len() < text.len());

        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn test_pipeline_rejects_invalid_config() {
        let mut config = SandboxConfig::default();
        config.converter.timeout = std::time::Duration::ZERO;
        assert!(matches!(
            Pipeline::new(config),
            Err(PipelineError::InvalidConfig(_))
        ));
    }
}
