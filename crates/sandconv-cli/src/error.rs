//! Error conversion utilities for CLI.
//!
//! Converts sandconv-core's typed errors (thiserror) into user-friendly
//! contextual errors (anyhow) with actionable guidance.

use std::path::Path;

use anyhow::anyhow;
use sandconv_core::PipelineError;
use sandconv_core::Violation;

/// Converts `PipelineError` to user-friendly anyhow error with context
pub fn convert_pipeline_error(err: PipelineError, archive: &Path) -> anyhow::Error {
    match err {
        PipelineError::PathTraversal { path } => {
            anyhow!(
                "Security violation: Archive '{}' attempted path traversal with '{}'\n\
                 HINT: This archive may be malicious. Do not process it further.",
                archive.display(),
                path.display()
            )
        }
        PipelineError::Validation { violation } => convert_violation(&violation, archive),
        PipelineError::WorkspaceAllocation { path, source } => {
            anyhow!(
                "Could not create a workspace under '{}': {}\n\
                 HINT: Check that --base-dir exists, is writable, and has free space.",
                path.display(),
                source
            )
        }
        PipelineError::CommandRejected { reason } => {
            anyhow!(
                "Converter command rejected: {reason}\n\
                 HINT: Paths passed to the converter must not contain shell metacharacters."
            )
        }
        PipelineError::ConversionTimeout { timeout, attempts } => {
            anyhow!(
                "Converter timed out after {attempts} attempt(s) of {}s each while processing '{}'\n\
                 HINT: Use --timeout to allow more time for large archives.",
                timeout.as_secs(),
                archive.display()
            )
        }
        PipelineError::ProcessFailure { attempts, message } => {
            anyhow!(
                "Converter could not be run after {attempts} attempt(s): {message}\n\
                 HINT: Check the --converter path (or SANDCONV_CONVERTER) and its permissions."
            )
        }
        PipelineError::ConversionFailed {
            exit_code, stderr, ..
        } => {
            let code = exit_code.map_or_else(|| "signal".to_string(), |c| c.to_string());
            anyhow!(
                "Converter rejected '{}' (exit status {code})\n{}",
                archive.display(),
                stderr.trim_end()
            )
        }
        PipelineError::EmptyResult => {
            anyhow!(
                "Converter finished but produced no Markdown output for '{}'\n\
                 HINT: The archive may not contain documentation the converter recognizes.",
                archive.display()
            )
        }
        PipelineError::InvalidConfig(reason) => {
            anyhow!("Invalid configuration: {reason}")
        }
        PipelineError::Io(io_err) => {
            anyhow!(
                "I/O error while processing '{}': {}",
                archive.display(),
                io_err
            )
        }
        err @ PipelineError::Packaging(_) => anyhow::Error::from(err)
            .context(format!("Error processing archive '{}'", archive.display())),
    }
}

fn convert_violation(violation: &Violation, archive: &Path) -> anyhow::Error {
    let hint = match violation {
        Violation::UploadTooLarge { .. } => Some("Use --max-upload-size to accept larger uploads."),
        Violation::TooManyEntries { .. } => Some("Use --max-entries to raise the entry limit."),
        Violation::DecompressedSizeExceeded { .. } => Some(
            "The archive expands far beyond its size. Use --max-compression-ratio or \
             --max-decompressed-size only if the source is trusted.",
        ),
        Violation::EntryTooLarge { .. } => Some("Use --max-entry-size to raise the per-entry limit."),
        Violation::PathTooDeep { .. } => Some("Use --max-path-depth to allow deeper paths."),
        Violation::NestedArchive { .. } => Some("Unpack nested archives before uploading."),
        Violation::EncryptedEntry { .. } => Some("Re-create the archive without a password."),
        Violation::SymlinkEntry { .. } => Some("Re-create the archive without symbolic links."),
        Violation::BadSignature | Violation::MalformedArchive { .. } => {
            Some("Only ZIP archives are accepted. The file may be corrupted.")
        }
        Violation::UnsafeFilename(_) => Some("Use --filename to supply a plain name."),
        _ => None,
    };

    match hint {
        Some(hint) => anyhow!(
            "Archive '{}' rejected: {}\nHINT: {}",
            archive.display(),
            violation,
            hint
        ),
        None => anyhow!("Archive '{}' rejected: {}", archive.display(), violation),
    }
}

/// Adds context to a pipeline result about the archive being processed
pub fn add_archive_context<T>(
    result: Result<T, PipelineError>,
    archive: &Path,
) -> anyhow::Result<T> {
    result.map_err(|e| convert_pipeline_error(e, archive))
}
