//! Secure extraction engine.

use std::io::Cursor;
use std::time::Instant;

use tracing::debug;
use tracing::warn;
use zip::ZipArchive;

use super::writer::create_private_dir_in;
use super::writer::write_entry;
use crate::ArchiveLimits;
use crate::ExtractionReport;
use crate::PipelineError;
use crate::Result;
use crate::Violation;
use crate::copy::CopyBuffer;
use crate::report::ExtractedEntry;
use crate::security::QuotaTracker;
use crate::security::is_symlink_mode;
use crate::security::validator::malformed;
use crate::types::SafePath;
use crate::types::SandboxRoot;

/// Extracts ZIP uploads into a [`SandboxRoot`].
///
/// Every check made by the pre-scan is repeated here against the real
/// entry data: a pre-scan pass is never taken as proof that extraction is
/// safe.
///
/// - Directory entries are skipped; parents are created on demand, owner-only
/// - Symlink entries are skipped with a warning
/// - Each entry path is normalized and checked for containment
/// - Bytes are counted as written, never taken from the header
/// - Files are written owner-only and re-checked for being a symlink
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::ArchiveLimits;
/// use sandconv_core::extraction::SecureExtractor;
/// use sandconv_core::types::SandboxRoot;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let limits = ArchiveLimits::default();
/// let root = SandboxRoot::new("/tmp/swift-conv-1234/extracted")?;
/// let bytes = std::fs::read("docs.zip")?;
///
/// let report = SecureExtractor::new(&limits).extract(&bytes, &root)?;
/// println!("extracted {} files", report.files_extracted());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SecureExtractor<'a> {
    limits: &'a ArchiveLimits,
}

impl<'a> SecureExtractor<'a> {
    /// Creates an extractor bound to `limits`.
    #[must_use]
    pub fn new(limits: &'a ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Extracts every regular file of `bytes` under `root`.
    ///
    /// # Errors
    ///
    /// Fails on the first violation. Files already written stay on disk; the
    /// caller owns cleanup of the root.
    pub fn extract(&self, bytes: &[u8], root: &SandboxRoot) -> Result<ExtractionReport> {
        let start = Instant::now();
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;
        let mut quota = QuotaTracker::for_upload(self.limits, bytes.len() as u64);
        let mut buffer = CopyBuffer::new();
        let mut report = ExtractionReport::new();

        for index in 0..archive.len() {
            quota.record_entry()?;

            let (name, is_dir, is_symlink, encrypted) = {
                let raw = archive.by_index_raw(index).map_err(malformed)?;
                (
                    raw.name().to_string(),
                    raw.is_dir(),
                    raw.unix_mode().is_some_and(is_symlink_mode),
                    raw.encrypted(),
                )
            };

            if is_dir {
                report.directories_skipped += 1;
                continue;
            }
            if is_symlink {
                warn!(entry = %name, "skipping symlink entry");
                report.symlinks_skipped += 1;
                report.add_warning(format!("skipped symlink entry: {name}"));
                continue;
            }
            if encrypted {
                return Err(Violation::EncryptedEntry { name }.into());
            }

            let safe_path = SafePath::normalize(&name, root, self.limits)?;
            if self.limits.is_nested_archive(&name) {
                quota.record_nested_archive(&name)?;
            }

            let output_path = root.join(&safe_path);
            if let Some(parent) = output_path.parent() {
                if let Some(relative) = safe_path.as_path().parent() {
                    create_private_dir_in(root.as_path(), relative)?;
                }
                let canonical_parent = parent.canonicalize()?;
                if !root.contains(&canonical_parent) {
                    return Err(PipelineError::PathTraversal { path: name.into() });
                }
            }

            let mut entry = archive.by_index(index).map_err(malformed)?;
            let size = write_entry(&mut entry, &output_path, &name, &mut quota, &mut buffer)?;

            if output_path.symlink_metadata()?.file_type().is_symlink() {
                std::fs::remove_file(&output_path)?;
                warn!(entry = %name, "extracted entry became a symlink, removed");
                report.symlinks_skipped += 1;
                report.add_warning(format!("removed symlink at {name}"));
                continue;
            }

            debug!(entry = %name, size, "extracted");
            report.bytes_written = quota.bytes();
            report.entries.push(ExtractedEntry {
                relative_path: safe_path.as_path().to_path_buf(),
                path: output_path,
                size,
            });
        }

        report.duration = start.elapsed();
        Ok(report)
    }
}
