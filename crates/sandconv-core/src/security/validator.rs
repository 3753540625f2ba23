//! Upload validation orchestrator.
//!
//! `ArchiveValidator` runs every check that can be made without writing to
//! disk: upload size, container signature, filename, and a pre-scan of the
//! central directory.

use std::io::Cursor;
use std::path::PathBuf;

use tracing::debug;
use zip::ZipArchive;

use super::filename::sanitize_filename;
use super::quota::QuotaTracker;
use super::signature::check_signature;
use crate::ArchiveLimits;
use crate::PipelineError;
use crate::Result;
use crate::Violation;
use crate::types::UploadedArchive;

/// File type bits of a Unix mode.
const S_IFMT: u32 = 0o170_000;
/// Symbolic link file type.
const S_IFLNK: u32 = 0o120_000;

/// An upload that passed validation.
///
/// Rejection is the `Err` side of [`ArchiveValidator::validate`]; a verdict
/// only exists for accepted uploads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationVerdict {
    /// Filename reduced to a safe basename.
    pub sanitized_name: String,
    /// Number of entries in the central directory.
    pub entry_count: usize,
    /// Sum of declared uncompressed sizes.
    pub declared_size: u64,
    /// Decompression ceiling derived from the upload size.
    pub decompressed_ceiling: u64,
}

/// Validates uploads against a set of [`ArchiveLimits`].
///
/// # Examples
///
/// ```
/// use sandconv_core::ArchiveLimits;
/// use sandconv_core::security::ArchiveValidator;
/// use sandconv_core::types::UploadedArchive;
///
/// let limits = ArchiveLimits::default();
/// let validator = ArchiveValidator::new(&limits);
///
/// let upload = UploadedArchive::new("notes.txt", b"not a zip".to_vec());
/// assert!(validator.validate(&upload).is_err());
/// ```
#[derive(Debug)]
pub struct ArchiveValidator<'a> {
    limits: &'a ArchiveLimits,
}

impl<'a> ArchiveValidator<'a> {
    /// Creates a validator bound to `limits`.
    #[must_use]
    pub fn new(limits: &'a ArchiveLimits) -> Self {
        Self { limits }
    }

    /// Runs every pre-extraction check against an upload.
    ///
    /// Checks run in order: upload size, signature, filename, then the
    /// central-directory pre-scan. The first failure is returned.
    ///
    /// # Errors
    ///
    /// - `PipelineError::PathTraversal` for absolute or `..` entry names
    /// - `PipelineError::Validation` for every other rejection
    pub fn validate(&self, upload: &UploadedArchive) -> Result<ValidationVerdict> {
        let size = upload.len();
        if size > self.limits.max_upload_size {
            return Err(Violation::UploadTooLarge {
                size,
                max: self.limits.max_upload_size,
            }
            .into());
        }

        check_signature(upload.bytes())?;
        let sanitized_name =
            sanitize_filename(upload.filename(), self.limits.max_filename_length)?;
        let (entry_count, declared_size, decompressed_ceiling) = self.scan(upload.bytes())?;

        debug!(
            filename = %sanitized_name,
            entries = entry_count,
            declared_size,
            ceiling = decompressed_ceiling,
            "archive pre-scan passed"
        );

        Ok(ValidationVerdict {
            sanitized_name,
            entry_count,
            declared_size,
            decompressed_ceiling,
        })
    }

    /// Inspects the central directory without decompressing any entry.
    fn scan(&self, bytes: &[u8]) -> Result<(usize, u64, u64)> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).map_err(malformed)?;

        if archive.len() > self.limits.max_entries {
            return Err(Violation::TooManyEntries {
                count: archive.len(),
                max: self.limits.max_entries,
            }
            .into());
        }

        let mut quota = QuotaTracker::for_upload(self.limits, bytes.len() as u64);

        for index in 0..archive.len() {
            quota.record_entry()?;

            let entry = archive.by_index_raw(index).map_err(malformed)?;
            let name = entry.name().to_string();

            check_entry_name(&name, self.limits)?;

            if entry.encrypted() {
                return Err(Violation::EncryptedEntry { name }.into());
            }
            if entry.unix_mode().is_some_and(is_symlink_mode) {
                return Err(Violation::SymlinkEntry { name }.into());
            }
            if !entry.is_dir() && self.limits.is_nested_archive(&name) {
                quota.record_nested_archive(&name)?;
            }

            quota.record_bytes(&name, 0, entry.size())?;
        }

        Ok((quota.entries(), quota.bytes(), quota.ceiling()))
    }
}

/// Checks a raw entry name as stored in the central directory.
///
/// # Errors
///
/// - `PipelineError::PathTraversal` if the name is absolute or contains a
///   `..` segment
/// - `Violation::NullByte` or `Violation::PathTooDeep` otherwise
pub fn check_entry_name(name: &str, limits: &ArchiveLimits) -> Result<()> {
    if is_absolute_name(name) || name.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(PipelineError::PathTraversal {
            path: PathBuf::from(name),
        });
    }

    if name.contains('\0') {
        return Err(Violation::NullByte {
            name: name.escape_default().to_string(),
        }
        .into());
    }

    let depth = name
        .split(['/', '\\'])
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .count();
    if depth > limits.max_path_depth {
        return Err(Violation::PathTooDeep {
            depth,
            max: limits.max_path_depth,
        }
        .into());
    }

    Ok(())
}

/// Returns `true` if a Unix mode describes a symbolic link.
#[must_use]
pub const fn is_symlink_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFLNK
}

fn is_absolute_name(name: &str) -> bool {
    let bytes = name.as_bytes();
    name.starts_with(['/', '\\'])
        || (bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':')
}

pub(crate) fn malformed(err: zip::result::ZipError) -> PipelineError {
    Violation::MalformedArchive {
        reason: err.to_string(),
    }
    .into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::FilenameIssue;
    use crate::test_utils::ZipTestBuilder;
    use crate::test_utils::create_test_zip;
    use crate::test_utils::set_encryption_flag;

    fn upload(bytes: Vec<u8>) -> UploadedArchive {
        UploadedArchive::new("docs.zip", bytes)
    }

    #[test]
    fn test_accepts_plain_archive() {
        let limits = ArchiveLimits::default();
        let zip = create_test_zip(vec![("a.txt", b"hello"), ("dir/b.txt", b"world")]);
        let verdict = ArchiveValidator::new(&limits)
            .validate(&upload(zip))
            .unwrap();
        assert_eq!(verdict.sanitized_name, "docs.zip");
        assert_eq!(verdict.entry_count, 2);
        assert_eq!(verdict.declared_size, 10);
    }

    #[test]
    fn test_rejects_oversized_upload() {
        let limits = ArchiveLimits {
            max_upload_size: 10,
            ..ArchiveLimits::default()
        };
        let zip = create_test_zip(vec![("a.txt", b"hello")]);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::UploadTooLarge { max: 10, .. }
            })
        ));
    }

    #[test]
    fn test_rejects_bad_signature_before_filename() {
        let limits = ArchiveLimits::default();
        let upload = UploadedArchive::new(".hidden", b"GIF89a".to_vec());
        let result = ArchiveValidator::new(&limits).validate(&upload);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::BadSignature
            })
        ));
    }

    #[test]
    fn test_rejects_unsafe_filename() {
        let limits = ArchiveLimits::default();
        let zip = create_test_zip(vec![("a.txt", b"x")]);
        let upload = UploadedArchive::new(".hidden.zip", zip);
        let result = ArchiveValidator::new(&limits).validate(&upload);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::UnsafeFilename(FilenameIssue::Hidden)
            })
        ));
    }

    #[test]
    fn test_rejects_truncated_archive() {
        let limits = ArchiveLimits::default();
        let mut zip = create_test_zip(vec![("a.txt", b"hello")]);
        zip.truncate(zip.len() / 2);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::MalformedArchive { .. }
            })
        ));
    }

    #[test]
    fn test_rejects_traversal_entry() {
        let limits = ArchiveLimits::default();
        let zip = create_test_zip(vec![("ok.txt", b"x"), ("../../evil.txt", b"x")]);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(result, Err(PipelineError::PathTraversal { .. })));
    }

    #[test]
    fn test_rejects_too_many_entries() {
        let limits = ArchiveLimits {
            max_entries: 3,
            ..ArchiveLimits::default()
        };
        let zip = create_test_zip(vec![
            ("1.txt", b"1"),
            ("2.txt", b"2"),
            ("3.txt", b"3"),
            ("4.txt", b"4"),
        ]);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::TooManyEntries { count: 4, max: 3 }
            })
        ));
    }

    #[test]
    fn test_rejects_compression_bomb() {
        let limits = ArchiveLimits::default();
        let zeros = vec![0_u8; 1024 * 1024];
        let zip = ZipTestBuilder::new()
            .add_file_deflated("zeros.bin", &zeros)
            .build();
        assert!((zip.len() as u64) * 5 < zeros.len() as u64);

        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::DecompressedSizeExceeded { .. }
            })
        ));
    }

    #[test]
    fn test_rejects_symlink_entry() {
        let limits = ArchiveLimits::default();
        let zip = ZipTestBuilder::new()
            .add_file("a.txt", b"x")
            .add_symlink("link", "/etc/passwd")
            .build();
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::SymlinkEntry { .. }
            })
        ));
    }

    #[test]
    fn test_rejects_encrypted_entry() {
        let limits = ArchiveLimits::default();
        let mut zip = create_test_zip(vec![("secret.txt", b"classified")]);
        set_encryption_flag(&mut zip);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::EncryptedEntry { .. }
            })
        ));
    }

    #[test]
    fn test_rejects_nested_archive() {
        let limits = ArchiveLimits::default();
        let inner = create_test_zip(vec![("inner.txt", b"x")]);
        let zip = create_test_zip(vec![("bundle/inner.zip", &inner)]);
        let result = ArchiveValidator::new(&limits).validate(&upload(zip));
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::NestedArchive { .. }
            })
        ));
    }

    #[test]
    fn test_check_entry_name() {
        let limits = ArchiveLimits::default();
        assert!(check_entry_name("docs/index.md", &limits).is_ok());
        assert!(check_entry_name("./docs/index.md", &limits).is_ok());
        assert!(matches!(
            check_entry_name("/etc/passwd", &limits),
            Err(PipelineError::PathTraversal { .. })
        ));
        assert!(matches!(
            check_entry_name("\\windows\\system32", &limits),
            Err(PipelineError::PathTraversal { .. })
        ));
        assert!(matches!(
            check_entry_name("C:/boot.ini", &limits),
            Err(PipelineError::PathTraversal { .. })
        ));
        assert!(matches!(
            check_entry_name("a\\..\\..\\b", &limits),
            Err(PipelineError::PathTraversal { .. })
        ));
        assert!(matches!(
            check_entry_name("file\0.txt", &limits),
            Err(PipelineError::Validation {
                violation: Violation::NullByte { .. }
            })
        ));
        let deep = vec!["d"; 40].join("/");
        assert!(matches!(
            check_entry_name(&deep, &limits),
            Err(PipelineError::Validation {
                violation: Violation::PathTooDeep { depth: 40, .. }
            })
        ));
    }

    #[test]
    fn test_is_symlink_mode() {
        assert!(is_symlink_mode(0o120_777));
        assert!(!is_symlink_mode(0o100_644));
        assert!(!is_symlink_mode(0o040_755));
    }
}
