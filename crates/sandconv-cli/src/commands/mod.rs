//! Subcommand implementations.

pub mod completion;
pub mod convert;
pub mod probe;
pub mod sweep;
pub mod validate;

use std::path::Path;

use anyhow::Result;
use sandconv_core::ArchiveLimits;
use sandconv_core::PipelineError;
use sandconv_core::Violation;

use crate::error::convert_pipeline_error;

/// Name checked by the filename rules: `--filename` if given, else the
/// archive's own file name.
pub(crate) fn upload_name(filename: Option<&str>, archive: &Path) -> String {
    filename.map_or_else(
        || {
            archive
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        },
        str::to_string,
    )
}

/// Rejects an upload from its on-disk size, before any byte is read.
pub(crate) fn check_upload_size(archive: &Path, len: u64, limits: &ArchiveLimits) -> Result<()> {
    if len > limits.max_upload_size {
        let violation = Violation::UploadTooLarge {
            size: len,
            max: limits.max_upload_size,
        };
        return Err(convert_pipeline_error(PipelineError::from(violation), archive));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_name_prefers_override() {
        assert_eq!(upload_name(Some("real.zip"), Path::new("/tmp/x.bin")), "real.zip");
        assert_eq!(upload_name(None, Path::new("/tmp/docs.zip")), "docs.zip");
    }

    #[test]
    fn test_check_upload_size() {
        let limits = ArchiveLimits {
            max_upload_size: 1024,
            ..ArchiveLimits::default()
        };
        assert!(check_upload_size(Path::new("docs.zip"), 1024, &limits).is_ok());

        let err = check_upload_size(Path::new("docs.zip"), 1025, &limits).unwrap_err();
        let msg = format!("{err:?}");
        assert!(msg.contains("docs.zip"));
        assert!(msg.contains("--max-upload-size"));
    }
}
