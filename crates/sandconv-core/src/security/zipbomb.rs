//! Zip bomb detection.

use crate::ArchiveLimits;
use crate::Result;
use crate::Violation;

/// Computes the effective decompression ceiling for an upload.
///
/// The ceiling is the smaller of `upload_size × max_compression_ratio` and
/// the absolute `max_decompressed_size`.
///
/// # Examples
///
/// ```
/// use sandconv_core::ArchiveLimits;
/// use sandconv_core::security::decompressed_ceiling;
///
/// let limits = ArchiveLimits::default();
/// assert_eq!(decompressed_ceiling(1_000, &limits), 5_000);
/// assert_eq!(
///     decompressed_ceiling(u64::MAX, &limits),
///     limits.max_decompressed_size
/// );
/// ```
#[must_use]
pub fn decompressed_ceiling(upload_size: u64, limits: &ArchiveLimits) -> u64 {
    upload_size
        .saturating_mul(limits.max_compression_ratio)
        .min(limits.max_decompressed_size)
}

/// Checks a running decompressed total against the ceiling.
///
/// # Errors
///
/// Returns `Violation::DecompressedSizeExceeded` if `total` is above
/// `ceiling`.
pub fn check_decompressed_total(total: u64, ceiling: u64) -> Result<()> {
    if total > ceiling {
        return Err(Violation::DecompressedSizeExceeded { total, max: ceiling }.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineError;

    #[test]
    fn test_ceiling_relative_to_upload() {
        let limits = ArchiveLimits::default();
        assert_eq!(decompressed_ceiling(10 * 1024 * 1024, &limits), 50 * 1024 * 1024);
    }

    #[test]
    fn test_ceiling_capped_by_absolute_limit() {
        let limits = ArchiveLimits::default();
        assert_eq!(
            decompressed_ceiling(200 * 1024 * 1024, &limits),
            500 * 1024 * 1024
        );
    }

    #[test]
    fn test_ceiling_zero_upload() {
        let limits = ArchiveLimits::default();
        assert_eq!(decompressed_ceiling(0, &limits), 0);
    }

    #[test]
    fn test_check_total_at_ceiling_passes() {
        assert!(check_decompressed_total(5_000, 5_000).is_ok());
    }

    #[test]
    fn test_check_total_over_ceiling() {
        let result = check_decompressed_total(5_001, 5_000);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::DecompressedSizeExceeded {
                    total: 5_001,
                    max: 5_000
                }
            })
        ));
    }
}
