//! Extraction quota tracking and validation.

use super::zipbomb::check_decompressed_total;
use super::zipbomb::decompressed_ceiling;
use crate::ArchiveLimits;
use crate::Result;
use crate::Violation;

/// Tracks resource usage while an archive is scanned or extracted.
///
/// A tracker is created per upload and carries the ceilings derived from
/// that upload, so every check is against the same numbers.
#[derive(Debug)]
pub struct QuotaTracker {
    entries: usize,
    bytes: u64,
    nested_archives: usize,
    max_entries: usize,
    max_entry_size: u64,
    max_nested_archives: usize,
    ceiling: u64,
}

impl QuotaTracker {
    /// Creates a tracker for an upload of `upload_size` bytes.
    #[must_use]
    pub fn for_upload(limits: &ArchiveLimits, upload_size: u64) -> Self {
        Self {
            entries: 0,
            bytes: 0,
            nested_archives: 0,
            max_entries: limits.max_entries,
            max_entry_size: limits.max_entry_size,
            max_nested_archives: limits.max_nested_archives,
            ceiling: decompressed_ceiling(upload_size, limits),
        }
    }

    /// Records one more entry.
    ///
    /// # Errors
    ///
    /// Returns `Violation::TooManyEntries` once the count passes the limit.
    pub fn record_entry(&mut self) -> Result<()> {
        self.entries += 1;
        if self.entries > self.max_entries {
            return Err(Violation::TooManyEntries {
                count: self.entries,
                max: self.max_entries,
            }
            .into());
        }
        Ok(())
    }

    /// Records a nested archive entry.
    ///
    /// # Errors
    ///
    /// Returns `Violation::NestedArchive` once the count passes the limit.
    pub fn record_nested_archive(&mut self, name: &str) -> Result<()> {
        self.nested_archives += 1;
        if self.nested_archives > self.max_nested_archives {
            return Err(Violation::NestedArchive {
                name: name.to_string(),
                max: self.max_nested_archives,
            }
            .into());
        }
        Ok(())
    }

    /// Records `chunk` more bytes for an entry that has already produced
    /// `entry_so_far` bytes.
    ///
    /// Used both for declared sizes during pre-scan and for bytes actually
    /// written during extraction.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry or the running total passes its ceiling,
    /// or if the accounting overflows.
    pub fn record_bytes(&mut self, name: &str, entry_so_far: u64, chunk: u64) -> Result<()> {
        let entry_total = entry_so_far
            .checked_add(chunk)
            .ok_or(Violation::IntegerOverflow)?;
        if entry_total > self.max_entry_size {
            return Err(Violation::EntryTooLarge {
                name: name.to_string(),
                size: entry_total,
                max: self.max_entry_size,
            }
            .into());
        }

        self.bytes = self
            .bytes
            .checked_add(chunk)
            .ok_or(Violation::IntegerOverflow)?;
        check_decompressed_total(self.bytes, self.ceiling)
    }

    /// Returns the number of entries recorded.
    #[must_use]
    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Returns the total bytes recorded.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the decompression ceiling in force.
    #[must_use]
    pub fn ceiling(&self) -> u64 {
        self.ceiling
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::PipelineError;

    fn limits() -> ArchiveLimits {
        ArchiveLimits {
            max_entries: 2,
            max_entry_size: 1_000,
            max_decompressed_size: 1_500,
            max_compression_ratio: 5,
            max_nested_archives: 0,
            ..ArchiveLimits::default()
        }
    }

    #[test]
    fn test_quota_tracker_new() {
        let tracker = QuotaTracker::for_upload(&limits(), 100);
        assert_eq!(tracker.entries(), 0);
        assert_eq!(tracker.bytes(), 0);
        assert_eq!(tracker.ceiling(), 500);
    }

    #[test]
    fn test_quota_tracker_exceed_entry_count() {
        let mut tracker = QuotaTracker::for_upload(&limits(), 1_000);
        assert!(tracker.record_entry().is_ok());
        assert!(tracker.record_entry().is_ok());
        let result = tracker.record_entry();
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::TooManyEntries { count: 3, max: 2 }
            })
        ));
    }

    #[test]
    fn test_quota_tracker_exceed_total_size() {
        let mut tracker = QuotaTracker::for_upload(&limits(), 1_000);
        assert_eq!(tracker.ceiling(), 1_500);
        assert!(tracker.record_bytes("a", 0, 800).is_ok());
        let result = tracker.record_bytes("b", 0, 800);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::DecompressedSizeExceeded { .. }
            })
        ));
    }

    #[test]
    fn test_quota_tracker_exceed_entry_size_across_chunks() {
        let mut tracker = QuotaTracker::for_upload(&limits(), 1_000);
        assert!(tracker.record_bytes("big", 0, 600).is_ok());
        let result = tracker.record_bytes("big", 600, 600);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::EntryTooLarge { size: 1_200, .. }
            })
        ));
    }

    #[test]
    fn test_quota_tracker_nested_archives() {
        let mut tracker = QuotaTracker::for_upload(&limits(), 1_000);
        let result = tracker.record_nested_archive("inner.zip");
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::NestedArchive { max: 0, .. }
            })
        ));
    }

    #[test]
    fn test_quota_tracker_overflow() {
        let mut tracker = QuotaTracker::for_upload(&limits(), 1_000);
        let result = tracker.record_bytes("x", u64::MAX, 1);
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::IntegerOverflow
            })
        ));
    }
}
