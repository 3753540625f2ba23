//! Bounded file copy with a reusable buffer.
//!
//! Extraction never trusts declared entry sizes. Every chunk is charged to a
//! [`QuotaTracker`] before it reaches the writer, so a lying header cannot
//! push more than one chunk past a ceiling.

use std::io::Read;
use std::io::Write;
use std::io::{self};

use crate::PipelineError;
use crate::security::QuotaTracker;

/// Buffer size for I/O operations (64KB).
const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Stack-allocated buffer for file copying.
///
/// The buffer is reusable across every entry of one extraction.
///
/// # Examples
///
/// ```
/// use sandconv_core::ArchiveLimits;
/// use sandconv_core::copy::CopyBuffer;
/// use sandconv_core::copy::copy_bounded;
/// use sandconv_core::security::QuotaTracker;
///
/// # fn main() -> Result<(), sandconv_core::PipelineError> {
/// let mut buffer = CopyBuffer::new();
/// let mut quota = QuotaTracker::for_upload(&ArchiveLimits::default(), 1_000);
/// let mut output = Vec::new();
///
/// let copied = copy_bounded(&mut &b"hello"[..], &mut output, &mut buffer, &mut quota, "hello.txt")?;
/// assert_eq!(copied, 5);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CopyBuffer {
    #[allow(clippy::large_stack_arrays)]
    buf: [u8; COPY_BUFFER_SIZE],
}

impl CopyBuffer {
    /// Creates a new zeroed copy buffer.
    #[inline]
    #[must_use]
    #[allow(clippy::large_stack_arrays)]
    pub fn new() -> Self {
        Self {
            buf: [0u8; COPY_BUFFER_SIZE],
        }
    }

    /// Returns the buffer size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        COPY_BUFFER_SIZE
    }
}

impl Default for CopyBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Copies `reader` into `writer`, charging each chunk to `quota` first.
///
/// Returns the number of bytes copied for this entry.
///
/// # Errors
///
/// Returns an error if:
/// - Reading from the source fails
/// - Writing to the destination fails
/// - The entry or the running total would pass its ceiling
pub fn copy_bounded<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    buffer: &mut CopyBuffer,
    quota: &mut QuotaTracker,
    entry_name: &str,
) -> Result<u64, PipelineError> {
    let mut total: u64 = 0;

    loop {
        let bytes_read = match reader.read(&mut buffer.buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PipelineError::Io(e)),
        };

        quota.record_bytes(entry_name, total, bytes_read as u64)?;

        writer
            .write_all(&buffer.buf[..bytes_read])
            .map_err(PipelineError::Io)?;

        total += bytes_read as u64;
    }

    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ArchiveLimits;
    use crate::Violation;
    use std::io::Cursor;

    fn quota(max_entry: u64, ceiling: u64) -> QuotaTracker {
        let limits = ArchiveLimits {
            max_entry_size: max_entry,
            max_decompressed_size: ceiling,
            max_compression_ratio: 1,
            ..ArchiveLimits::default()
        };
        QuotaTracker::for_upload(&limits, ceiling)
    }

    #[test]
    fn test_copy_buffer_new() {
        let buffer = CopyBuffer::new();
        assert_eq!(buffer.size(), 64 * 1024);
    }

    #[test]
    fn test_copy_empty_source() {
        let mut buffer = CopyBuffer::new();
        let mut quota = quota(10, 10);
        let mut input = Cursor::new(Vec::<u8>::new());
        let mut output = Vec::new();

        let copied = copy_bounded(&mut input, &mut output, &mut buffer, &mut quota, "e").unwrap();
        assert_eq!(copied, 0);
        assert!(output.is_empty());
    }

    #[test]
    fn test_copy_multiple_chunks() {
        let mut buffer = CopyBuffer::new();
        let input_data = vec![0x55u8; COPY_BUFFER_SIZE * 3 + 1000];
        let size = input_data.len() as u64;
        let mut quota = quota(size, size);
        let mut input = Cursor::new(&input_data);
        let mut output = Vec::new();

        let copied = copy_bounded(&mut input, &mut output, &mut buffer, &mut quota, "e").unwrap();
        assert_eq!(copied, size);
        assert_eq!(output, input_data);
        assert_eq!(quota.bytes(), size);
    }

    #[test]
    fn test_copy_stops_before_writing_past_entry_limit() {
        let mut buffer = CopyBuffer::new();
        let input_data = vec![0xAAu8; COPY_BUFFER_SIZE * 2];
        let mut quota = quota(COPY_BUFFER_SIZE as u64, u64::MAX / 2);
        let mut input = Cursor::new(&input_data);
        let mut output = Vec::new();

        let result = copy_bounded(&mut input, &mut output, &mut buffer, &mut quota, "big.bin");
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::EntryTooLarge { .. }
            })
        ));
        assert_eq!(output.len(), COPY_BUFFER_SIZE);
    }

    #[test]
    fn test_copy_stops_at_cumulative_ceiling() {
        let mut buffer = CopyBuffer::new();
        let mut quota = quota(1_000, 1_000);

        let mut output = Vec::new();
        copy_bounded(&mut Cursor::new(vec![1u8; 600]), &mut output, &mut buffer, &mut quota, "a")
            .unwrap();
        let result =
            copy_bounded(&mut Cursor::new(vec![2u8; 600]), &mut output, &mut buffer, &mut quota, "b");
        assert!(matches!(
            result,
            Err(PipelineError::Validation {
                violation: Violation::DecompressedSizeExceeded { .. }
            })
        ));
        assert_eq!(output.len(), 600);
    }

    #[test]
    fn test_copy_reusable_buffer() {
        let mut buffer = CopyBuffer::new();
        let mut quota = quota(1_000, 1_000);

        let mut output1 = Vec::new();
        copy_bounded(&mut Cursor::new(b"First copy"), &mut output1, &mut buffer, &mut quota, "1")
            .unwrap();
        assert_eq!(output1, b"First copy");

        let mut output2 = Vec::new();
        copy_bounded(&mut Cursor::new(b"Second"), &mut output2, &mut buffer, &mut quota, "2")
            .unwrap();
        assert_eq!(output2, b"Second");
    }
}
