//! Subprocess results and bounded output capture.

use std::borrow::Cow;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;

/// Output captured from one stream, capped at a byte limit.
///
/// Bytes past the cap are read and discarded so the child never blocks on a
/// full pipe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    bytes: Vec<u8>,
    total: u64,
}

impl CapturedOutput {
    /// Retained bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Retained bytes as text, with invalid UTF-8 replaced.
    #[must_use]
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Total bytes the stream produced.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Returns `true` if bytes were discarded.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.total > self.bytes.len() as u64
    }
}

/// Result of running the converter to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubprocessOutcome {
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output.
    pub stdout: CapturedOutput,
    /// Captured standard error.
    pub stderr: CapturedOutput,
    /// Duration of the final attempt.
    pub elapsed: Duration,
    /// Attempts made, including the final one.
    pub attempts: u32,
}

impl SubprocessOutcome {
    /// Returns `true` if the process exited with status zero.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Reads `reader` to EOF, keeping at most `cap` bytes.
pub async fn capture_bounded<R>(reader: Option<R>, cap: usize) -> std::io::Result<CapturedOutput>
where
    R: AsyncRead + Unpin,
{
    let mut captured = CapturedOutput::default();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };

    let mut chunk = [0_u8; 8 * 1024];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        captured.total += n as u64;
        let room = cap.saturating_sub(captured.bytes.len());
        captured.bytes.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(captured)
}
