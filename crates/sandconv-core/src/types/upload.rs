//! Uploaded archive value.

use std::sync::Arc;

/// An archive received from a caller, together with its declared filename.
///
/// The bytes are shared behind an `Arc` so they can be moved onto blocking
/// worker threads without copying. Nothing in this type is trusted: the name
/// and contents are validated by [`crate::security::ArchiveValidator`], and
/// the content type is carried for logging only.
#[derive(Debug, Clone)]
pub struct UploadedArchive {
    filename: String,
    content_type: Option<String>,
    bytes: Arc<[u8]>,
}

impl UploadedArchive {
    /// Wraps raw upload bytes and the caller-supplied filename.
    pub fn new(filename: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            filename: filename.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Attaches the caller's declared content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Declared content type, if any. Never used for validation.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Filename as declared by the caller, unsanitized.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Raw archive bytes.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Shared handle to the raw archive bytes.
    #[must_use]
    pub fn shared_bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }

    /// Upload size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Returns `true` if the upload holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
