//! Container magic-number check.

use crate::Result;
use crate::Violation;

/// Leading bytes accepted as a ZIP container: local file header, empty
/// archive end record, and spanned archive marker.
pub const ZIP_SIGNATURES: [&[u8; 4]; 3] = [b"PK\x03\x04", b"PK\x05\x06", b"PK\x07\x08"];

/// Checks that `bytes` starts with a known ZIP signature.
///
/// # Errors
///
/// Returns `Violation::EmptyUpload` for empty input and
/// `Violation::BadSignature` when no signature matches.
pub fn check_signature(bytes: &[u8]) -> Result<()> {
    if bytes.is_empty() {
        return Err(Violation::EmptyUpload.into());
    }
    if ZIP_SIGNATURES
        .iter()
        .any(|signature| bytes.starts_with(signature.as_slice()))
    {
        Ok(())
    } else {
        Err(Violation::BadSignature.into())
    }
}
