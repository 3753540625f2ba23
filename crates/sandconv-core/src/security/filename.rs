//! Uploaded filename sanitization.

use crate::FilenameIssue;
use crate::Result;
use crate::Violation;

/// Punctuation allowed in an uploaded filename, besides ASCII alphanumerics.
const ALLOWED_PUNCTUATION: &str = "-_.():![]&<>@#$%^+=,;";

/// Reduces a caller-supplied filename to a safe basename.
///
/// Directory components are stripped using both `/` and `\` as separators.
/// The remaining name must be non-empty, within `max_len` characters, drawn
/// from a restricted character set, and not hidden. AppleDouble resource
/// fork names such as `._Guide.doccarchive` are accepted.
///
/// # Errors
///
/// Returns `Violation::UnsafeFilename` describing the first problem found.
///
/// # Examples
///
/// ```
/// use sandconv_core::security::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../uploads/Docs.zip", 255).unwrap(), "Docs.zip");
/// assert!(sanitize_filename(".bashrc", 255).is_err());
/// ```
pub fn sanitize_filename(name: &str, max_len: usize) -> Result<String> {
    if name.is_empty() {
        return Err(reject(FilenameIssue::Empty));
    }
    if name.contains('\0') {
        return Err(reject(FilenameIssue::NullByte));
    }
    if name.chars().any(char::is_control) {
        return Err(reject(FilenameIssue::ControlCharacter));
    }

    let basename = name.rsplit(['/', '\\']).next().unwrap_or_default();
    if basename.is_empty() {
        return Err(reject(FilenameIssue::Empty));
    }

    let len = basename.chars().count();
    if len > max_len {
        return Err(reject(FilenameIssue::TooLong { len, max: max_len }));
    }

    let mut unsafe_chars: Vec<char> = basename
        .chars()
        .filter(|c| !c.is_ascii_alphanumeric() && !ALLOWED_PUNCTUATION.contains(*c))
        .collect();
    if !unsafe_chars.is_empty() {
        unsafe_chars.sort_unstable();
        unsafe_chars.dedup();
        return Err(reject(FilenameIssue::UnsafeCharacters(unsafe_chars)));
    }

    if basename.starts_with('.') && !is_resource_fork(basename) {
        return Err(reject(FilenameIssue::Hidden));
    }

    Ok(basename.to_string())
}

/// `._name.ext`, as written by macOS alongside extended attributes.
fn is_resource_fork(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() >= 3 && parts[0].is_empty() && parts[1].starts_with('_') && parts[1].len() > 1
}

fn reject(issue: FilenameIssue) -> crate::PipelineError {
    Violation::UnsafeFilename(issue).into()
}
