//! Validated relative path for an archive entry.

use std::path::Path;
use std::path::PathBuf;

use super::SandboxRoot;
use crate::ArchiveLimits;
use crate::PipelineError;
use crate::Result;
use crate::Violation;

/// A relative entry path that has been proven to stay inside a
/// [`SandboxRoot`].
///
/// `SafePath` represents a path that:
/// - Contains no NUL bytes
/// - Contains no `..` segments
/// - Has leading separators and drive prefixes stripped
/// - Has at most `max_path_depth` segments
/// - Resolves, through any directories already on disk, to a descendant of
///   the root
///
/// Both `/` and `\` are treated as separators, since archives built on
/// Windows store either.
///
/// There is no `From<PathBuf>` implementation; the only constructor is
/// [`SafePath::normalize`].
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::ArchiveLimits;
/// use sandconv_core::types::SafePath;
/// use sandconv_core::types::SandboxRoot;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = SandboxRoot::new("/tmp/sandbox")?;
/// let limits = ArchiveLimits::default();
///
/// let safe = SafePath::normalize("docs/./guide.md", &root, &limits)?;
/// assert_eq!(safe.as_path(), std::path::Path::new("docs/guide.md"));
///
/// assert!(SafePath::normalize("../etc/passwd", &root, &limits).is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafePath(PathBuf);

impl SafePath {
    /// Normalizes a raw entry name and checks it against the root.
    ///
    /// # Validation Steps
    ///
    /// 1. Reject NUL bytes
    /// 2. Strip leading separators and drive prefixes
    /// 3. Drop empty and `.` segments, reject `..`
    /// 4. Enforce the segment-count ceiling
    /// 5. Resolve against the root and verify containment
    ///
    /// # Errors
    ///
    /// - `PipelineError::PathTraversal` for `..` segments or a resolved path
    ///   outside the root
    /// - `PipelineError::Validation` for NUL bytes, excessive depth, or a name
    ///   that is empty after normalization
    pub fn normalize(raw: &str, root: &SandboxRoot, limits: &ArchiveLimits) -> Result<Self> {
        if raw.contains('\0') {
            return Err(Violation::NullByte {
                name: raw.escape_default().to_string(),
            }
            .into());
        }

        let mut normalized = PathBuf::new();
        let mut depth = 0_usize;

        for segment in strip_root(raw).split(['/', '\\']) {
            match segment {
                "" | "." => {}
                ".." => {
                    return Err(PipelineError::PathTraversal {
                        path: PathBuf::from(raw),
                    });
                }
                name => {
                    depth += 1;
                    normalized.push(name);
                }
            }
        }

        if depth > limits.max_path_depth {
            return Err(Violation::PathTooDeep {
                depth,
                max: limits.max_path_depth,
            }
            .into());
        }

        if depth == 0 {
            return Err(Violation::MalformedArchive {
                reason: format!("entry has an empty path: {raw:?}"),
            }
            .into());
        }

        let resolved = resolve(root, &normalized).ok_or_else(|| PipelineError::PathTraversal {
            path: PathBuf::from(raw),
        })?;
        if !root.contains(&resolved) {
            return Err(PipelineError::PathTraversal {
                path: PathBuf::from(raw),
            });
        }

        Ok(Self(normalized))
    }

    /// Returns the normalized relative path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Number of segments in the path.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.components().count()
    }
}

/// Strips leading separators and Windows drive prefixes, repeatedly.
fn strip_root(raw: &str) -> &str {
    let mut rest = raw;
    loop {
        let trimmed = rest.trim_start_matches(['/', '\\']);
        let bytes = trimmed.as_bytes();
        let trimmed = if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
            &trimmed[2..]
        } else {
            trimmed
        };
        if trimmed.len() == rest.len() {
            return rest;
        }
        rest = trimmed;
    }
}

/// Resolves `relative` under the root, following every component that
/// already exists on disk.
///
/// Returns `None` if an existing component cannot be resolved, such as a
/// dangling symlink.
fn resolve(root: &SandboxRoot, relative: &Path) -> Option<PathBuf> {
    let mut existing = root.as_path().to_path_buf();
    let mut components = relative.components();
    let mut remainder = PathBuf::new();

    for component in components.by_ref() {
        let next = existing.join(component);
        if next.symlink_metadata().is_ok() {
            existing = next;
        } else {
            remainder.push(component);
            break;
        }
    }
    remainder.extend(components);

    let canonical = existing.canonicalize().ok()?;
    Some(canonical.join(remainder))
}
