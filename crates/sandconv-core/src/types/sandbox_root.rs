//! Validated extraction root directory type.

use std::path::Path;
use std::path::PathBuf;

use crate::PipelineError;
use crate::Result;

/// The directory an archive is extracted into.
///
/// A `SandboxRoot` always:
/// - Exists on the filesystem
/// - Is a directory (not a file)
/// - Is writable by the current process
/// - Is held as an absolute canonical path
///
/// Every extracted path must resolve to a descendant of this directory.
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::types::SandboxRoot;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let root = SandboxRoot::new("/tmp/swift-conv-1234/extracted")?;
/// println!("Extracting to: {}", root.as_path().display());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxRoot(PathBuf);

impl SandboxRoot {
    /// Creates a new `SandboxRoot` after validating the path.
    ///
    /// The path is canonicalized, so a root reached through a symlink is
    /// stored as its target.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The path does not exist
    /// - The path exists but is not a directory
    /// - The path cannot be canonicalized
    /// - The directory is not writable (on Unix)
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let canonical = path.canonicalize().map_err(|e| {
            PipelineError::Io(std::io::Error::new(
                e.kind(),
                format!("failed to canonicalize sandbox root {}: {e}", path.display()),
            ))
        })?;

        if !canonical.is_dir() {
            return Err(PipelineError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("sandbox root is not a directory: {}", path.display()),
            )));
        }

        #[cfg(unix)]
        {
            use std::ffi::CString;
            use std::os::unix::ffi::OsStrExt;

            let path_cstring = CString::new(canonical.as_os_str().as_bytes()).map_err(|_| {
                PipelineError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "path contains null byte",
                ))
            })?;

            // SAFETY: access() is safe to call with a valid C string.
            // The pointer is valid for the duration of the call.
            // access() does not modify the string and returns immediately.
            #[allow(unsafe_code)]
            let result = unsafe { libc::access(path_cstring.as_ptr(), libc::W_OK) };

            if result != 0 {
                return Err(PipelineError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    format!("sandbox root is not writable: {}", canonical.display()),
                )));
            }
        }

        Ok(Self(canonical))
    }

    /// Returns the canonical root path.
    #[inline]
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Joins a validated relative path onto the root.
    #[inline]
    #[must_use]
    pub fn join(&self, safe_path: &super::SafePath) -> PathBuf {
        self.0.join(safe_path.as_path())
    }

    /// Returns `true` if `path` is the root or one of its descendants.
    ///
    /// The check is lexical; callers must pass an already-resolved path.
    #[inline]
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.0)
    }
}

impl AsRef<Path> for SandboxRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sandbox_root_valid() {
        let temp = TempDir::new().unwrap();
        let root = SandboxRoot::new(temp.path()).unwrap();
        assert!(root.as_path().is_absolute());
        assert_eq!(root.as_path(), temp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_sandbox_root_nonexistent() {
        let result = SandboxRoot::new("/nonexistent/sandbox/root/12345");
        assert!(matches!(result, Err(PipelineError::Io(_))));
    }

    #[test]
    fn test_sandbox_root_is_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file.txt");
        std::fs::write(&file, b"x").unwrap();

        let err = SandboxRoot::new(&file).unwrap_err();
        assert!(err.to_string().contains("not a directory"));
    }

    #[test]
    fn test_contains() {
        let temp = TempDir::new().unwrap();
        let root = SandboxRoot::new(temp.path()).unwrap();
        assert!(root.contains(&root.as_path().join("a/b.txt")));
        assert!(root.contains(root.as_path()));
        assert!(!root.contains(Path::new("/etc/passwd")));
    }

    #[cfg(unix)]
    #[test]
    fn test_sandbox_root_through_symlink_is_canonical() {
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let root = SandboxRoot::new(&link).unwrap();
        assert_eq!(root.as_path(), real.canonicalize().unwrap());
    }
}
