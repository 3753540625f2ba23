//! Per-request private workspaces.
//!
//! Each request gets a fresh directory named `{prefix}-{uuid}` under the
//! configured base directory, created owner-only and never reused. The
//! [`Workspace`] guard removes it when released or dropped, whatever the
//! request outcome.

use std::fs::DirBuilder;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;
use uuid::Uuid;

use crate::PipelineError;
use crate::Result;
use crate::WorkspaceConfig;
use crate::extraction::writer::create_private_dir_in;
use crate::types::SandboxRoot;

/// Subdirectory that receives the extracted archive.
pub const EXTRACTED_DIR: &str = "extracted";
/// Subdirectory the converter writes into.
pub const OUTPUT_DIR: &str = "output";

/// Creates and sweeps workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    config: WorkspaceConfig,
}

impl WorkspaceManager {
    /// Creates a manager for `config`.
    #[must_use]
    pub fn new(config: WorkspaceConfig) -> Self {
        Self { config }
    }

    /// Returns the base directory workspaces are created under.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.config.base_dir
    }

    /// Allocates a fresh workspace.
    ///
    /// The directory is created exclusively: a name collision is an error,
    /// never a reuse.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::WorkspaceAllocation` if the base directory or
    /// the workspace cannot be created.
    pub fn acquire(&self) -> Result<Workspace> {
        let id = Uuid::new_v4();
        let path = self
            .config
            .base_dir
            .join(format!("{}-{id}", self.config.prefix));
        let allocation_error = |source| PipelineError::WorkspaceAllocation {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.config.base_dir).map_err(allocation_error)?;

        let mut builder = DirBuilder::new();
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(self.config.mode);
        }
        builder.create(&path).map_err(allocation_error)?;

        // Guard from here on so a failure below still removes the directory.
        let workspace = Workspace {
            id,
            path: path.clone(),
            released: false,
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(self.config.mode))
                .map_err(allocation_error)?;
        }

        for sub in [EXTRACTED_DIR, OUTPUT_DIR] {
            create_private_dir_in(&path, Path::new(sub)).map_err(|e| match e {
                PipelineError::Io(source) => allocation_error(source),
                other => other,
            })?;
        }

        debug!(workspace = %id, path = %path.display(), "workspace acquired");
        Ok(workspace)
    }

    /// Removes leftover workspaces matching the prefix that are older than
    /// `min_age`.
    ///
    /// Intended for startup, to clean up after a crash. Only entries whose
    /// name is `{prefix}-{uuid}` are considered. Errors are logged, never
    /// returned.
    ///
    /// Returns the number of directories removed.
    pub fn sweep_orphans(&self, min_age: Duration) -> usize {
        let entries = match std::fs::read_dir(&self.config.base_dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(base = %self.config.base_dir.display(), error = %e, "cannot read workspace base");
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;

        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if !self.is_workspace_name(name) {
                continue;
            }

            let Ok(metadata) = entry.path().symlink_metadata() else {
                continue;
            };
            if !metadata.is_dir() {
                continue;
            }
            let age = metadata
                .modified()
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .unwrap_or_default();
            if age < min_age {
                continue;
            }

            match std::fs::remove_dir_all(entry.path()) {
                Ok(()) => {
                    removed += 1;
                    info!(workspace = %name, "removed orphaned workspace");
                }
                Err(e) => warn!(workspace = %name, error = %e, "failed to remove orphaned workspace"),
            }
        }

        removed
    }

    fn is_workspace_name(&self, name: &str) -> bool {
        name.strip_prefix(self.config.prefix.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|id| Uuid::parse_str(id).is_ok())
    }
}

/// A private directory owned by one request.
///
/// Dropping the guard removes the directory. Prefer [`Workspace::release`]
/// on the normal path so removal can run on a blocking thread.
#[derive(Debug)]
pub struct Workspace {
    id: Uuid,
    path: PathBuf,
    released: bool,
}

impl Workspace {
    /// Unique identifier of this workspace.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory the archive is extracted into, as a validated root.
    pub fn extraction_root(&self) -> Result<SandboxRoot> {
        SandboxRoot::new(self.path.join(EXTRACTED_DIR))
    }

    /// Directory the converter writes into.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.path.join(OUTPUT_DIR)
    }

    /// Removes the workspace and everything in it.
    ///
    /// Never fails: removal errors are logged, since the request outcome has
    /// already been decided.
    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!(workspace = %self.id, "workspace released"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(workspace = %self.id, "workspace already removed");
            }
            Err(e) => error!(
                workspace = %self.id,
                path = %self.path.display(),
                error = %e,
                "failed to remove workspace"
            ),
        }
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(base: &Path) -> WorkspaceManager {
        WorkspaceManager::new(WorkspaceConfig {
            base_dir: base.to_path_buf(),
            ..WorkspaceConfig::default()
        })
    }

    #[test]
    fn test_acquire_creates_layout() {
        let temp = TempDir::new().unwrap();
        let workspace = manager(temp.path()).acquire().unwrap();

        let name = workspace.path().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("swift-conv-"));
        assert!(workspace.path().join(EXTRACTED_DIR).is_dir());
        assert!(workspace.output_dir().is_dir());
        assert!(workspace.extraction_root().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp = TempDir::new().unwrap();
        let workspace = manager(temp.path()).acquire().unwrap();
        let mode = std::fs::metadata(workspace.path())
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);
    }

    #[test]
    fn test_workspaces_are_distinct() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let a = manager.acquire().unwrap();
        let b = manager.acquire().unwrap();
        assert_ne!(a.path(), b.path());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_release_removes_directory() {
        let temp = TempDir::new().unwrap();
        let workspace = manager(temp.path()).acquire().unwrap();
        let path = workspace.path().to_path_buf();
        std::fs::write(workspace.output_dir().join("out.md"), b"x").unwrap();

        workspace.release();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_removes_directory() {
        let temp = TempDir::new().unwrap();
        let path = {
            let workspace = manager(temp.path()).acquire().unwrap();
            workspace.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_release_after_external_removal_does_not_panic() {
        let temp = TempDir::new().unwrap();
        let workspace = manager(temp.path()).acquire().unwrap();
        std::fs::remove_dir_all(workspace.path()).unwrap();
        workspace.release();
    }

    #[test]
    fn test_acquire_fails_when_base_is_a_file() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let result = manager(&file).acquire();
        assert!(matches!(
            result,
            Err(PipelineError::WorkspaceAllocation { .. })
        ));
    }

    #[test]
    fn test_sweep_orphans_matches_prefix_only() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());

        let orphan = temp.path().join(format!("swift-conv-{}", Uuid::new_v4()));
        std::fs::create_dir(&orphan).unwrap();
        let unrelated = temp.path().join("swift-conv-notauuid");
        std::fs::create_dir(&unrelated).unwrap();
        let other = temp.path().join("keep-me");
        std::fs::create_dir(&other).unwrap();

        assert_eq!(manager.sweep_orphans(Duration::ZERO), 1);
        assert!(!orphan.exists());
        assert!(unrelated.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_sweep_orphans_respects_min_age() {
        let temp = TempDir::new().unwrap();
        let manager = manager(temp.path());
        let workspace = manager.acquire().unwrap();

        assert_eq!(manager.sweep_orphans(Duration::from_secs(3600)), 0);
        assert!(workspace.path().exists());
    }

    #[test]
    fn test_sweep_missing_base_returns_zero() {
        let manager = manager(Path::new("/nonexistent/sandconv/base"));
        assert_eq!(manager.sweep_orphans(Duration::ZERO), 0);
    }
}
