//! Filesystem writes for extracted entries.
//!
//! Directories are created owner-only and files are opened exclusively
//! without following symlinks, so nothing already on disk can redirect a
//! write.

use std::fs::DirBuilder;
use std::fs::OpenOptions;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Component;
use std::path::Path;

use crate::PipelineError;
use crate::Result;
use crate::Violation;
use crate::copy::CopyBuffer;
use crate::copy::copy_bounded;
use crate::security::QuotaTracker;

/// Permission bits for extracted directories.
pub const DIR_MODE: u32 = 0o700;
/// Permission bits for extracted files.
pub const FILE_MODE: u32 = 0o600;

/// Creates `relative` below `root` one component at a time, owner-only.
///
/// `root` itself is never created: once it is gone the call fails instead of
/// bringing it back. Existing directories are left as they are; an existing
/// symlink on the way is a traversal attempt.
///
/// # Errors
///
/// Returns an I/O error if `root` is missing or a component cannot be
/// created, and `PipelineError::PathTraversal` if a component is a symlink
/// or `relative` is not a plain relative path.
pub fn create_private_dir_in(root: &Path, relative: &Path) -> Result<()> {
    if !root.symlink_metadata()?.is_dir() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("extraction root is not a directory: {}", root.display()),
        )));
    }

    let mut builder = DirBuilder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }

    let traversal = || PipelineError::PathTraversal {
        path: relative.to_path_buf(),
    };
    let mut current = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => current.push(part),
            Component::CurDir => continue,
            _ => return Err(traversal()),
        }
        match builder.create(&current) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                let file_type = current.symlink_metadata()?.file_type();
                if file_type.is_symlink() {
                    return Err(traversal());
                }
                if !file_type.is_dir() {
                    return Err(PipelineError::Io(e));
                }
            }
            Err(e) => return Err(PipelineError::Io(e)),
        }
    }
    Ok(())
}

/// Streams one entry to `output_path` through the quota.
///
/// The file must not exist yet. On any error the partial file is removed.
///
/// # Errors
///
/// Returns `Violation::DuplicateEntry` if the path already exists, a quota
/// violation if a ceiling is crossed, or an I/O error.
pub fn write_entry<R: Read>(
    reader: &mut R,
    output_path: &Path,
    entry_name: &str,
    quota: &mut QuotaTracker,
    buffer: &mut CopyBuffer,
) -> Result<u64> {
    let file = open_exclusive(output_path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            PipelineError::from(Violation::DuplicateEntry {
                name: entry_name.to_string(),
            })
        } else {
            PipelineError::Io(e)
        }
    })?;

    let mut writer = BufWriter::with_capacity(64 * 1024, file);
    let result = copy_bounded(reader, &mut writer, buffer, quota, entry_name)
        .and_then(|written| writer.flush().map(|()| written).map_err(PipelineError::Io));

    match result {
        Ok(written) => {
            set_file_mode(output_path)?;
            Ok(written)
        }
        Err(e) => {
            drop(writer);
            let _ = std::fs::remove_file(output_path);
            Err(e)
        }
    }
}

fn open_exclusive(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(FILE_MODE).custom_flags(libc::O_NOFOLLOW);
    }
    options.open(path)
}

fn set_file_mode(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(FILE_MODE))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
