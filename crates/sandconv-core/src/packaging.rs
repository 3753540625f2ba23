//! Packaging of converter output into a single archive.

use std::io::Cursor;
use std::io::Write;
use std::path::Path;

use tracing::debug;
use tracing::warn;
use walkdir::WalkDir;
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::PipelineError;
use crate::Result;

/// The packaged conversion result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputArchive {
    bytes: Vec<u8>,
    files: Vec<String>,
    uncompressed_bytes: u64,
}

impl OutputArchive {
    /// ZIP-encoded archive.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the archive, returning its bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Relative paths of the packaged files, in archive order.
    #[must_use]
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Sum of packaged file sizes before compression.
    #[must_use]
    pub fn uncompressed_bytes(&self) -> u64 {
        self.uncompressed_bytes
    }

    /// Archive size in bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Returns `true` if the archive holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Collects converter output files into an [`OutputArchive`].
///
/// Only regular files whose extension is on the list are packaged; symlinks
/// are skipped and never followed. Entries are added in sorted path order
/// with fixed timestamps, so the same directory always packages to the same
/// bytes.
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::packaging::ResultAssembler;
/// use std::path::Path;
///
/// # fn main() -> Result<(), sandconv_core::PipelineError> {
/// let extensions = vec!["md".to_string()];
/// let archive = ResultAssembler::new(&extensions).collect(Path::new("/tmp/out"))?;
/// println!("{} files", archive.files().len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ResultAssembler<'a> {
    extensions: &'a [String],
}

impl<'a> ResultAssembler<'a> {
    /// Creates an assembler accepting `extensions` (without the dot).
    #[must_use]
    pub fn new(extensions: &'a [String]) -> Self {
        Self { extensions }
    }

    /// Returns `true` if `path` has an accepted extension.
    ///
    /// Comparison is case-insensitive.
    #[must_use]
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.extensions
                    .iter()
                    .any(|accepted| accepted.eq_ignore_ascii_case(ext))
            })
    }

    /// Packages every accepted file under `dir`.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::EmptyResult` if no file qualifies, and
    /// `PipelineError::Packaging` if the tree cannot be walked or the archive
    /// cannot be written.
    pub fn collect(&self, dir: &Path) -> Result<OutputArchive> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(0o644)
            .last_modified_time(zip::DateTime::default());

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        let mut files = Vec::new();
        let mut uncompressed_bytes = 0_u64;

        let walker = WalkDir::new(dir)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1);

        for entry in walker {
            let entry = entry.map_err(|e| PipelineError::Packaging(format!("failed to walk output: {e}")))?;
            let file_type = entry.file_type();

            if file_type.is_symlink() {
                warn!(path = %entry.path().display(), "skipping symlink in converter output");
                continue;
            }
            if !file_type.is_file() || !self.accepts(entry.path()) {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(dir)
                .map_err(|e| PipelineError::Packaging(e.to_string()))?;
            let name = zip_entry_name(relative)?;

            let data = std::fs::read(entry.path())
                .map_err(|e| PipelineError::Packaging(format!("failed to read {name}: {e}")))?;
            zip.start_file(name.as_str(), options)
                .map_err(|e| PipelineError::Packaging(format!("failed to add {name}: {e}")))?;
            zip.write_all(&data)
                .map_err(|e| PipelineError::Packaging(format!("failed to write {name}: {e}")))?;

            debug!(file = %name, size = data.len(), "packaged");
            uncompressed_bytes += data.len() as u64;
            files.push(name);
        }

        if files.is_empty() {
            return Err(PipelineError::EmptyResult);
        }

        let bytes = zip
            .finish()
            .map_err(|e| PipelineError::Packaging(format!("failed to finish archive: {e}")))?
            .into_inner();

        Ok(OutputArchive {
            bytes,
            files,
            uncompressed_bytes,
        })
    }
}

/// ZIP entry names always use `/` as the separator.
fn zip_entry_name(path: &Path) -> Result<String> {
    let segments = path
        .components()
        .map(|component| {
            component.as_os_str().to_str().ok_or_else(|| {
                PipelineError::Packaging(format!("path is not valid UTF-8: {}", path.display()))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(segments.join("/"))
}
