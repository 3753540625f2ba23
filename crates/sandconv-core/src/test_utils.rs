//! Test utilities for building upload archives and fake converters.
//!
//! # Panics
//!
//! All functions in this module may panic on I/O errors since they are
//! designed for test use only where panics are acceptable.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::io::Cursor;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use zip::write::SimpleFileOptions;

/// General purpose flag bit marking an entry as encrypted.
const ENCRYPTED_FLAG: u16 = 0x0001;
const LOCAL_HEADER: &[u8; 4] = b"PK\x03\x04";
const CENTRAL_HEADER: &[u8; 4] = b"PK\x01\x02";

/// Creates an in-memory ZIP archive from a list of entries.
///
/// Each entry is a tuple of (path, content). Files are stored uncompressed
/// with mode 0o644.
///
/// # Examples
///
/// ```
/// use sandconv_core::test_utils::create_test_zip;
///
/// let zip_data = create_test_zip(vec![("file.txt", b"hello"), ("dir/nested.txt", b"world")]);
/// ```
#[must_use]
pub fn create_test_zip(entries: Vec<(&str, &[u8])>) -> Vec<u8> {
    entries
        .into_iter()
        .fold(ZipTestBuilder::new(), |builder, (path, data)| {
            builder.add_file(path, data)
        })
        .build()
}

/// Creates a stored ZIP archive with `count` empty entries.
#[must_use]
pub fn create_zip_with_entries(count: usize) -> Vec<u8> {
    (0..count)
        .fold(ZipTestBuilder::new(), |builder, index| {
            builder.add_file(&format!("entry-{index:05}.txt"), b"")
        })
        .build()
}

/// Marks every entry of a ZIP archive as encrypted, in place.
///
/// Sets bit 0 of the general purpose flag in each local and central
/// directory header. The entry data itself is left as is.
pub fn set_encryption_flag(zip: &mut [u8]) {
    let mut offset = 0;
    while offset + 4 <= zip.len() {
        let flag_offset = match &zip[offset..offset + 4] {
            sig if sig == LOCAL_HEADER => Some(offset + 6),
            sig if sig == CENTRAL_HEADER => Some(offset + 8),
            _ => None,
        };
        if let Some(at) = flag_offset
            && at + 2 <= zip.len()
        {
            let flags = u16::from_le_bytes([zip[at], zip[at + 1]]) | ENCRYPTED_FLAG;
            zip[at..at + 2].copy_from_slice(&flags.to_le_bytes());
        }
        offset += 1;
    }
}

/// Builder for creating ZIP test archives with various entry types.
///
/// # Examples
///
/// ```
/// use sandconv_core::test_utils::ZipTestBuilder;
///
/// let zip_data = ZipTestBuilder::new()
///     .add_file("file.txt", b"content")
///     .add_directory("dir/")
///     .build();
/// ```
pub struct ZipTestBuilder {
    zip: zip::ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipTestBuilder {
    /// Creates a new ZIP test builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            zip: zip::ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Adds a stored regular file to the archive.
    #[must_use]
    pub fn add_file(mut self, path: &str, data: &[u8]) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);

        self.zip.start_file(path, options).unwrap();
        self.zip.write_all(data).unwrap();
        self
    }

    /// Adds a deflated regular file to the archive.
    #[must_use]
    pub fn add_file_deflated(mut self, path: &str, data: &[u8]) -> Self {
        let options = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        self.zip.start_file(path, options).unwrap();
        self.zip.write_all(data).unwrap();
        self
    }

    /// Adds a directory to the archive.
    #[must_use]
    pub fn add_directory(mut self, path: &str) -> Self {
        let options = SimpleFileOptions::default().unix_permissions(0o755);
        self.zip.add_directory(path, options).unwrap();
        self
    }

    /// Adds a symlink entry pointing at `target`.
    #[must_use]
    pub fn add_symlink(mut self, path: &str, target: &str) -> Self {
        let options = SimpleFileOptions::default().unix_permissions(0o777);
        self.zip.add_symlink(path, target, options).unwrap();
        self
    }

    /// Builds and returns the ZIP archive data.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        self.zip.finish().unwrap().into_inner()
    }
}

impl Default for ZipTestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes an executable `/bin/sh` script into `dir` and returns its path.
///
/// The script body is written after a `#!/bin/sh` line.
#[cfg(unix)]
#[must_use]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Writes a converter that renames every `.txt` input to `.md` in the
/// output directory and answers `--version`.
#[cfg(unix)]
#[must_use]
pub fn write_copying_converter(dir: &Path) -> PathBuf {
    write_script(
        dir,
        "fake-converter.sh",
        r#"if [ "$1" = "--version" ]; then echo "fake-converter 1.0"; exit 0; fi
in="$1"
out="$2"
find "$in" -type f -name '*.txt' | while read -r f; do
  rel="${f#$in/}"
  mkdir -p "$out/$(dirname "$rel")"
  cp "$f" "$out/${rel%.txt}.md"
done
echo "converted"
"#,
    )
}
