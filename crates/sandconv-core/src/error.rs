//! Error types for the conversion pipeline.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Reason an uploaded filename was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilenameIssue {
    /// The name is empty, or nothing is left once directories are stripped.
    Empty,
    /// The name contains a NUL byte.
    NullByte,
    /// The name contains a control character.
    ControlCharacter,
    /// The name is longer than the configured maximum.
    TooLong {
        /// Length of the name in characters.
        len: usize,
        /// Maximum allowed length.
        max: usize,
    },
    /// The name contains characters outside the allowed set.
    UnsafeCharacters(Vec<char>),
    /// The name is a hidden (dot-prefixed) file.
    Hidden,
}

impl std::fmt::Display for FilenameIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty filename"),
            Self::NullByte => write!(f, "filename contains a null byte"),
            Self::ControlCharacter => write!(f, "filename contains control characters"),
            Self::TooLong { len, max } => write!(f, "filename too long ({len} > {max})"),
            Self::UnsafeCharacters(chars) => {
                write!(f, "filename contains unsafe characters: {chars:?}")
            }
            Self::Hidden => write!(f, "hidden filenames are not allowed"),
        }
    }
}

/// A rejected property of an uploaded archive.
///
/// This is the closed set of reasons carried by
/// [`PipelineError::Validation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// Upload is larger than the configured ceiling.
    UploadTooLarge {
        /// Upload size in bytes.
        size: u64,
        /// Maximum allowed size in bytes.
        max: u64,
    },
    /// Upload contains no bytes.
    EmptyUpload,
    /// Leading bytes do not match a known container signature.
    BadSignature,
    /// The declared filename is unsafe.
    UnsafeFilename(FilenameIssue),
    /// Archive holds more entries than allowed.
    TooManyEntries {
        /// Number of entries seen.
        count: usize,
        /// Maximum allowed entry count.
        max: usize,
    },
    /// Sum of uncompressed sizes exceeds the decompression ceiling.
    DecompressedSizeExceeded {
        /// Running total in bytes.
        total: u64,
        /// Effective ceiling in bytes.
        max: u64,
    },
    /// A single entry is larger than allowed.
    EntryTooLarge {
        /// Entry name as stored in the archive.
        name: String,
        /// Bytes seen so far for the entry.
        size: u64,
        /// Maximum allowed entry size.
        max: u64,
    },
    /// Entry is encrypted.
    EncryptedEntry {
        /// Entry name as stored in the archive.
        name: String,
    },
    /// Entry is stored as a symbolic link.
    SymlinkEntry {
        /// Entry name as stored in the archive.
        name: String,
    },
    /// Entry name contains a NUL byte.
    NullByte {
        /// Entry name, escaped for display.
        name: String,
    },
    /// Entry path has too many segments.
    PathTooDeep {
        /// Segment count of the entry path.
        depth: usize,
        /// Maximum allowed segment count.
        max: usize,
    },
    /// Archive nests more archives than allowed.
    NestedArchive {
        /// Entry name of the offending nested archive.
        name: String,
        /// Maximum allowed number of nested archives.
        max: usize,
    },
    /// Two entries resolve to the same file.
    DuplicateEntry {
        /// Entry name as stored in the archive.
        name: String,
    },
    /// Container structure could not be read.
    MalformedArchive {
        /// Description of the structural problem.
        reason: String,
    },
    /// Integer overflow while accumulating sizes.
    IntegerOverflow,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UploadTooLarge { size, max } => {
                write!(f, "upload too large ({size} > {max} bytes)")
            }
            Self::EmptyUpload => write!(f, "empty upload"),
            Self::BadSignature => write!(f, "invalid file type: only ZIP archives are allowed"),
            Self::UnsafeFilename(issue) => write!(f, "unsafe filename: {issue}"),
            Self::TooManyEntries { count, max } => {
                write!(f, "archive contains too many entries ({count} > {max})")
            }
            Self::DecompressedSizeExceeded { total, max } => {
                write!(f, "decompressed size exceeds limit ({total} > {max} bytes)")
            }
            Self::EntryTooLarge { name, size, max } => {
                write!(f, "entry {name} too large ({size} > {max} bytes)")
            }
            Self::EncryptedEntry { name } => write!(f, "encrypted entry not supported: {name}"),
            Self::SymlinkEntry { name } => write!(f, "symlink entry not allowed: {name}"),
            Self::NullByte { name } => write!(f, "entry name contains a null byte: {name}"),
            Self::PathTooDeep { depth, max } => {
                write!(f, "path depth {depth} exceeds maximum {max}")
            }
            Self::NestedArchive { name, max } => {
                write!(f, "nested archive {name} exceeds the limit of {max}")
            }
            Self::DuplicateEntry { name } => write!(f, "duplicate entry: {name}"),
            Self::MalformedArchive { reason } => write!(f, "invalid ZIP file: {reason}"),
            Self::IntegerOverflow => write!(f, "integer overflow in size accounting"),
        }
    }
}

/// Stable, low-cardinality label for an error, suitable for metric tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Archive or filename failed validation.
    Validation,
    /// Archive tried to escape the sandbox.
    PathTraversal,
    /// Workspace directory could not be created.
    WorkspaceAllocation,
    /// Converter command failed the allow-list.
    CommandRejected,
    /// Converter exceeded its wall-clock budget.
    Timeout,
    /// Converter exited non-zero.
    ConversionFailed,
    /// Converter could not be run at all.
    ProcessFailure,
    /// Converter produced no usable files.
    EmptyResult,
    /// Output container could not be written.
    Packaging,
    /// Configuration is incoherent.
    Config,
    /// Underlying I/O failure.
    Io,
}

impl ErrorKind {
    /// Returns the label as a static string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation_error",
            Self::PathTraversal => "path_traversal",
            Self::WorkspaceAllocation => "workspace_error",
            Self::CommandRejected => "command_rejected",
            Self::Timeout => "timeout",
            Self::ConversionFailed => "cli_error",
            Self::ProcessFailure => "execution_error",
            Self::EmptyResult => "empty_result",
            Self::Packaging => "packaging_error",
            Self::Config => "config_error",
            Self::Io => "io_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while running the conversion pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Upload or archive failed validation.
    #[error("validation failed: {violation}")]
    Validation {
        /// What was rejected.
        violation: Violation,
    },

    /// Archive entry attempted to escape the sandbox.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry path.
        path: PathBuf,
    },

    /// Workspace directory could not be created.
    #[error("failed to allocate workspace {path}: {source}")]
    WorkspaceAllocation {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Converter command did not pass validation; nothing was spawned.
    #[error("command rejected by security policy: {reason}")]
    CommandRejected {
        /// Reason for the rejection.
        reason: String,
    },

    /// Every attempt timed out.
    #[error("conversion timed out after {timeout:?} ({attempts} attempts)")]
    ConversionTimeout {
        /// Per-attempt timeout.
        timeout: Duration,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Converter exited with a non-zero status.
    #[error("conversion failed ({}): {stderr}", describe_exit(*exit_code))]
    ConversionFailed {
        /// Exit code, or `None` if the converter was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard error, verbatim.
        stderr: String,
        /// Captured standard output, verbatim.
        stdout: String,
    },

    /// Converter could not be executed after every attempt.
    #[error("converter could not be executed after {attempts} attempts: {message}")]
    ProcessFailure {
        /// Number of attempts made.
        attempts: u32,
        /// Description of the last failure.
        message: String,
    },

    /// Conversion succeeded but produced no recognized output files.
    #[error("conversion produced no output files")]
    EmptyResult,

    /// Output container could not be assembled.
    #[error("failed to package output: {0}")]
    Packaging(String),

    /// Configuration is incoherent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

fn describe_exit(code: Option<i32>) -> String {
    code.map_or_else(
        || "terminated by signal".to_string(),
        |code| format!("exit code {code}"),
    )
}

impl From<Violation> for PipelineError {
    fn from(violation: Violation) -> Self {
        Self::Validation { violation }
    }
}

impl PipelineError {
    /// Returns the metric label for this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use sandconv_core::PipelineError;
    ///
    /// assert_eq!(PipelineError::EmptyResult.kind().as_str(), "empty_result");
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::WorkspaceAllocation { .. } => ErrorKind::WorkspaceAllocation,
            Self::CommandRejected { .. } => ErrorKind::CommandRejected,
            Self::ConversionTimeout { .. } => ErrorKind::Timeout,
            Self::ConversionFailed { .. } => ErrorKind::ConversionFailed,
            Self::ProcessFailure { .. } => ErrorKind::ProcessFailure,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::Packaging(_) => ErrorKind::Packaging,
            Self::InvalidConfig(_) => ErrorKind::Config,
        }
    }

    /// Returns `true` if the caller can fix this by sending a different
    /// archive.
    ///
    /// # Examples
    ///
    /// ```
    /// use sandconv_core::PipelineError;
    /// use std::path::PathBuf;
    ///
    /// let err = PipelineError::PathTraversal {
    ///     path: PathBuf::from("../etc/passwd"),
    /// };
    /// assert!(err.is_client_error());
    /// assert!(!PipelineError::EmptyResult.is_client_error());
    /// ```
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::PathTraversal { .. })
    }

    /// Returns `true` if this error represents a security violation.
    ///
    /// Security violations include:
    /// - Sandbox escape attempts
    /// - Encrypted or symlink entries
    /// - Decompression bombs and count/size ceilings
    /// - Converter commands outside the allow-list
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        match self {
            Self::PathTraversal { .. } | Self::CommandRejected { .. } => true,
            Self::Validation { violation } => matches!(
                violation,
                Violation::TooManyEntries { .. }
                    | Violation::DecompressedSizeExceeded { .. }
                    | Violation::EntryTooLarge { .. }
                    | Violation::EncryptedEntry { .. }
                    | Violation::SymlinkEntry { .. }
                    | Violation::NullByte { .. }
                    | Violation::PathTooDeep { .. }
                    | Violation::NestedArchive { .. }
                    | Violation::IntegerOverflow
            ),
            _ => false,
        }
    }

    /// Returns `true` if resubmitting the same request may succeed.
    ///
    /// Client errors and authoritative converter failures are never
    /// transient.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::WorkspaceAllocation { .. }
                | Self::ConversionTimeout { .. }
                | Self::ProcessFailure { .. }
                | Self::Io(_)
        )
    }

    /// Returns the validation violation, if applicable.
    #[must_use]
    pub const fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Validation { violation } => Some(violation),
            _ => None,
        }
    }
}
