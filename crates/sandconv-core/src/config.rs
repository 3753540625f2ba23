//! Pipeline configuration with default-deny settings.

use std::path::PathBuf;
use std::time::Duration;

use crate::PipelineError;
use crate::Result;
use crate::process::ConvertFlag;

const MIB: u64 = 1024 * 1024;

/// Top-level configuration for the conversion pipeline.
///
/// Every ceiling is enforced by the component that owns it. The
/// configuration is treated as immutable once a [`crate::Pipeline`] has been
/// built; share it behind an `Arc` rather than cloning per request.
///
/// # Examples
///
/// ```
/// use sandconv_core::SandboxConfig;
/// use std::time::Duration;
///
/// let mut config = SandboxConfig::default();
/// config.converter.timeout = Duration::from_secs(30);
/// config.limits.max_upload_size = 10 * 1024 * 1024;
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default)]
pub struct SandboxConfig {
    /// Ceilings applied to the uploaded archive.
    pub limits: ArchiveLimits,
    /// Where and how per-request workspaces are created.
    pub workspace: WorkspaceConfig,
    /// External converter invocation policy.
    pub converter: ConverterConfig,
}

impl SandboxConfig {
    /// Checks that the configuration is coherent.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first problem
    /// found.
    pub fn validate(&self) -> Result<()> {
        self.limits.validate()?;
        self.workspace.validate()?;
        self.converter.validate()
    }
}

/// Ceilings applied to uploads and their contents.
#[derive(Debug, Clone)]
pub struct ArchiveLimits {
    /// Maximum size of the raw upload in bytes.
    pub max_upload_size: u64,

    /// Absolute ceiling on total decompressed bytes.
    pub max_decompressed_size: u64,

    /// Multiplier applied to the upload size to derive the relative
    /// decompression ceiling.
    pub max_compression_ratio: u64,

    /// Maximum number of entries in the archive.
    pub max_entries: usize,

    /// Maximum number of segments in an entry path.
    pub max_path_depth: usize,

    /// Maximum decompressed size of a single entry.
    pub max_entry_size: u64,

    /// Maximum number of entries that are themselves archives.
    pub max_nested_archives: usize,

    /// Extensions (without the dot) treated as nested archives.
    pub nested_archive_extensions: Vec<String>,

    /// Maximum length of the uploaded filename in characters.
    pub max_filename_length: usize,
}

impl Default for ArchiveLimits {
    /// Creates limits with the default ceilings.
    ///
    /// Default values:
    /// - `max_upload_size`: 100 MB
    /// - `max_decompressed_size`: 500 MB
    /// - `max_compression_ratio`: 5
    /// - `max_entries`: 5,000
    /// - `max_path_depth`: 32
    /// - `max_entry_size`: 500 MB
    /// - `max_nested_archives`: 0
    /// - `nested_archive_extensions`: `["zip", "jar", "tar", "gz", "tgz",
    ///   "bz2", "xz", "7z", "rar", "zst"]`
    /// - `max_filename_length`: 255
    fn default() -> Self {
        Self {
            max_upload_size: 100 * MIB,
            max_decompressed_size: 500 * MIB,
            max_compression_ratio: 5,
            max_entries: 5_000,
            max_path_depth: 32,
            max_entry_size: 500 * MIB,
            max_nested_archives: 0,
            nested_archive_extensions: ["zip", "jar", "tar", "gz", "tgz", "bz2", "xz", "7z", "rar", "zst"]
                .iter()
                .map(|ext| (*ext).to_string())
                .collect(),
            max_filename_length: 255,
        }
    }
}

impl ArchiveLimits {
    /// Returns `true` if an entry name has a nested-archive extension.
    ///
    /// Comparison is case-insensitive.
    #[must_use]
    pub fn is_nested_archive(&self, name: &str) -> bool {
        let Some((_, ext)) = name.rsplit_once('.') else {
            return false;
        };
        self.nested_archive_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(ext))
    }

    fn validate(&self) -> Result<()> {
        if self.max_upload_size == 0 {
            return Err(invalid("max_upload_size must be greater than zero"));
        }
        if self.max_decompressed_size == 0 {
            return Err(invalid("max_decompressed_size must be greater than zero"));
        }
        if self.max_compression_ratio == 0 {
            return Err(invalid("max_compression_ratio must be at least 1"));
        }
        if self.max_entries == 0 {
            return Err(invalid("max_entries must be greater than zero"));
        }
        if self.max_path_depth == 0 {
            return Err(invalid("max_path_depth must be greater than zero"));
        }
        if self.max_entry_size == 0 {
            return Err(invalid("max_entry_size must be greater than zero"));
        }
        if self.max_filename_length == 0 {
            return Err(invalid("max_filename_length must be greater than zero"));
        }
        Ok(())
    }
}

/// Placement and permissions of per-request workspaces.
#[derive(Debug, Clone)]
pub struct WorkspaceConfig {
    /// Directory under which workspaces are created.
    pub base_dir: PathBuf,

    /// Name prefix for workspace directories; also used by the orphan sweep.
    pub prefix: String,

    /// Permission bits for the workspace directory.
    pub mode: u32,
}

impl Default for WorkspaceConfig {
    /// Default values:
    /// - `base_dir`: the system temporary directory
    /// - `prefix`: `"swift-conv"`
    /// - `mode`: `0o700`
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir(),
            prefix: "swift-conv".to_string(),
            mode: 0o700,
        }
    }
}

impl WorkspaceConfig {
    fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() {
            return Err(invalid("workspace prefix must not be empty"));
        }
        if self.prefix.contains(['/', '\\', '\0']) {
            return Err(invalid("workspace prefix must not contain separators"));
        }
        if self.mode & 0o077 != 0 {
            return Err(invalid(format!(
                "workspace mode {:o} grants group or other access",
                self.mode
            )));
        }
        if self.mode & 0o700 != 0o700 {
            return Err(invalid(format!(
                "workspace mode {:o} must grant full owner access",
                self.mode
            )));
        }
        Ok(())
    }
}

/// Policy for invoking the external converter.
#[derive(Debug, Clone)]
pub struct ConverterConfig {
    /// The one binary the pipeline may execute.
    pub binary: PathBuf,

    /// Wall-clock budget for a single attempt.
    pub timeout: Duration,

    /// Retries after the first attempt, for timeouts and execution failures.
    pub max_retries: u32,

    /// Pause between attempts.
    pub retry_delay: Duration,

    /// Flags appended to every conversion command.
    pub convert_flags: Vec<ConvertFlag>,

    /// Bytes of stdout and stderr kept per stream.
    pub max_output_bytes: usize,

    /// Environment variable names forwarded to the converter.
    pub allowed_env: Vec<String>,

    /// Longest environment value forwarded.
    pub max_env_value_len: usize,

    /// Longest command argument accepted.
    pub max_arg_len: usize,

    /// Extensions (without the dot) collected from the converter output.
    pub output_extensions: Vec<String>,
}

impl Default for ConverterConfig {
    /// Default values:
    /// - `binary`: `docc2context`
    /// - `timeout`: 60 seconds
    /// - `max_retries`: 3
    /// - `retry_delay`: 1 second
    /// - `convert_flags`: empty
    /// - `max_output_bytes`: 1 MB
    /// - `allowed_env`: `PATH HOME USER LANG LC_ALL TZ TMPDIR TEMP TMP`
    /// - `max_env_value_len`: 4096
    /// - `max_arg_len`: 4096
    /// - `output_extensions`: `["md", "markdown", "txt"]`
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docc2context"),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            convert_flags: Vec::new(),
            max_output_bytes: 1024 * 1024,
            allowed_env: [
                "PATH", "HOME", "USER", "LANG", "LC_ALL", "TZ", "TMPDIR", "TEMP", "TMP",
            ]
            .iter()
            .map(|name| (*name).to_string())
            .collect(),
            max_env_value_len: 4096,
            max_arg_len: 4096,
            output_extensions: vec!["md".to_string(), "markdown".to_string(), "txt".to_string()],
        }
    }
}

impl ConverterConfig {
    /// Returns `true` if `name` is on the environment allow-list.
    #[must_use]
    pub fn is_env_allowed(&self, name: &str) -> bool {
        self.allowed_env.iter().any(|allowed| allowed == name)
    }

    /// Total number of attempts the supervisor may make.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    fn validate(&self) -> Result<()> {
        if self.binary.as_os_str().is_empty() {
            return Err(invalid("converter binary must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(invalid("converter timeout must be greater than zero"));
        }
        if self.output_extensions.is_empty() {
            return Err(invalid("at least one output extension is required"));
        }
        if self.max_arg_len == 0 {
            return Err(invalid("max_arg_len must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> PipelineError {
    PipelineError::InvalidConfig(message.into())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::field_reassign_with_default)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SandboxConfig::default();
        assert_eq!(config.limits.max_upload_size, 100 * 1024 * 1024);
        assert_eq!(config.limits.max_decompressed_size, 500 * 1024 * 1024);
        assert_eq!(config.limits.max_compression_ratio, 5);
        assert_eq!(config.limits.max_entries, 5000);
        assert_eq!(config.workspace.prefix, "swift-conv");
        assert_eq!(config.workspace.mode, 0o700);
        assert_eq!(config.converter.timeout, Duration::from_secs(60));
        assert_eq!(config.converter.max_retries, 3);
        assert_eq!(config.converter.max_attempts(), 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_allow_list() {
        let config = ConverterConfig::default();
        assert!(config.is_env_allowed("PATH"));
        assert!(config.is_env_allowed("LC_ALL"));
        assert!(!config.is_env_allowed("LD_PRELOAD"));
        assert!(!config.is_env_allowed("path"));
    }

    #[test]
    fn test_nested_archive_detection() {
        let limits = ArchiveLimits::default();
        assert!(limits.is_nested_archive("inner.zip"));
        assert!(limits.is_nested_archive("dir/inner.ZIP"));
        assert!(limits.is_nested_archive("bundle.tar.gz"));
        assert!(!limits.is_nested_archive("notes.md"));
        assert!(!limits.is_nested_archive("zip"));
    }

    #[test]
    fn test_rejects_zero_ceilings() {
        let mut config = SandboxConfig::default();
        config.limits.max_decompressed_size = 0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::InvalidConfig(_))
        ));

        let mut config = SandboxConfig::default();
        config.limits.max_compression_ratio = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_open_workspace_mode() {
        let mut config = SandboxConfig::default();
        config.workspace.mode = 0o755;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("group or other"));
    }

    #[test]
    fn test_rejects_prefix_with_separator() {
        let mut config = SandboxConfig::default();
        config.workspace.prefix = "../escape".to_string();
        assert!(config.validate().is_err());

        config.workspace.prefix = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_timeout_and_empty_extensions() {
        let mut config = SandboxConfig::default();
        config.converter.timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = SandboxConfig::default();
        config.converter.output_extensions.clear();
        assert!(config.validate().is_err());
    }
}
