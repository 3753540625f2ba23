//! CLI argument parsing using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use clap_complete::Shell;
use sandconv_core::ArchiveLimits;
use sandconv_core::ConverterConfig;
use sandconv_core::SandboxConfig;
use sandconv_core::WorkspaceConfig;
use sandconv_core::process::ConvertFlag;

#[derive(Parser)]
#[command(name = "sandconv")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output results in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Log filter (trace, debug, info, warn, error, or an EnvFilter directive)
    #[arg(long, global = true, env = "SANDCONV_LOG")]
    pub log_level: Option<String>,

    /// Log line format on stderr
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate, extract, convert, and repackage an archive
    Convert(ConvertArgs),
    /// Run upload validation only
    Validate(ValidateArgs),
    /// Check that the converter binary runs
    Probe(ProbeArgs),
    /// Remove workspaces left behind by crashed runs
    Sweep(SweepArgs),
    /// Generate shell completions
    Completion {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Commands {
    /// Name used in JSON output.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Convert(_) => "convert",
            Self::Validate(_) => "validate",
            Self::Probe(_) => "probe",
            Self::Sweep(_) => "sweep",
            Self::Completion { .. } => "completion",
        }
    }
}

#[derive(clap::Args)]
pub struct ConvertArgs {
    /// Path to the uploaded archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Where to write the converted archive (default: <ARCHIVE stem>-converted.zip)
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<PathBuf>,

    /// Filename to validate instead of the archive's own name
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    /// Overwrite the output file if it exists
    #[arg(short = 'f', long)]
    pub force: bool,

    #[command(flatten)]
    pub limits: LimitArgs,

    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    #[command(flatten)]
    pub converter: ConverterArgs,
}

#[derive(clap::Args)]
pub struct ValidateArgs {
    /// Path to the uploaded archive
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Filename to validate instead of the archive's own name
    #[arg(long, value_name = "NAME")]
    pub filename: Option<String>,

    #[command(flatten)]
    pub limits: LimitArgs,
}

#[derive(clap::Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub converter: ConverterArgs,
}

#[derive(clap::Args)]
pub struct SweepArgs {
    #[command(flatten)]
    pub workspace: WorkspaceArgs,

    /// Only remove workspaces older than this many seconds
    #[arg(long, value_name = "SECS", default_value = "3600")]
    pub min_age: u64,
}

#[derive(clap::Args)]
pub struct LimitArgs {
    /// Maximum upload size in bytes
    #[arg(long, value_parser = parse_byte_size, env = "SANDCONV_MAX_UPLOAD_SIZE")]
    pub max_upload_size: Option<u64>,

    /// Absolute ceiling on total decompressed bytes
    #[arg(long, value_parser = parse_byte_size, env = "SANDCONV_MAX_DECOMPRESSED_SIZE")]
    pub max_decompressed_size: Option<u64>,

    /// Maximum ratio of decompressed bytes to upload size
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..), env = "SANDCONV_MAX_COMPRESSION_RATIO")]
    pub max_compression_ratio: Option<u64>,

    /// Maximum number of archive entries
    #[arg(long, env = "SANDCONV_MAX_ENTRIES")]
    pub max_entries: Option<usize>,

    /// Maximum path depth of an entry
    #[arg(long, env = "SANDCONV_MAX_PATH_DEPTH")]
    pub max_path_depth: Option<usize>,

    /// Maximum size of a single entry in bytes
    #[arg(long, value_parser = parse_byte_size, env = "SANDCONV_MAX_ENTRY_SIZE")]
    pub max_entry_size: Option<u64>,

    /// Number of nested archives tolerated inside the upload
    #[arg(long, env = "SANDCONV_MAX_NESTED_ARCHIVES")]
    pub max_nested_archives: Option<usize>,
}

#[derive(clap::Args)]
pub struct WorkspaceArgs {
    /// Directory under which per-request workspaces are created
    #[arg(long, value_name = "DIR", env = "SANDCONV_BASE_DIR")]
    pub base_dir: Option<PathBuf>,

    /// Workspace directory name prefix
    #[arg(long, value_name = "PREFIX", env = "SANDCONV_WORKSPACE_PREFIX")]
    pub prefix: Option<String>,
}

#[derive(clap::Args)]
pub struct ConverterArgs {
    /// Converter binary to run
    #[arg(long, value_name = "PATH", env = "SANDCONV_CONVERTER")]
    pub converter: Option<PathBuf>,

    /// Wall-clock budget per converter attempt, in seconds
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..), env = "SANDCONV_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Additional attempts after a timeout or execution failure
    #[arg(long, env = "SANDCONV_MAX_RETRIES")]
    pub max_retries: Option<u32>,

    /// Delay between attempts, in milliseconds
    #[arg(long, value_name = "MS", env = "SANDCONV_RETRY_DELAY_MS")]
    pub retry_delay_ms: Option<u64>,

    /// Pass --force to the converter
    #[arg(long)]
    pub converter_force: bool,

    /// Pass --verbose to the converter
    #[arg(long)]
    pub converter_verbose: bool,
}

impl LimitArgs {
    pub fn apply(&self, limits: &mut ArchiveLimits) {
        if let Some(v) = self.max_upload_size {
            limits.max_upload_size = v;
        }
        if let Some(v) = self.max_decompressed_size {
            limits.max_decompressed_size = v;
        }
        if let Some(v) = self.max_compression_ratio {
            limits.max_compression_ratio = v;
        }
        if let Some(v) = self.max_entries {
            limits.max_entries = v;
        }
        if let Some(v) = self.max_path_depth {
            limits.max_path_depth = v;
        }
        if let Some(v) = self.max_entry_size {
            limits.max_entry_size = v;
        }
        if let Some(v) = self.max_nested_archives {
            limits.max_nested_archives = v;
        }
    }
}

impl WorkspaceArgs {
    pub fn apply(&self, workspace: &mut WorkspaceConfig) {
        if let Some(dir) = &self.base_dir {
            workspace.base_dir.clone_from(dir);
        }
        if let Some(prefix) = &self.prefix {
            workspace.prefix.clone_from(prefix);
        }
    }
}

impl ConverterArgs {
    pub fn apply(&self, converter: &mut ConverterConfig) {
        if let Some(binary) = &self.converter {
            converter.binary.clone_from(binary);
        }
        if let Some(secs) = self.timeout {
            converter.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.max_retries {
            converter.max_retries = retries;
        }
        if let Some(ms) = self.retry_delay_ms {
            converter.retry_delay = Duration::from_millis(ms);
        }
        if self.converter_force {
            converter.convert_flags.push(ConvertFlag::Force);
        }
        if self.converter_verbose {
            converter.convert_flags.push(ConvertFlag::Verbose);
        }
    }
}

impl ConvertArgs {
    pub fn config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default();
        self.limits.apply(&mut config.limits);
        self.workspace.apply(&mut config.workspace);
        self.converter.apply(&mut config.converter);
        config
    }
}

impl ValidateArgs {
    pub fn config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default();
        self.limits.apply(&mut config.limits);
        config
    }
}

impl ProbeArgs {
    pub fn config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default();
        self.converter.apply(&mut config.converter);
        config
    }
}

impl SweepArgs {
    pub fn config(&self) -> SandboxConfig {
        let mut config = SandboxConfig::default();
        self.workspace.apply(&mut config.workspace);
        config
    }
}

/// Parse byte size with optional suffix (K, M, G, T)
#[allow(clippy::option_if_let_else)]
fn parse_byte_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty byte size".to_string());
    }

    let (num_str, multiplier) = if let Some(stripped) = s.strip_suffix('T') {
        (stripped, 1024_u64.pow(4))
    } else if let Some(stripped) = s.strip_suffix('G') {
        (stripped, 1024_u64.pow(3))
    } else if let Some(stripped) = s.strip_suffix('M') {
        (stripped, 1024_u64.pow(2))
    } else if let Some(stripped) = s.strip_suffix('K') {
        (stripped, 1024)
    } else {
        (s, 1)
    };

    num_str
        .parse::<u64>()
        .map_err(|_| format!("invalid byte size: {s}"))
        .and_then(|n| {
            n.checked_mul(multiplier)
                .ok_or_else(|| format!("byte size overflow: {s}"))
        })
}
