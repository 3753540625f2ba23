//! Allow-listed converter commands.
//!
//! The converter is only ever invoked in one of two shapes:
//!
//! - `[binary, --version | --help]`
//! - `[binary, input, output, flags...]`
//!
//! Commands are built as [`ConverterCommand`] values and turned into an
//! argument vector at spawn time; no shell is involved.

use std::ffi::OsString;
use std::path::Path;
use std::path::PathBuf;

use crate::ConverterConfig;
use crate::PipelineError;
use crate::Result;

/// Characters that are rejected in any argument.
pub const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '`', '$', '(', ')', '<', '>', '\n', '\r'];

/// Informational flags the converter may be called with on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InfoFlag {
    /// `--version`
    Version,
    /// `--help`
    Help,
}

impl InfoFlag {
    /// Command-line spelling of the flag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Version => "--version",
            Self::Help => "--help",
        }
    }

    /// Parses a command-line spelling.
    #[must_use]
    pub fn parse(arg: &str) -> Option<Self> {
        match arg {
            "--version" => Some(Self::Version),
            "--help" => Some(Self::Help),
            _ => None,
        }
    }
}

/// Flags that may follow the input and output paths of a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvertFlag {
    /// `--force`: overwrite existing output.
    Force,
    /// `--verbose`: chattier converter logs.
    Verbose,
}

impl ConvertFlag {
    /// Command-line spelling of the flag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Force => "--force",
            Self::Verbose => "--verbose",
        }
    }

    /// Parses a command-line spelling.
    #[must_use]
    pub fn parse(arg: &str) -> Option<Self> {
        match arg {
            "--force" => Some(Self::Force),
            "--verbose" => Some(Self::Verbose),
            _ => None,
        }
    }
}

/// A converter invocation in one of the permitted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConverterCommand {
    /// Print version or help.
    Info(InfoFlag),
    /// Convert `input` into `output`.
    Convert {
        /// Directory holding the extracted archive.
        input: PathBuf,
        /// Directory the converter writes into.
        output: PathBuf,
        /// Extra allow-listed flags.
        flags: Vec<ConvertFlag>,
    },
}

impl ConverterCommand {
    /// Builds a conversion command.
    pub fn convert(input: impl Into<PathBuf>, output: impl Into<PathBuf>, flags: &[ConvertFlag]) -> Self {
        Self::Convert {
            input: input.into(),
            output: output.into(),
            flags: flags.to_vec(),
        }
    }

    /// Parses a full argument vector, binary first.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::CommandRejected` if the binary is not the
    /// configured one, the shape is not permitted, or any argument fails
    /// [`validate_argument`].
    ///
    /// # Examples
    ///
    /// ```
    /// use sandconv_core::ConverterConfig;
    /// use sandconv_core::process::ConverterCommand;
    ///
    /// let config = ConverterConfig::default();
    /// let argv = ["docc2context".to_string(), "--version".to_string()];
    /// assert!(ConverterCommand::parse(&argv, &config).is_ok());
    ///
    /// let argv = ["docc2context".to_string(), "in; rm -rf /".to_string(), "out".to_string()];
    /// assert!(ConverterCommand::parse(&argv, &config).is_err());
    /// ```
    pub fn parse(argv: &[String], config: &ConverterConfig) -> Result<Self> {
        let Some((binary, args)) = argv.split_first() else {
            return Err(rejected("empty command"));
        };
        if Path::new(binary) != config.binary {
            return Err(rejected(format!("binary not allowed: {binary}")));
        }
        for arg in argv {
            validate_argument(arg, config.max_arg_len)?;
        }

        match args {
            [flag] => InfoFlag::parse(flag)
                .map(Self::Info)
                .ok_or_else(|| rejected(format!("flag not allowed: {flag}"))),
            [input, output, flags @ ..] => {
                let flags = flags
                    .iter()
                    .map(|flag| {
                        ConvertFlag::parse(flag)
                            .ok_or_else(|| rejected(format!("flag not allowed: {flag}")))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let command = Self::Convert {
                    input: PathBuf::from(input),
                    output: PathBuf::from(output),
                    flags,
                };
                command.arguments(config)?;
                Ok(command)
            }
            _ => Err(rejected(format!(
                "command shape not allowed ({} arguments)",
                args.len()
            ))),
        }
    }

    /// Validated argument vector, binary excluded.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::CommandRejected` if a path is not valid UTF-8,
    /// looks like a flag, or any argument fails [`validate_argument`].
    pub fn arguments(&self, config: &ConverterConfig) -> Result<Vec<OsString>> {
        let args: Vec<String> = match self {
            Self::Info(flag) => vec![flag.as_str().to_string()],
            Self::Convert {
                input,
                output,
                flags,
            } => {
                let mut args = vec![path_argument(input)?, path_argument(output)?];
                args.extend(flags.iter().map(|flag| flag.as_str().to_string()));
                args
            }
        };

        for arg in &args {
            validate_argument(arg, config.max_arg_len)?;
        }
        Ok(args.into_iter().map(OsString::from).collect())
    }
}

/// Checks a single argument against the injection rules.
///
/// # Errors
///
/// Returns `PipelineError::CommandRejected` if the argument contains a NUL
/// byte, exceeds `max_len` bytes, or contains a shell metacharacter.
pub fn validate_argument(arg: &str, max_len: usize) -> Result<()> {
    if arg.contains('\0') {
        return Err(rejected("argument contains a null byte"));
    }
    if arg.len() > max_len {
        return Err(rejected(format!(
            "argument too long ({} > {max_len} bytes)",
            arg.len()
        )));
    }
    if let Some(c) = arg.chars().find(|c| SHELL_METACHARACTERS.contains(c)) {
        return Err(rejected(format!("argument contains forbidden character {c:?}")));
    }
    Ok(())
}

fn path_argument(path: &Path) -> Result<String> {
    let Some(arg) = path.to_str() else {
        return Err(rejected(format!(
            "path is not valid UTF-8: {}",
            path.display()
        )));
    };
    if arg.is_empty() || arg.starts_with('-') {
        return Err(rejected(format!("path not allowed: {arg:?}")));
    }
    Ok(arg.to_string())
}

fn rejected(reason: impl Into<String>) -> PipelineError {
    PipelineError::CommandRejected {
        reason: reason.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| (*arg).to_string()).collect()
    }

    #[test]
    fn test_parse_info_command() {
        let config = ConverterConfig::default();
        let command = ConverterCommand::parse(&argv(&["docc2context", "--help"]), &config).unwrap();
        assert_eq!(command, ConverterCommand::Info(InfoFlag::Help));
    }

    #[test]
    fn test_parse_convert_command() {
        let config = ConverterConfig::default();
        let command = ConverterCommand::parse(
            &argv(&["docc2context", "/tmp/in", "/tmp/out", "--force"]),
            &config,
        )
        .unwrap();
        assert_eq!(
            command,
            ConverterCommand::convert("/tmp/in", "/tmp/out", &[ConvertFlag::Force])
        );
    }

    #[test]
    fn test_parse_rejects_other_binary() {
        let config = ConverterConfig::default();
        let result = ConverterCommand::parse(&argv(&["/bin/sh", "-c", "id"]), &config);
        assert!(matches!(result, Err(PipelineError::CommandRejected { .. })));
    }

    #[test]
    fn test_parse_rejects_unknown_shapes() {
        let config = ConverterConfig::default();
        for args in [
            &["docc2context"][..],
            &["docc2context", "--exec"],
            &["docc2context", "/in", "/out", "--delete"],
            &["docc2context", "/in"],
        ] {
            let result = ConverterCommand::parse(&argv(args), &config);
            assert!(
                matches!(result, Err(PipelineError::CommandRejected { .. })),
                "expected rejection for {args:?}"
            );
        }
        assert!(ConverterCommand::parse(&[], &config).is_err());
    }

    #[test]
    fn test_parse_rejects_metacharacters() {
        let config = ConverterConfig::default();
        for bad in ["in;rm", "a|b", "$(id)", "`id`", "a&b", "a>b", "a\nb"] {
            let result = ConverterCommand::parse(&argv(&["docc2context", bad, "/out"]), &config);
            assert!(
                matches!(result, Err(PipelineError::CommandRejected { .. })),
                "expected rejection for {bad:?}"
            );
        }
    }

    #[test]
    fn test_validate_argument_limits() {
        assert!(validate_argument("/tmp/swift-conv-1/extracted", 4096).is_ok());
        assert!(validate_argument(&"a".repeat(4097), 4096).is_err());
        assert!(validate_argument("a\0b", 4096).is_err());
    }

    #[test]
    fn test_arguments_reject_flag_like_paths() {
        let config = ConverterConfig::default();
        let command = ConverterCommand::convert("--exec", "/out", &[]);
        assert!(matches!(
            command.arguments(&config),
            Err(PipelineError::CommandRejected { .. })
        ));
    }

    #[test]
    fn test_arguments_order() {
        let config = ConverterConfig::default();
        let command = ConverterCommand::convert("/in", "/out", &[ConvertFlag::Verbose]);
        let args = command.arguments(&config).unwrap();
        assert_eq!(args, vec![
            OsString::from("/in"),
            OsString::from("/out"),
            OsString::from("--verbose")
        ]);
    }
}
