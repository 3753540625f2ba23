//! Bounded execution of the converter.
//!
//! Each attempt runs the allow-listed binary directly (no shell) with a
//! filtered environment, in its own process group, under a wall-clock
//! timeout. On timeout the whole group is killed and reaped before the next
//! attempt starts. Only timeouts and execution failures are retried; a
//! non-zero exit is an authoritative answer and is returned as is.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use std::time::Instant;

use tokio::process::Child;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::command::ConverterCommand;
use super::command::validate_argument;
use super::env::sanitize_environment;
use super::outcome::CapturedOutput;
use super::outcome::SubprocessOutcome;
use super::outcome::capture_bounded;
use crate::ConverterConfig;
use crate::PipelineError;
use crate::Result;

/// How long to wait for output readers after the child exits.
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Exit code, stdout and stderr of one attempt.
type AttemptOutput = (Option<i32>, CapturedOutput, CapturedOutput);

/// Why a single attempt did not produce an exit status.
#[derive(Debug)]
enum AttemptFailure {
    TimedOut,
    Execution(std::io::Error),
}

/// Runs converter commands under the configured policy.
///
/// # Examples
///
/// ```no_run
/// use sandconv_core::ConverterConfig;
/// use sandconv_core::process::ConverterCommand;
/// use sandconv_core::process::InfoFlag;
/// use sandconv_core::process::ProcessSupervisor;
///
/// # async fn example() -> Result<(), sandconv_core::PipelineError> {
/// let supervisor = ProcessSupervisor::new(ConverterConfig::default());
/// let outcome = supervisor
///     .run(&ConverterCommand::Info(InfoFlag::Version), None)
///     .await?;
/// println!("{}", outcome.stdout.text());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    config: ConverterConfig,
    env: Vec<(String, String)>,
}

impl ProcessSupervisor {
    /// Creates a supervisor that forwards the allow-listed subset of this
    /// process's environment.
    #[must_use]
    pub fn new(config: ConverterConfig) -> Self {
        let env = sanitize_environment(std::env::vars_os(), &config);
        Self { config, env }
    }

    /// Replaces the base environment, filtering it through the allow-list.
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<std::ffi::OsStr>,
        V: AsRef<std::ffi::OsStr>,
    {
        self.env = sanitize_environment(vars, &self.config);
        self
    }

    /// Converter policy in force.
    #[must_use]
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Environment passed to the converter.
    #[must_use]
    pub fn environment(&self) -> &[(String, String)] {
        &self.env
    }

    /// Runs `command` to completion, retrying timeouts and execution
    /// failures up to the configured limit.
    ///
    /// A non-zero exit is returned as an outcome with `success() == false`.
    ///
    /// # Errors
    ///
    /// - `PipelineError::CommandRejected` if the command fails validation;
    ///   nothing is spawned
    /// - `PipelineError::ConversionTimeout` if the last attempt timed out
    /// - `PipelineError::ProcessFailure` if the last attempt could not run
    pub async fn run(&self, command: &ConverterCommand, cwd: Option<&Path>) -> Result<SubprocessOutcome> {
        let args = command.arguments(&self.config)?;
        let binary = self.config.binary.to_str().ok_or_else(|| PipelineError::CommandRejected {
            reason: format!("binary path is not valid UTF-8: {}", self.config.binary.display()),
        })?;
        validate_argument(binary, self.config.max_arg_len)?;

        let max_attempts = self.config.max_attempts();
        let mut last_failure = AttemptFailure::TimedOut;

        for attempt in 1..=max_attempts {
            let start = Instant::now();
            match self.attempt(&args, cwd).await {
                Ok((exit_code, stdout, stderr)) => {
                    let elapsed = start.elapsed();
                    info!(
                        attempt,
                        exit_code,
                        elapsed = ?elapsed,
                        stdout_truncated = stdout.is_truncated(),
                        stderr_truncated = stderr.is_truncated(),
                        "converter finished"
                    );
                    return Ok(SubprocessOutcome {
                        exit_code,
                        stdout,
                        stderr,
                        elapsed,
                        attempts: attempt,
                    });
                }
                Err(failure) => {
                    match &failure {
                        AttemptFailure::TimedOut => warn!(
                            attempt,
                            max_attempts,
                            timeout = ?self.config.timeout,
                            "converter timed out"
                        ),
                        AttemptFailure::Execution(e) => warn!(
                            attempt,
                            max_attempts,
                            error = %e,
                            "converter execution failed"
                        ),
                    }
                    last_failure = failure;
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(match last_failure {
            AttemptFailure::TimedOut => PipelineError::ConversionTimeout {
                timeout: self.config.timeout,
                attempts: max_attempts,
            },
            AttemptFailure::Execution(e) => PipelineError::ProcessFailure {
                attempts: max_attempts,
                message: e.to_string(),
            },
        })
    }

    async fn attempt(
        &self,
        args: &[OsString],
        cwd: Option<&Path>,
    ) -> std::result::Result<AttemptOutput, AttemptFailure> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(args)
            .env_clear()
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(AttemptFailure::Execution)?;
        // Captured now: the id is gone once the child has been reaped.
        let pid = child.id();
        debug!(pid, "converter spawned");

        let cap = self.config.max_output_bytes;
        let stdout_task = tokio::spawn(capture_bounded(child.stdout.take(), cap));
        let stderr_task = tokio::spawn(capture_bounded(child.stderr.take(), cap));

        match tokio::time::timeout(self.config.timeout, child.wait()).await {
            Ok(Ok(status)) => {
                let stdout = collect(stdout_task, pid).await;
                let stderr = collect(stderr_task, pid).await;
                Ok((status.code(), stdout, stderr))
            }
            Ok(Err(e)) => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(AttemptFailure::Execution(e))
            }
            Err(_) => {
                terminate(&mut child, pid).await;
                stdout_task.abort();
                stderr_task.abort();
                Err(AttemptFailure::TimedOut)
            }
        }
    }
}

/// Waits for a reader task; if descendants keep the pipe open past the
/// grace period, kills the group and returns what is available.
async fn collect(mut task: JoinHandle<std::io::Result<CapturedOutput>>, pid: Option<u32>) -> CapturedOutput {
    match tokio::time::timeout(OUTPUT_DRAIN_GRACE, &mut task).await {
        Ok(Ok(Ok(output))) => output,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed reading converter output");
            CapturedOutput::default()
        }
        Ok(Err(e)) => {
            warn!(error = %e, "converter output reader panicked");
            CapturedOutput::default()
        }
        Err(_) => {
            warn!("converter descendants held output open, killing process group");
            kill_process_group(pid);
            task.await.ok().and_then(std::result::Result::ok).unwrap_or_default()
        }
    }
}

/// Kills the child's process group and reaps the child.
async fn terminate(child: &mut Child, pid: Option<u32>) {
    kill_process_group(pid);
    let _ = child.start_kill();
    let _ = child.wait().await;
}

#[cfg(unix)]
fn kill_process_group(pid: Option<u32>) {
    // The group id equals the child pid because of process_group(0).
    let Some(pid) = pid.and_then(|pid| libc::pid_t::try_from(pid).ok()) else {
        return;
    };

    // SAFETY: kill() takes plain integers and has no memory-safety
    // preconditions. A negative pid addresses the process group.
    #[allow(unsafe_code)]
    let result = unsafe { libc::kill(-pid, libc::SIGKILL) };

    if result != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            warn!(pid, error = %err, "failed to kill converter process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: Option<u32>) {}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::process::InfoFlag;
    use crate::test_utils::write_script;
    use tempfile::TempDir;

    fn config(binary: &Path) -> ConverterConfig {
        ConverterConfig {
            binary: binary.to_path_buf(),
            timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
            ..ConverterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_runs_info_command() {
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "conv.sh", r#"echo "version $1""#);
        let supervisor = ProcessSupervisor::new(config(&script));

        let outcome = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), None)
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.stdout.text(), "version --version\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_not_retried() {
        let temp = TempDir::new().unwrap();
        let counter = temp.path().join("count");
        let script = write_script(
            temp.path(),
            "conv.sh",
            &format!("echo x >> {}\necho 'boom' >&2\nexit 3", counter.display()),
        );
        let supervisor = ProcessSupervisor::new(config(&script));

        let outcome = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Help), None)
            .await
            .unwrap();
        assert!(!outcome.success());
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stderr.text(), "boom\n");
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 1);
    }

    #[tokio::test]
    async fn test_timeout_retries_then_fails() {
        let temp = TempDir::new().unwrap();
        let counter = temp.path().join("count");
        let script = write_script(
            temp.path(),
            "conv.sh",
            &format!("echo x >> {}\nsleep 30", counter.display()),
        );
        let mut config = config(&script);
        config.timeout = Duration::from_millis(300);
        config.max_retries = 1;
        let supervisor = ProcessSupervisor::new(config);

        let start = Instant::now();
        let result = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Help), None)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::ConversionTimeout { attempts: 2, .. })
        ));
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(std::fs::read_to_string(&counter).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_timeout_kills_descendants() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("survivor");
        let script = write_script(
            temp.path(),
            "conv.sh",
            &format!("(sleep 1; touch {}) &\nsleep 30", marker.display()),
        );
        let mut config = config(&script);
        config.timeout = Duration::from_millis(200);
        config.max_retries = 0;
        let supervisor = ProcessSupervisor::new(config);

        let result = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Help), None)
            .await;
        assert!(matches!(result, Err(PipelineError::ConversionTimeout { .. })));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_binary_is_process_failure() {
        let temp = TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(config(&temp.path().join("missing")));

        let result = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), None)
            .await;
        assert!(matches!(
            result,
            Err(PipelineError::ProcessFailure { attempts: 3, .. })
        ));
    }

    #[tokio::test]
    async fn test_rejected_command_never_spawns() {
        let temp = TempDir::new().unwrap();
        let marker = temp.path().join("ran");
        let script = write_script(temp.path(), "conv.sh", &format!("touch {}", marker.display()));
        let supervisor = ProcessSupervisor::new(config(&script));

        let command = ConverterCommand::convert("/in;rm -rf /", "/out", &[]);
        let result = supervisor.run(&command, None).await;
        assert!(matches!(result, Err(PipelineError::CommandRejected { .. })));
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_environment_is_filtered() {
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "conv.sh", "env");
        let supervisor = ProcessSupervisor::new(config(&script)).with_environment([
            ("PATH", "/usr/bin:/bin"),
            ("SECRET_TOKEN", "hunter2"),
        ]);

        let outcome = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), None)
            .await
            .unwrap();
        let env = outcome.stdout.text();
        assert!(env.contains("PATH=/usr/bin:/bin"));
        assert!(!env.contains("SECRET_TOKEN"));
    }

    #[tokio::test]
    async fn test_output_is_capped() {
        let temp = TempDir::new().unwrap();
        let script = write_script(
            temp.path(),
            "conv.sh",
            "i=0; while [ $i -lt 2000 ]; do echo 0123456789; i=$((i+1)); done",
        );
        let mut config = config(&script);
        config.max_output_bytes = 1000;
        let supervisor = ProcessSupervisor::new(config).with_environment([("PATH", "/usr/bin:/bin")]);

        let outcome = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), None)
            .await
            .unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.bytes().len(), 1000);
        assert!(outcome.stdout.is_truncated());
        assert_eq!(outcome.stdout.total(), 22_000);
    }

    #[tokio::test]
    async fn test_runs_in_working_directory() {
        let temp = TempDir::new().unwrap();
        let script = write_script(temp.path(), "conv.sh", "pwd");
        let workdir = TempDir::new().unwrap();
        let supervisor = ProcessSupervisor::new(config(&script)).with_environment([("PATH", "/usr/bin:/bin")]);

        let outcome = supervisor
            .run(&ConverterCommand::Info(InfoFlag::Version), Some(workdir.path()))
            .await
            .unwrap();
        assert_eq!(
            Path::new(outcome.stdout.text().trim()).canonicalize().unwrap(),
            workdir.path().canonicalize().unwrap()
        );
    }
}
