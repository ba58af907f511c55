//! External command execution behind a substitutable runner.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::RunnerError;

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Working directory; inherits the current one when `None`.
    pub cwd: Option<PathBuf>,
    /// Bytes written to the child's stdin, which is then closed.
    pub stdin: Option<String>,
    /// Hard limit; the child is killed when it expires.
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            stdin: None,
            timeout,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Value of a `--flag=value` argument, if present.
    pub fn flag_value(&self, flag: &str) -> Option<&str> {
        let prefix = format!("{flag}=");
        self.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
    }

    /// Shell-like rendering for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of a process that ran to exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
    pub success: bool,
}

impl CommandOutput {
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }
}

/// Runs external commands. Substituted with a fake in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError>;
}

/// Runner backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunnerError> {
        let start = Instant::now();
        let io_error = |e: std::io::Error| RunnerError::Io {
            program: spec.program.clone(),
            message: e.to_string(),
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &spec.cwd {
            command.current_dir(cwd);
        }

        debug!(command = %spec.display(), "spawning");
        let mut child = command.spawn().map_err(|e| RunnerError::Spawn {
            program: spec.program.clone(),
            message: e.to_string(),
        })?;

        // Feed stdin concurrently so a chatty child can't deadlock on a full pipe.
        let feeder = match (child.stdin.take(), spec.stdin.clone()) {
            (Some(mut pipe), Some(input)) => Some(tokio::spawn(async move {
                pipe.write_all(input.as_bytes()).await?;
                pipe.shutdown().await
            })),
            _ => None,
        };

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(spec.timeout, child.wait_with_output())
            .await
            .map_err(|_| RunnerError::Timeout {
                program: spec.program.clone(),
                timeout_secs: spec.timeout.as_secs(),
            })?
            .map_err(io_error)?;

        if let Some(feeder) = feeder {
            match feeder.await {
                Ok(Ok(())) => {}
                // The child may exit without reading all of stdin.
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => return Err(io_error(e)),
                Err(e) => return Err(io_error(std::io::Error::other(e))),
            }
        }

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: output.status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_output_passed() {
        let out = CommandOutput {
            exit_code: 1,
            stdout: String::new(),
            stderr: "error".to_string(),
            duration_ms: 3,
            success: false,
        };
        assert!(!out.passed());
    }

    #[test]
    fn test_spec_builders() {
        let spec = CommandSpec::new("esbuild", Duration::from_secs(5))
            .args(["--bundle", "--metafile=/tmp/m.json"])
            .current_dir("/tmp");
        assert_eq!(spec.display(), "esbuild --bundle --metafile=/tmp/m.json");
        assert_eq!(spec.flag_value("--metafile"), Some("/tmp/m.json"));
        assert_eq!(spec.flag_value("--prefix"), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_simple_command() {
        let spec = CommandSpec::new("echo", Duration::from_secs(10)).arg("hello");
        let out = TokioCommandRunner.run(&spec).await.expect("run failed");
        assert!(out.passed());
        assert!(out.stdout.contains("hello"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdin_is_fed() {
        let spec = CommandSpec::new("cat", Duration::from_secs(10)).stdin("from stdin");
        let out = TokioCommandRunner.run(&spec).await.expect("run failed");
        assert_eq!(out.stdout, "from stdin");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_command_is_output_not_error() {
        let spec = CommandSpec::new("false", Duration::from_secs(10));
        let out = TokioCommandRunner.run(&spec).await.expect("run failed");
        assert!(!out.success);
        assert_ne!(out.exit_code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(200)).arg("5");
        let err = TokioCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let spec = CommandSpec::new("artifex-definitely-not-a-program", Duration::from_secs(1));
        let err = TokioCommandRunner.run(&spec).await.unwrap_err();
        assert!(matches!(err, RunnerError::Spawn { .. }));
    }
}
