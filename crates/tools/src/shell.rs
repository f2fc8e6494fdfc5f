//! Shell runner: execute commands with streamed output and a timeout.
//!
//! Output is read line by line from both pipes concurrently and forwarded to
//! the caller's sink as it arrives. The child is killed when the run future
//! is dropped, which is how cancellation reaches the process.

use async_trait::async_trait;
use localcoder_core::error::ToolError;
use localcoder_core::workspace::{OutputLine, ProcessOutput, ProcessRunner};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, warn};

/// Runs commands through the platform shell.
pub struct ShellRunner {
    timeout: Duration,
}

impl ShellRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(command: &str) -> Command {
        if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        sink: &(dyn Fn(OutputLine) + Send + Sync),
    ) -> Result<ProcessOutput, ToolError> {
        debug!(command = %command, cwd = %cwd.display(), "Executing shell command");

        let failed = |reason: String| ToolError::ExecutionFailed {
            command: command.to_string(),
            reason,
        };

        let mut child = Self::command(command)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| failed("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| failed("stderr not captured".into()))?;

        let run = async move {
            let mut stdout_lines = BufReader::new(stdout).lines();
            let mut stderr_lines = BufReader::new(stderr).lines();
            let (mut stdout_done, mut stderr_done) = (false, false);
            let mut output = ProcessOutput::default();

            while !(stdout_done && stderr_done) {
                tokio::select! {
                    line = stdout_lines.next_line(), if !stdout_done => match line {
                        Ok(Some(line)) => {
                            output.stdout.push_str(&line);
                            output.stdout.push('\n');
                            sink(OutputLine::Stdout(line));
                        }
                        _ => stdout_done = true,
                    },
                    line = stderr_lines.next_line(), if !stderr_done => match line {
                        Ok(Some(line)) => {
                            output.stderr.push_str(&line);
                            output.stderr.push('\n');
                            sink(OutputLine::Stderr(line));
                        }
                        _ => stderr_done = true,
                    },
                }
            }

            let status = child.wait().await?;
            output.exit_code = status.code();
            Ok::<_, std::io::Error>(output)
        };

        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(output)) => {
                if !output.success() {
                    warn!(command = %command, exit_code = ?output.exit_code, "Command failed");
                }
                Ok(output)
            }
            Ok(Err(e)) => Err(failed(e.to_string())),
            Err(_) => Err(ToolError::Timeout {
                command: command.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }),
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(10))
    }

    #[tokio::test]
    async fn execute_echo_streams_lines() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Mutex::new(Vec::new());
        let sink = |line: OutputLine| seen.lock().unwrap().push(line);

        let output = runner()
            .run("echo hello; echo oops 1>&2", dir.path(), &sink)
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hello\n");
        assert_eq!(output.stderr, "oops\n");
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&OutputLine::Stdout("hello".into())));
        assert!(seen.contains(&OutputLine::Stderr("oops".into())));
    }

    #[tokio::test]
    async fn runs_in_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let output = runner().run("ls", dir.path(), &|_| {}).await.unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let output = runner().run("exit 3", dir.path(), &|_| {}).await.unwrap();
        assert_eq!(output.exit_code, Some(3));
        assert!(!output.success());
    }

    #[tokio::test]
    async fn timeout_kills_command() {
        let dir = tempfile::tempdir().unwrap();
        let err = ShellRunner::new(Duration::from_millis(200))
            .run("sleep 5", dir.path(), &|_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }
}
