//! External command execution with a deadline

use std::process::Stdio;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use tokio::process::Command;
use tokio::time::timeout;

use macshift_core::error::SystemError;
use macshift_core::Result;

/// Captured result of one command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Whether the command exited with status 0
    pub success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Runs platform tools, optionally through `sudo`, bounded by a timeout
#[derive(Debug, Clone)]
pub struct CommandRunner {
    operation_timeout: Duration,
    use_sudo: bool,
}

impl CommandRunner {
    pub fn new(operation_timeout: Duration, use_sudo: bool) -> Self {
        Self {
            operation_timeout,
            use_sudo,
        }
    }

    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    /// Run `program args..`. Privileged commands go through `sudo` when the
    /// runner is configured for it.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`CommandOutput::success`]. Spawn failures and timeouts are errors.
    pub async fn run(&self, program: &str, args: &[&str], privileged: bool) -> Result<CommandOutput> {
        let command_line = format!("{} {}", program, args.join(" "));

        let mut cmd = if privileged && self.use_sudo {
            let mut cmd = Command::new("sudo");
            cmd.arg("-n").arg(program);
            cmd
        } else {
            Command::new(program)
        };
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!("Executing: {}", command_line);
        let start_time = Instant::now();
        let result = timeout(self.operation_timeout, cmd.output()).await;
        let duration_ms = start_time.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let success = output.status.success();
                let exit_code = output.status.code();

                if success {
                    debug!("{} completed in {}ms", command_line, duration_ms);
                } else {
                    warn!(
                        "{} failed with exit code {:?}: {}",
                        command_line,
                        exit_code,
                        stderr.trim()
                    );
                }

                Ok(CommandOutput {
                    success,
                    exit_code,
                    stdout,
                    stderr,
                    duration_ms,
                })
            }
            Ok(Err(e)) => {
                error!("{} failed to execute: {}", command_line, e);
                Err(SystemError::CommandFailed {
                    command: command_line,
                    stderr: e.to_string(),
                }
                .into())
            }
            Err(_) => {
                error!(
                    "{} timed out after {:?}",
                    command_line, self.operation_timeout
                );
                Err(SystemError::Timeout {
                    operation: command_line,
                    seconds: self.operation_timeout.as_secs(),
                }
                .into())
            }
        }
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(10), false)
    }
}
