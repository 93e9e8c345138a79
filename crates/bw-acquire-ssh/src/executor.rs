use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bw_acquire::AcquisitionError;
use tracing::debug;

/// Exit status and captured output of one remote command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self { exit_code: 0, stdout: stdout.into(), stderr: String::new() }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self { exit_code, stdout: String::new(), stderr: stderr.into() }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Turn a non-zero exit into `AcquisitionError::Remote`.
    pub fn require_success(self) -> Result<Self, AcquisitionError> {
        if self.success() {
            Ok(self)
        } else {
            Err(AcquisitionError::Remote { code: self.exit_code, stderr: self.stderr.trim().to_string() })
        }
    }
}

/// Execute a bounded command on the monitored host.
///
/// Transport failures and timeouts are errors; a command that ran and exited
/// non-zero is a normal `CommandOutput`.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Display form of the remote end, e.g. `ssh://forge.example.net`.
    fn destination(&self) -> String;

    async fn run(&self, command: &str, sudo: bool) -> Result<CommandOutput, AcquisitionError>;

    /// Establish the connection once before real work.
    async fn warm_up(&self) -> Result<(), AcquisitionError> {
        self.run("echo ok", false).await?.require_success().map(|_| ())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshOptions {
    /// Fully qualified host name.
    pub host: String,
    pub program: String,
    pub use_sudo: bool,
    /// Bound for the warm-up, long enough for a hardware-key PIN prompt.
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
}

/// `ssh <host> <command>`, one process per call.
pub struct SshExecutor {
    opts: SshOptions,
}

/// ssh reserves this exit status for its own failures.
const SSH_ERROR_EXIT: i32 = 255;

impl SshExecutor {
    pub fn new(opts: SshOptions) -> Self {
        Self { opts }
    }

    pub fn host(&self) -> &str {
        &self.opts.host
    }

    async fn exec(&self, command: &str, timeout: Duration) -> Result<CommandOutput, AcquisitionError> {
        debug!(host = %self.opts.host, %command, "ssh exec");
        let child = tokio::process::Command::new(&self.opts.program)
            .arg(&self.opts.host)
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AcquisitionError::Transport(format!("spawn {}: {e}", self.opts.program)))?;

        let out = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(res) => res.map_err(|e| AcquisitionError::Transport(format!("wait for {}: {e}", self.opts.program)))?,
            Err(_) => return Err(AcquisitionError::Timeout(timeout)),
        };

        let output = CommandOutput {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).to_string(),
            stderr: String::from_utf8_lossy(&out.stderr).to_string(),
        };
        if output.exit_code == SSH_ERROR_EXIT {
            return Err(AcquisitionError::Transport(format!(
                "ssh to {} failed: {}",
                self.opts.host,
                output.stderr.trim()
            )));
        }
        Ok(output)
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn destination(&self) -> String {
        format!("ssh://{}", self.opts.host)
    }

    async fn run(&self, command: &str, sudo: bool) -> Result<CommandOutput, AcquisitionError> {
        let command = if sudo && self.opts.use_sudo { format!("sudo {command}") } else { command.to_string() };
        self.exec(&command, self.opts.command_timeout).await
    }

    async fn warm_up(&self) -> Result<(), AcquisitionError> {
        self.exec("echo ok", self.opts.connect_timeout).await?.require_success().map(|_| ())
    }
}

/// Single-quote `s` for a POSIX shell.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
