//! Script deployment over the secure transport.
//!
//! [`RemoteExecutor::deploy`] copies a script to a unique staging path with
//! bounded retry and then executes it exactly once. Execution never starts
//! unless the copy succeeded. `run_command` and `sync_tree` are single
//! attempts.

use std::net::IpAddr;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::transport::{
    CommandOutput, CommandRunner, ProcessCommandRunner, SshTransport, TransportError,
};

mod staging;

pub use staging::{STAGING_DIR, staging_path};

/// Retries after the first failed copy.
pub const DEFAULT_COPY_RETRIES: u32 = 10;

/// Fixed wait between copy attempts.
pub const DEFAULT_COPY_RETRY_DELAY: Duration = Duration::from_secs(120);

/// Copy retry budget.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub retries: u32,
    /// Wait between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_COPY_RETRIES, DEFAULT_COPY_RETRY_DELAY)
    }
}

impl RetryPolicy {
    /// Creates a policy with `retries` extra attempts spaced by `delay`.
    #[must_use]
    pub const fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    /// Total number of copy attempts, the initial one included.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }
}

/// Copies and runs scripts on reachable hosts.
#[derive(Clone, Debug)]
pub struct RemoteExecutor<R: CommandRunner> {
    transport: SshTransport<R>,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl RemoteExecutor<ProcessCommandRunner> {
    /// Executor backed by the system `scp`, `ssh` and `rsync` binaries.
    #[must_use]
    pub fn with_process_runner(transport: SshTransport<ProcessCommandRunner>) -> Self {
        Self::new(transport)
    }
}

impl<R: CommandRunner> RemoteExecutor<R> {
    /// Creates an executor with the default retry policy.
    #[must_use]
    pub fn new(transport: SshTransport<R>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the copy retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Interrupts retry waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Underlying transport.
    #[must_use]
    pub const fn transport(&self) -> &SshTransport<R> {
        &self.transport
    }

    /// Active retry policy.
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Copies `script` to a fresh staging path on `host`, then runs it once.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ScriptNotFound`] when the local script is not a
    /// file, [`RemoteError::TransferFailed`] once every copy attempt has
    /// failed, [`RemoteError::RemoteExecutionFailed`] when the script exits
    /// non-zero, [`RemoteError::Cancelled`] when a retry wait is
    /// interrupted, and [`RemoteError::Transport`] when a binary cannot be
    /// spawned.
    pub async fn deploy(&self, host: IpAddr, script: &Utf8Path) -> Result<CommandOutput, RemoteError> {
        if !script.is_file() {
            return Err(RemoteError::ScriptNotFound {
                path: script.to_path_buf(),
            });
        }

        let staged = staging_path(script);
        self.copy_with_retry(host, script, &staged).await?;

        let quoted = escape(staged.as_str().into());
        let command = format!("chmod +x {quoted} && {quoted}");
        info!(%host, script = %script, command = %command, "executing staged script");
        self.run_command(host, &command).await
    }

    async fn copy_with_retry(
        &self,
        host: IpAddr,
        script: &Utf8Path,
        staged: &str,
    ) -> Result<(), RemoteError> {
        let attempts = self.retry.attempts();
        let mut attempt = 1;
        loop {
            info!(%host, script = %script, staged, attempt, attempts, "copying script");
            let output = self.transport.copy(host, script, staged).await?;
            if output.is_success() {
                return Ok(());
            }

            warn!(
                %host,
                script = %script,
                attempt,
                attempts,
                exit_code = %output.status_text(),
                stderr = output.stderr.trim(),
                "script copy failed"
            );
            if attempt >= attempts {
                return Err(RemoteError::TransferFailed {
                    host,
                    script: script.to_path_buf(),
                    attempts,
                    stderr: output.stderr,
                });
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Err(RemoteError::Cancelled),
                () = sleep(self.retry.delay) => {}
            }
            attempt += 1;
        }
    }

    /// Runs `command` on `host` once.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::RemoteExecutionFailed`] on a non-zero or
    /// missing exit status, or [`RemoteError::Transport`] when `ssh` cannot
    /// be spawned.
    pub async fn run_command(&self, host: IpAddr, command: &str) -> Result<CommandOutput, RemoteError> {
        let output = self.transport.run(host, command).await?;
        if output.is_success() {
            return Ok(output);
        }

        warn!(%host, command, exit_code = %output.status_text(), "remote command failed");
        Err(RemoteError::RemoteExecutionFailed {
            host,
            command: command.to_owned(),
            exit_code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }

    /// Mirrors `source` into `destination` on `host` once.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::SyncFailed`] on a non-zero exit and
    /// [`RemoteError::Transport`] when the source is missing or `rsync`
    /// cannot be spawned.
    pub async fn sync_tree(
        &self,
        host: IpAddr,
        source: &Utf8Path,
        destination: &str,
    ) -> Result<CommandOutput, RemoteError> {
        info!(%host, source = %source, destination, "syncing folder");
        let output = self.transport.sync_tree(host, source, destination).await?;
        if output.is_success() {
            return Ok(output);
        }

        Err(RemoteError::SyncFailed {
            host,
            local: source.to_path_buf(),
            destination: destination.to_owned(),
            exit_code: output.code,
            stderr: output.stderr,
        })
    }
}

/// Errors raised while deploying or running commands remotely.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when the local script to deploy does not exist.
    #[error("script not found: {path}")]
    ScriptNotFound {
        /// Resolved local path.
        path: Utf8PathBuf,
    },
    /// Raised when every copy attempt exits non-zero.
    #[error("copying {script} to {host} failed after {attempts} attempts: {stderr}")]
    TransferFailed {
        /// Target host.
        host: IpAddr,
        /// Local script.
        script: Utf8PathBuf,
        /// Attempts made.
        attempts: u32,
        /// Standard error of the last attempt.
        stderr: String,
    },
    /// Raised when a remote command exits non-zero.
    #[error("`{command}` on {host} exited with {}: {stderr}", exit_text(.exit_code))]
    RemoteExecutionFailed {
        /// Target host.
        host: IpAddr,
        /// Command handed to the remote shell.
        command: String,
        /// Exit code, absent when the process was killed.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when mirroring a folder exits non-zero.
    #[error("syncing {local} to {host}:{destination} failed: {stderr}")]
    SyncFailed {
        /// Target host.
        host: IpAddr,
        /// Local directory.
        local: Utf8PathBuf,
        /// Remote directory.
        destination: String,
        /// Exit code, absent when the process was killed.
        exit_code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when the transport itself fails.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// Raised when a retry wait is interrupted.
    #[error("remote operation cancelled")]
    Cancelled,
}

fn exit_text(code: &Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown status"), |value| value.to_string())
}
