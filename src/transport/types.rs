//! Core transport types and the command runner abstraction.

use std::ffi::OsString;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::process::Command;

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Human readable exit status, `unknown` when the process was killed.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Future returned by [`CommandRunner::run`].
pub type RunnerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CommandOutput, TransportError>> + Send + 'a>>;

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// A non-zero exit is reported through [`CommandOutput::code`], not as an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] if the command cannot be started.
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a>;
}

/// Real command runner that spawns host processes without blocking the
/// executor.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a> {
        Box::pin(async move {
            let output = Command::new(program)
                .args(args)
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| TransportError::Spawn {
                    program: program.to_owned(),
                    message: err.to_string(),
                })?;

            Ok(CommandOutput {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            })
        })
    }
}

/// Errors surfaced by the transport primitives themselves. Non-zero exits
/// are not errors at this layer.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum TransportError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when a local directory to mirror does not exist.
    #[error("sync source directory missing: {path}")]
    MissingSource {
        /// Path that was expected to be synchronised.
        path: Utf8PathBuf,
    },
    /// Raised when a TCP port never accepts a connection within the bound.
    #[error("{host}:{port} did not accept connections within {waited_secs} seconds")]
    Unreachable {
        /// Address that was probed.
        host: IpAddr,
        /// Port that was probed.
        port: u16,
        /// Length of the wait, in seconds.
        waited_secs: u64,
    },
}
