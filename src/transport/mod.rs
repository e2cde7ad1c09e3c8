//! Secure copy, remote shell and tree mirroring over the system `scp`, `ssh`
//! and `rsync` clients.
//!
//! Every invocation disables strict host-key checking: droplets are created
//! on demand and their addresses are recycled, so there is no stable host
//! key to pin. Non-zero exits are returned to the caller untouched; the
//! remote layer decides which of them are failures worth retrying.

use std::ffi::OsString;
use std::net::IpAddr;

use camino::Utf8Path;

use crate::config::{ConfigError, TransportConfig};

mod probe;
mod types;

pub use probe::{CONNECT_TIMEOUT, ProbeFuture, ReachabilityProbe, TcpProbe};
pub use types::{CommandOutput, CommandRunner, ProcessCommandRunner, RunnerFuture, TransportError};

/// Issues transport commands against a single remote user account.
#[derive(Clone, Debug)]
pub struct SshTransport<R: CommandRunner> {
    config: TransportConfig,
    runner: R,
}

impl SshTransport<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when validation fails.
    pub fn with_process_runner(config: TransportConfig) -> Result<Self, ConfigError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> SshTransport<R> {
    /// Creates a transport using the provided runner and configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration validation fails.
    pub fn new(config: TransportConfig, runner: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config, runner })
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Copies `local` to `remote` on `host` with `scp`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] when `scp` cannot be started.
    pub async fn copy(
        &self,
        host: IpAddr,
        local: &Utf8Path,
        remote: &str,
    ) -> Result<CommandOutput, TransportError> {
        let args = self.scp_args(host, local, remote);
        self.runner.run(&self.config.scp_bin, &args).await
    }

    /// Runs `command` on `host` through `ssh`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Spawn`] when `ssh` cannot be started.
    ///
    /// # Security
    ///
    /// `command` is handed to the remote shell verbatim; callers must quote
    /// any untrusted fragments.
    pub async fn run(&self, host: IpAddr, command: &str) -> Result<CommandOutput, TransportError> {
        let args = self.ssh_args(host, command);
        self.runner.run(&self.config.ssh_bin, &args).await
    }

    /// Mirrors the local directory `source` into `destination` on `host`,
    /// deleting remote files that no longer exist locally.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MissingSource`] when `source` is not a
    /// directory, or [`TransportError::Spawn`] when `rsync` cannot start.
    pub async fn sync_tree(
        &self,
        host: IpAddr,
        source: &Utf8Path,
        destination: &str,
    ) -> Result<CommandOutput, TransportError> {
        let args = self.rsync_args(host, source, destination)?;
        self.runner.run(&self.config.rsync_bin, &args).await
    }

    pub(crate) fn scp_args(&self, host: IpAddr, local: &Utf8Path, remote: &str) -> Vec<OsString> {
        let mut args = vec![OsString::from("-P"), OsString::from(self.config.port.to_string())];
        args.extend(self.common_ssh_options());
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(format!("{}:{remote}", self.login(host))));
        args
    }

    pub(crate) fn ssh_args(&self, host: IpAddr, command: &str) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(self.config.port.to_string())];
        args.extend(self.common_ssh_options());
        args.push(OsString::from(self.login(host)));
        args.push(OsString::from(command));
        args
    }

    pub(crate) fn rsync_args(
        &self,
        host: IpAddr,
        source: &Utf8Path,
        destination: &str,
    ) -> Result<Vec<OsString>, TransportError> {
        if !source.is_dir() {
            return Err(TransportError::MissingSource {
                path: source.to_path_buf(),
            });
        }

        Ok(vec![
            OsString::from("-az"),
            OsString::from("--delete"),
            OsString::from("--rsh"),
            OsString::from(self.remote_shell()),
            OsString::from(with_trailing_slash(source.as_str())),
            OsString::from(format!(
                "{}:{}",
                self.login(host),
                with_trailing_slash(destination)
            )),
        ])
    }

    fn login(&self, host: IpAddr) -> String {
        format!("{}@{host}", self.config.user)
    }

    fn common_ssh_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(self.config.private_key()),
            OsString::from("-o"),
            OsString::from("BatchMode=yes"),
            OsString::from("-o"),
            OsString::from("StrictHostKeyChecking=no"),
        ];

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args
    }

    fn remote_shell(&self) -> String {
        let opts = self
            .common_ssh_options()
            .into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} -p {} {opts}", self.config.ssh_bin, self.config.port)
    }
}

/// Appends a single `/` unless the path already ends with one, so `rsync`
/// copies directory contents rather than the directory itself.
#[must_use]
pub fn with_trailing_slash(path: &str) -> String {
    if path.ends_with('/') {
        path.to_owned()
    } else {
        format!("{path}/")
    }
}
