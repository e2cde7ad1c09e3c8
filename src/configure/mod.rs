//! Configuration of ready droplets: folder syncs first, then scripts.
//!
//! Steps run strictly in order and the first failure aborts the remaining
//! steps for that droplet. Errors name the failing stage.

use std::fmt;
use std::net::IpAddr;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::info;

use crate::cloud::{Droplet, DropletId};
use crate::remote::{RemoteError, RemoteExecutor};
use crate::request::ProvisioningRequest;
use crate::scripts::ScriptRef;
use crate::transport::{CommandOutput, CommandRunner};

/// Position of a configuration step. Indices are zero-based.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Stage {
    /// Folder sync at `index` in the request.
    Folder {
        /// Zero-based position in the folder list.
        index: usize,
    },
    /// Script at `index` in the request.
    Script {
        /// Zero-based position in the script list.
        index: usize,
    },
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Folder { index } => write!(f, "folder sync #{}", index + 1),
            Self::Script { index } => write!(f, "script #{}", index + 1),
        }
    }
}

/// Output of one successful configuration step.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StepOutput {
    /// Step that produced the output.
    pub stage: Stage,
    /// Captured command output.
    pub output: CommandOutput,
}

/// Applies folder syncs and scripts to droplets.
#[derive(Clone, Debug)]
pub struct InstanceConfigurator<R: CommandRunner> {
    remote: RemoteExecutor<R>,
    scripts_dir: Utf8PathBuf,
}

impl<R: CommandRunner> InstanceConfigurator<R> {
    /// Creates a configurator resolving bare script names in `scripts_dir`.
    #[must_use]
    pub fn new(remote: RemoteExecutor<R>, scripts_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            remote,
            scripts_dir: scripts_dir.into(),
        }
    }

    /// Executor used for every step.
    #[must_use]
    pub const fn remote(&self) -> &RemoteExecutor<R> {
        &self.remote
    }

    /// Directory used to resolve bare script names.
    #[must_use]
    pub fn scripts_dir(&self) -> &Utf8Path {
        &self.scripts_dir
    }

    /// Syncs every folder of `request`, then deploys every script.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::NoAddress`] when the droplet has no public
    /// address and [`ConfigureError::Step`] for the first failing step.
    pub async fn configure(
        &self,
        droplet: &Droplet,
        request: &ProvisioningRequest,
    ) -> Result<Vec<StepOutput>, ConfigureError> {
        let host = droplet
            .public_ip()
            .ok_or(ConfigureError::NoAddress { droplet: droplet.id })?;

        let mut outputs = Vec::with_capacity(request.folders().len() + request.scripts().len());
        for (index, folder) in request.folders().iter().enumerate() {
            let stage = Stage::Folder { index };
            let output = self
                .remote
                .sync_tree(host, folder.source(), folder.destination())
                .await
                .map_err(|source| ConfigureError::Step { host, stage, source })?;
            outputs.push(StepOutput { stage, output });
        }

        outputs.extend(self.run_scripts(host, request.scripts()).await?);
        info!(droplet = %droplet.name, %host, steps = outputs.len(), "droplet configured");
        Ok(outputs)
    }

    /// Deploys `scripts` to `host` in order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigureError::Step`] for the first failing script.
    pub async fn run_scripts(
        &self,
        host: IpAddr,
        scripts: &[ScriptRef],
    ) -> Result<Vec<StepOutput>, ConfigureError> {
        let mut outputs = Vec::with_capacity(scripts.len());
        for (index, script) in scripts.iter().enumerate() {
            let stage = Stage::Script { index };
            let path = script.resolve(&self.scripts_dir);
            let output = self
                .remote
                .deploy(host, &path)
                .await
                .map_err(|source| ConfigureError::Step { host, stage, source })?;
            outputs.push(StepOutput { stage, output });
        }
        Ok(outputs)
    }
}

/// Errors raised while configuring a droplet.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ConfigureError {
    /// Raised when the droplet has no public address to connect to.
    #[error("droplet {droplet} has no public IPv4 address")]
    NoAddress {
        /// Droplet that cannot be reached.
        droplet: DropletId,
    },
    /// Raised when a step fails.
    #[error("{stage} failed on {host}: {source}")]
    Step {
        /// Target host.
        host: IpAddr,
        /// Failing step.
        stage: Stage,
        /// Underlying remote error.
        source: RemoteError,
    },
}

impl ConfigureError {
    /// Failing step, when the error came from one.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::NoAddress { .. } => None,
            Self::Step { stage, .. } => Some(*stage),
        }
    }
}

#[cfg(test)]
mod tests;
