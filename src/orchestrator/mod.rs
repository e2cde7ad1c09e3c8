//! Batch provisioning: fan requests out to lifecycle and configuration
//! pipelines, fan outcomes back in.
//!
//! Pipelines run concurrently on the caller's task, at most `concurrency`
//! at a time. Outcomes are reported in input order, not completion order.
//! A failing pipeline never cancels its siblings, and droplets created by
//! successful siblings are kept.

use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::{CloudApi, CloudError, Droplet, DropletId};
use crate::config::DEFAULT_CONCURRENCY;
use crate::configure::{ConfigureError, InstanceConfigurator, StepOutput};
use crate::fanout::in_input_order;
use crate::lifecycle::{DropletLifecycleController, LifecycleError};
use crate::request::ProvisioningRequest;
use crate::scripts::ScriptRef;
use crate::transport::{CommandRunner, ReachabilityProbe};

/// A ready and configured droplet.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProvisionedDroplet {
    /// Droplet snapshot taken when it became ready.
    pub droplet: Droplet,
    /// Outputs of the folder syncs and scripts, in execution order.
    pub steps: Vec<StepOutput>,
}

/// Runs provisioning pipelines for batches of requests.
#[derive(Clone, Debug)]
pub struct ProvisioningOrchestrator<C, P, R: CommandRunner> {
    lifecycle: DropletLifecycleController<C, P>,
    configurator: InstanceConfigurator<R>,
    concurrency: usize,
}

impl<C, P, R> ProvisioningOrchestrator<C, P, R>
where
    C: CloudApi,
    P: ReachabilityProbe,
    R: CommandRunner,
{
    /// Creates an orchestrator with the default concurrency limit.
    #[must_use]
    pub const fn new(
        lifecycle: DropletLifecycleController<C, P>,
        configurator: InstanceConfigurator<R>,
    ) -> Self {
        Self {
            lifecycle,
            configurator,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps the number of pipelines in flight. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Lifecycle controller shared by every pipeline.
    #[must_use]
    pub const fn lifecycle(&self) -> &DropletLifecycleController<C, P> {
        &self.lifecycle
    }

    /// Configurator shared by every pipeline.
    #[must_use]
    pub const fn configurator(&self) -> &InstanceConfigurator<R> {
        &self.configurator
    }

    /// Brings one droplet up and configures it.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisionError::Lifecycle`] when the droplet never becomes
    /// ready and [`ProvisionError::Configure`] when a step fails.
    pub async fn provision_one(
        &self,
        request: &ProvisioningRequest,
    ) -> Result<ProvisionedDroplet, ProvisionError> {
        let droplet = self
            .lifecycle
            .bring_up(request)
            .await
            .map_err(|source| ProvisionError::Lifecycle {
                name: request.name().to_owned(),
                source,
            })?;

        let steps = self
            .configurator
            .configure(&droplet, request)
            .await
            .map_err(|source| ProvisionError::Configure {
                droplet: droplet.id,
                source,
            })?;

        info!(droplet = %droplet.name, id = %droplet.id, steps = steps.len(), "droplet provisioned");
        Ok(ProvisionedDroplet { droplet, steps })
    }

    /// Provisions every request and returns one outcome per request, in
    /// input order.
    pub async fn provision_all(
        &self,
        requests: &[ProvisioningRequest],
    ) -> Vec<Result<ProvisionedDroplet, ProvisionError>> {
        info!(count = requests.len(), limit = self.concurrency, "provisioning batch");
        let outcomes = in_input_order(
            requests.iter().map(|request| self.provision_one(request)),
            self.concurrency,
        )
        .await;
        log_failures(&outcomes);
        outcomes
    }

    /// Provisions every request, reporting the first failure in input order.
    ///
    /// Every pipeline runs to completion even when an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] in input order.
    pub async fn provision(
        &self,
        requests: &[ProvisioningRequest],
    ) -> Result<Vec<ProvisionedDroplet>, ProvisionError> {
        self.provision_all(requests).await.into_iter().collect()
    }

    /// Runs `scripts` in order against each existing droplet, concurrently
    /// across droplets. Outcomes follow the order of `ids`.
    pub async fn run_against_many(
        &self,
        ids: &[DropletId],
        scripts: &[ScriptRef],
    ) -> Vec<Result<Vec<StepOutput>, ProvisionError>> {
        let outcomes = in_input_order(
            ids.iter().map(|id| self.run_against_one(*id, scripts)),
            self.concurrency,
        )
        .await;
        log_failures(&outcomes);
        outcomes
    }

    /// Like [`Self::run_against_many`], reporting the first failure in
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProvisionError`] in input order.
    pub async fn run_against_many_checked(
        &self,
        ids: &[DropletId],
        scripts: &[ScriptRef],
    ) -> Result<Vec<Vec<StepOutput>>, ProvisionError> {
        self.run_against_many(ids, scripts)
            .await
            .into_iter()
            .collect()
    }

    async fn run_against_one(
        &self,
        id: DropletId,
        scripts: &[ScriptRef],
    ) -> Result<Vec<StepOutput>, ProvisionError> {
        let droplet = self
            .lifecycle
            .cloud()
            .get_droplet(id)
            .await
            .map_err(|source| ProvisionError::Lookup { droplet: id, source })?;
        let host = droplet.public_ip().ok_or(ProvisionError::Configure {
            droplet: id,
            source: ConfigureError::NoAddress { droplet: id },
        })?;

        self.configurator
            .run_scripts(host, scripts)
            .await
            .map_err(|source| ProvisionError::Configure { droplet: id, source })
    }
}

fn log_failures<T>(outcomes: &[Result<T, ProvisionError>]) {
    for (index, err) in outcomes
        .iter()
        .enumerate()
        .filter_map(|(index, outcome)| outcome.as_ref().err().map(|err| (index, err)))
    {
        warn!(index, error = %err, "pipeline failed");
    }
}

/// Errors raised by a provisioning or script pipeline.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ProvisionError {
    /// Raised when a droplet never reaches the ready state.
    #[error("droplet `{name}` did not become ready: {source}")]
    Lifecycle {
        /// Requested droplet name.
        name: String,
        /// Lifecycle failure.
        source: LifecycleError,
    },
    /// Raised when configuring a ready droplet fails.
    #[error("configuring droplet {droplet} failed: {source}")]
    Configure {
        /// Droplet being configured.
        droplet: DropletId,
        /// Configuration failure.
        source: ConfigureError,
    },
    /// Raised when an existing droplet cannot be fetched.
    #[error("failed to look up droplet {droplet}: {source}")]
    Lookup {
        /// Droplet requested.
        droplet: DropletId,
        /// Provider error.
        source: CloudError,
    },
}

impl ProvisionError {
    /// Droplet the failure concerns, when one was created or named.
    #[must_use]
    pub const fn droplet(&self) -> Option<DropletId> {
        match self {
            Self::Lifecycle { source, .. } => source.droplet(),
            Self::Configure { droplet, .. } | Self::Lookup { droplet, .. } => Some(*droplet),
        }
    }
}
