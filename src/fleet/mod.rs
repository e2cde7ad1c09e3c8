//! Fleet reconciliation: destroy every droplet not on an allow-list.
//!
//! Destroys run concurrently and best-effort. A failure does not stop the
//! other destroys; the error reports the first failure in listing order
//! together with the droplets that were confirmed destroyed. Re-running the
//! reconciliation converges the fleet.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{info, warn};

use crate::cloud::{CloudApi, CloudError, Droplet, DropletId};
use crate::config::DEFAULT_CONCURRENCY;
use crate::fanout::in_input_order;

/// Droplet identifiers to preserve during reconciliation.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FleetAllowList {
    ids: BTreeSet<DropletId>,
}

impl FleetAllowList {
    /// Creates an empty allow-list, which preserves nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses textual identifiers, trimming whitespace and dropping
    /// duplicates.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::InvalidId`] for the first value that is not a
    /// numeric identifier.
    pub fn parse<I, S>(values: I) -> Result<Self, FleetError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        values
            .into_iter()
            .map(|value| {
                value.as_ref().parse::<DropletId>().map_err(|_| FleetError::InvalidId {
                    value: value.as_ref().to_owned(),
                })
            })
            .collect()
    }

    /// Whether `id` is preserved.
    #[must_use]
    pub fn contains(&self, id: DropletId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of preserved identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Whether the list preserves nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl FromIterator<DropletId> for FleetAllowList {
    fn from_iter<T: IntoIterator<Item = DropletId>>(iter: T) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Lists, destroys and reconciles droplets.
#[derive(Clone, Debug)]
pub struct FleetReconciler<C> {
    cloud: C,
    concurrency: usize,
}

impl<C: CloudApi> FleetReconciler<C> {
    /// Creates a reconciler with the default concurrency limit.
    #[must_use]
    pub const fn new(cloud: C) -> Self {
        Self {
            cloud,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Caps the number of destroys in flight. Zero is treated as one.
    #[must_use]
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit.max(1);
        self
    }

    /// Cloud API used by the reconciler.
    #[must_use]
    pub const fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Lists every droplet on the account.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::List`] when the provider call fails.
    pub async fn list(&self) -> Result<Vec<Droplet>, FleetError> {
        self.cloud
            .list_droplets()
            .await
            .map_err(|source| FleetError::List { source })
    }

    /// Destroys a single droplet.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::Destroy`] when the provider call fails.
    pub async fn destroy(&self, id: DropletId) -> Result<(), FleetError> {
        self.destroy_logged(id)
            .await
            .map_err(|source| FleetError::Destroy {
                droplet: id,
                source,
                destroyed: Vec::new(),
            })
    }

    /// Returns the droplets [`Self::destroy_except`] would destroy, in
    /// listing order, without destroying anything.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::List`] when listing fails.
    pub async fn plan(&self, keep: &FleetAllowList) -> Result<Vec<DropletId>, FleetError> {
        let mut seen = BTreeSet::new();
        Ok(self
            .list()
            .await?
            .into_iter()
            .map(|droplet| droplet.id)
            .filter(|id| !keep.contains(*id) && seen.insert(*id))
            .collect())
    }

    /// Destroys every droplet not in `keep`, concurrently, and returns the
    /// destroyed identifiers in listing order.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::List`] before any destroy when listing fails,
    /// or [`FleetError::Destroy`] for the first failing destroy in listing
    /// order once every destroy has finished.
    pub async fn destroy_except(&self, keep: &FleetAllowList) -> Result<Vec<DropletId>, FleetError> {
        let doomed = self.plan(keep).await?;
        info!(count = doomed.len(), kept = keep.len(), "reconciling fleet");

        let outcomes: Vec<(DropletId, Result<(), CloudError>)> = in_input_order(
            doomed
                .into_iter()
                .map(|id| async move { (id, self.destroy_logged(id).await) }),
            self.concurrency,
        )
        .await;

        let destroyed: Vec<DropletId> = outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(id, _)| *id)
            .collect();
        let first_failure = outcomes
            .into_iter()
            .find_map(|(id, outcome)| outcome.err().map(|source| (id, source)));

        match first_failure {
            None => Ok(destroyed),
            Some((droplet, source)) => Err(FleetError::Destroy {
                droplet,
                source,
                destroyed,
            }),
        }
    }

    async fn destroy_logged(&self, id: DropletId) -> Result<(), CloudError> {
        match self.cloud.destroy_droplet(id).await {
            Ok(()) => {
                info!(droplet = %id, "droplet destroyed");
                Ok(())
            }
            Err(err) => {
                warn!(droplet = %id, error = %err, "droplet destroy failed");
                Err(err)
            }
        }
    }
}

/// Errors raised while listing or reconciling the fleet.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum FleetError {
    /// Raised when listing droplets fails.
    #[error("failed to list droplets: {source}")]
    List {
        /// Provider error.
        source: CloudError,
    },
    /// Raised when a destroy fails.
    #[error("failed to destroy droplet {droplet}: {source} ({} other droplets destroyed)", .destroyed.len())]
    Destroy {
        /// First droplet, in listing order, whose destroy failed.
        droplet: DropletId,
        /// Provider error.
        source: CloudError,
        /// Droplets confirmed destroyed by the same call.
        destroyed: Vec<DropletId>,
    },
    /// Raised when an allow-list entry is not a droplet identifier.
    #[error("invalid droplet identifier `{value}`")]
    InvalidId {
        /// Offending input.
        value: String,
    },
}
