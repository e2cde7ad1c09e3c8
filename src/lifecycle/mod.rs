//! Droplet lifecycle: create, await the creation event, wait for SSH, settle.
//!
//! The controller walks one droplet through
//! `Requested → Creating → AwaitingEvent → PortWait → Settling → Ready`.
//! Any stage may end in `Failed`. The creation timeout is checked only on
//! event-poll ticks and only after the tick's status has been evaluated, so
//! an observed completion is never reported as a timeout. Port waiting and
//! settling have their own bounds and are not covered by the creation
//! timeout. A create response without an action link is tracked by polling
//! the droplet status until it reports `active`. Nothing is rolled back on failure; errors carry the droplet id
//! so callers can clean up.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cloud::{ActionId, ActionStatus, CloudApi, CloudError, Droplet, DropletId};
use crate::request::ProvisioningRequest;
use crate::transport::{ReachabilityProbe, TransportError};

/// Interval between creation-event polls.
pub const EVENT_POLL_INTERVAL: Duration = Duration::from_secs(8);
/// Bound on event polling, measured from the create request.
pub const CREATION_TIMEOUT: Duration = Duration::from_secs(600);
/// Granularity of SSH port probing.
pub const PORT_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Bound on SSH port probing.
pub const PORT_WAIT_TIMEOUT: Duration = Duration::from_secs(240);
/// Grace period after the port opens.
pub const SETTLE_DELAY: Duration = Duration::from_secs(10);
/// Port probed for readiness.
pub const SSH_PORT: u16 = 22;
/// Droplet status that marks creation as finished when the create response
/// carries no action to poll.
const ACTIVE_STATUS: &str = "active";

/// Timing policy for [`DropletLifecycleController`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Timings {
    /// Interval between creation-event polls.
    pub event_poll_interval: Duration,
    /// Bound on event polling.
    pub creation_timeout: Duration,
    /// Granularity of port probing.
    pub port_poll_interval: Duration,
    /// Bound on port probing.
    pub port_wait_timeout: Duration,
    /// Grace period after the port opens.
    pub settle_delay: Duration,
    /// Port probed for readiness.
    pub ssh_port: u16,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            event_poll_interval: EVENT_POLL_INTERVAL,
            creation_timeout: CREATION_TIMEOUT,
            port_poll_interval: PORT_POLL_INTERVAL,
            port_wait_timeout: PORT_WAIT_TIMEOUT,
            settle_delay: SETTLE_DELAY,
            ssh_port: SSH_PORT,
        }
    }
}

/// Stages of a droplet's lifecycle.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum LifecycleState {
    /// Request accepted, nothing sent yet.
    Requested,
    /// Create call in flight.
    Creating,
    /// Polling the creation event.
    AwaitingEvent,
    /// Waiting for the SSH port to open.
    PortWait,
    /// Grace period before the droplet is usable.
    Settling,
    /// Droplet is ready for configuration.
    Ready,
    /// Terminal failure.
    Failed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Requested => "requested",
            Self::Creating => "creating",
            Self::AwaitingEvent => "awaiting-event",
            Self::PortWait => "port-wait",
            Self::Settling => "settling",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(text)
    }
}

/// Drives single droplets from create request to ready.
#[derive(Clone, Debug)]
pub struct DropletLifecycleController<C, P> {
    cloud: C,
    probe: P,
    ssh_key_id: String,
    timings: Timings,
    cancel: CancellationToken,
}

impl<C, P> DropletLifecycleController<C, P>
where
    C: CloudApi,
    P: ReachabilityProbe,
{
    /// Creates a controller injecting `ssh_key_id` into every droplet.
    #[must_use]
    pub fn new(cloud: C, probe: P, ssh_key_id: impl Into<String>) -> Self {
        Self {
            cloud,
            probe,
            ssh_key_id: ssh_key_id.into(),
            timings: Timings::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Overrides the timing policy.
    #[must_use]
    pub const fn with_timings(mut self, timings: Timings) -> Self {
        self.timings = timings;
        self
    }

    /// Interrupts waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cloud API used by the controller.
    #[must_use]
    pub const fn cloud(&self) -> &C {
        &self.cloud
    }

    /// Active timing policy.
    #[must_use]
    pub const fn timings(&self) -> Timings {
        self.timings
    }

    /// Creates the droplet described by `request` and waits until it is
    /// ready for configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError`] describing the stage that failed. The
    /// droplet is left in place when a stage after creation fails.
    pub async fn bring_up(&self, request: &ProvisioningRequest) -> Result<Droplet, LifecycleError> {
        let name = request.name();
        let started = Instant::now();
        transition(name, LifecycleState::Requested);

        transition(name, LifecycleState::Creating);
        let created = self
            .cloud
            .create_droplet(&request.create_call(&self.ssh_key_id))
            .await
            .map_err(|source| {
                fail(name, LifecycleError::Create {
                    name: name.to_owned(),
                    source,
                })
            })?;
        let id = created.droplet.id;

        transition(name, LifecycleState::AwaitingEvent);
        self.await_event(name, id, created.action, started)
            .await
            .map_err(|err| fail(name, err))?;

        let droplet = self
            .cloud
            .get_droplet(id)
            .await
            .map_err(|source| fail(name, LifecycleError::Poll { droplet: id, source }))?;
        let host = droplet
            .public_ip()
            .ok_or_else(|| fail(name, LifecycleError::MissingPublicIp { droplet: id }))?;

        transition(name, LifecycleState::PortWait);
        let probe = self.probe.wait_until_open(
            host,
            self.timings.ssh_port,
            self.timings.port_poll_interval,
            self.timings.port_wait_timeout,
        );
        self.cancellable(id, LifecycleState::PortWait, probe)
            .await
            .and_then(|probed| {
                probed.map_err(|source| LifecycleError::PortTimeout { droplet: id, source })
            })
            .map_err(|err| fail(name, err))?;

        transition(name, LifecycleState::Settling);
        self.cancellable(id, LifecycleState::Settling, sleep(self.timings.settle_delay))
            .await
            .map_err(|err| fail(name, err))?;

        transition(name, LifecycleState::Ready);
        Ok(droplet)
    }

    async fn await_event(
        &self,
        name: &str,
        droplet: DropletId,
        action: Option<ActionId>,
        started: Instant,
    ) -> Result<(), LifecycleError> {
        let mut tick: u32 = 0;
        loop {
            self.cancellable(
                droplet,
                LifecycleState::AwaitingEvent,
                sleep(self.timings.event_poll_interval),
            )
            .await?;
            tick += 1;

            match action {
                Some(action) => {
                    let status = self
                        .cloud
                        .get_action(action)
                        .await
                        .map_err(|source| LifecycleError::Poll { droplet, source })?;
                    info!(droplet = name, %action, tick, %status, "polled creation event");

                    match status {
                        ActionStatus::Completed => return Ok(()),
                        ActionStatus::Errored => {
                            return Err(LifecycleError::EventErrored { droplet, action });
                        }
                        ActionStatus::InProgress => {}
                    }
                }
                None => {
                    let snapshot = self
                        .cloud
                        .get_droplet(droplet)
                        .await
                        .map_err(|source| LifecycleError::Poll { droplet, source })?;
                    info!(droplet = name, tick, status = %snapshot.status, "polled droplet status");

                    if snapshot.status == ACTIVE_STATUS {
                        return Ok(());
                    }
                }
            }

            let elapsed = started.elapsed();
            if elapsed > self.timings.creation_timeout {
                return Err(LifecycleError::CreationTimeout {
                    droplet,
                    waited_secs: elapsed.as_secs(),
                });
            }
        }
    }

    async fn cancellable<F: Future>(
        &self,
        droplet: DropletId,
        state: LifecycleState,
        work: F,
    ) -> Result<F::Output, LifecycleError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(LifecycleError::Cancelled { droplet, state }),
            output = work => Ok(output),
        }
    }
}

fn transition(name: &str, state: LifecycleState) {
    info!(droplet = name, %state, "lifecycle transition");
}

fn fail(name: &str, err: LifecycleError) -> LifecycleError {
    warn!(
        droplet = name,
        state = %LifecycleState::Failed,
        stage = %err.failed_in(),
        error = %err,
        "lifecycle transition"
    );
    err
}

/// Terminal lifecycle failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum LifecycleError {
    /// Raised when the provider rejects the create call.
    #[error("failed to create droplet `{name}`: {source}")]
    Create {
        /// Requested droplet name.
        name: String,
        /// Provider error.
        source: CloudError,
    },
    /// Raised when looking up the creation event or the droplet fails.
    #[error("failed to poll droplet {droplet}: {source}")]
    Poll {
        /// Droplet being polled.
        droplet: DropletId,
        /// Provider error.
        source: CloudError,
    },
    /// Raised when the provider reports the creation event as failed.
    #[error("creation event {action} for droplet {droplet} errored")]
    EventErrored {
        /// Droplet being created.
        droplet: DropletId,
        /// Failed action.
        action: ActionId,
    },
    /// Raised when the creation event is still running past the bound.
    #[error("droplet {droplet} was not created within {waited_secs} seconds")]
    CreationTimeout {
        /// Droplet being created.
        droplet: DropletId,
        /// Seconds elapsed since the create request.
        waited_secs: u64,
    },
    /// Raised when a created droplet has no public IPv4 address.
    #[error("droplet {droplet} has no public IPv4 address")]
    MissingPublicIp {
        /// Droplet lacking an address.
        droplet: DropletId,
    },
    /// Raised when the SSH port never opens.
    #[error("droplet {droplet} never became reachable: {source}")]
    PortTimeout {
        /// Droplet being probed.
        droplet: DropletId,
        /// Probe error.
        source: TransportError,
    },
    /// Raised when the caller cancels the lifecycle.
    #[error("lifecycle of droplet {droplet} cancelled while {state}")]
    Cancelled {
        /// Droplet left behind by the interrupted lifecycle.
        droplet: DropletId,
        /// Stage that was interrupted.
        state: LifecycleState,
    },
}

impl LifecycleError {
    /// Stage in which the failure occurred.
    #[must_use]
    pub const fn failed_in(&self) -> LifecycleState {
        match self {
            Self::Create { .. } => LifecycleState::Creating,
            Self::Poll { .. } | Self::EventErrored { .. } | Self::CreationTimeout { .. } => {
                LifecycleState::AwaitingEvent
            }
            Self::MissingPublicIp { .. } | Self::PortTimeout { .. } => LifecycleState::PortWait,
            Self::Cancelled { state, .. } => *state,
        }
    }

    /// Droplet that was created before the failure, if any.
    #[must_use]
    pub const fn droplet(&self) -> Option<DropletId> {
        match self {
            Self::Create { .. } => None,
            Self::Poll { droplet, .. }
            | Self::Cancelled { droplet, .. }
            | Self::EventErrored { droplet, .. }
            | Self::CreationTimeout { droplet, .. }
            | Self::MissingPublicIp { droplet }
            | Self::PortTimeout { droplet, .. } => Some(*droplet),
        }
    }
}

#[cfg(test)]
mod tests;
