//! Provider-neutral value types shared by the cloud API and the orchestrator.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
        )]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Wraps a raw provider identifier.
            #[must_use]
            pub const fn new(value: u64) -> Self {
                Self(value)
            }

            /// Returns the raw provider identifier.
            #[must_use]
            pub const fn get(self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ParseIntError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                value.trim().parse().map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

numeric_id!(
    /// Provider-assigned droplet identifier.
    DropletId
);
numeric_id!(
    /// Identifier of an asynchronous provider action (the creation event).
    ActionId
);

/// Snapshot of a droplet as reported by the provider.
///
/// Snapshots are fetched per operation and never cached.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Droplet {
    /// Provider identifier.
    pub id: DropletId,
    /// Droplet name.
    pub name: String,
    /// Size slug (for example `s-1vcpu-1gb`).
    pub size: String,
    /// Image slug, or the numeric image id for private images.
    pub image: String,
    /// Region slug (for example `ams3`).
    pub region: String,
    /// Public IPv4 address once networking is attached.
    pub public_ipv4: Option<Ipv4Addr>,
    /// Private IPv4 address when private networking is enabled.
    pub private_ipv4: Option<Ipv4Addr>,
    /// Whether the provider has locked the droplet against changes.
    pub locked: bool,
    /// Lifecycle status string (`new`, `active`, `off`, `archive`).
    pub status: String,
    /// Creation timestamp as reported by the provider.
    pub created_at: String,
}

impl Droplet {
    /// Returns the public address used for SSH, if assigned.
    #[must_use]
    pub fn public_ip(&self) -> Option<IpAddr> {
        self.public_ipv4.map(IpAddr::V4)
    }
}

/// Parameters of a create call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreateDroplet {
    /// Desired droplet name.
    pub name: String,
    /// Size slug.
    pub size: String,
    /// Image slug or id.
    pub image: String,
    /// Region slug.
    pub region: String,
    /// Whether to attach the droplet to the private network.
    pub private_networking: bool,
    /// Pre-registered SSH key identifiers or fingerprints.
    pub ssh_keys: Vec<String>,
}

/// Result of a create call: the initial snapshot plus its creation event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CreatedDroplet {
    /// Droplet snapshot returned by the create call. Networking is usually
    /// not attached yet.
    pub droplet: Droplet,
    /// Action tracking boot and network attachment. `None` when the
    /// provider's response carries no action link; readiness is then read
    /// from the droplet status instead.
    pub action: Option<ActionId>,
}

/// Progress of a provider action.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ActionStatus {
    /// Still running.
    InProgress,
    /// Finished successfully ("done").
    Completed,
    /// Finished with a provider-side failure.
    Errored,
}

impl ActionStatus {
    /// Maps the provider's status string; unknown values count as running.
    #[must_use]
    pub fn from_wire(value: &str) -> Self {
        match value {
            "completed" | "done" => Self::Completed,
            "errored" => Self::Errored,
            _ => Self::InProgress,
        }
    }
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::InProgress => "in-progress",
            Self::Completed => "completed",
            Self::Errored => "errored",
        };
        f.write_str(text)
    }
}
