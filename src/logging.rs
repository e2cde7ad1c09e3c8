//! Log session management for the binary.
//!
//! The library only emits `tracing` events. A [`LogSession`] installs a
//! formatting subscriber for the lifetime of the session and removes it when
//! closed, so the sink has an explicit open and close point instead of a
//! process-wide singleton.

use tracing::subscriber::DefaultGuard;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Scoped log sink writing human-readable events to stderr.
#[derive(Debug)]
pub struct LogSession {
    guard: Option<DefaultGuard>,
}

impl LogSession {
    /// Opens a session. When `enabled` is false no subscriber is installed
    /// and events are discarded.
    #[must_use]
    pub fn open(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .finish();
        Self {
            guard: Some(tracing::subscriber::set_default(subscriber)),
        }
    }

    /// Session that installs nothing.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { guard: None }
    }

    /// Whether a subscriber is installed.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.guard.is_some()
    }

    /// Flushes and removes the subscriber.
    pub fn close(self) {
        if self.is_active() {
            tracing::debug!("closing log session");
        }
        drop(self);
    }
}
