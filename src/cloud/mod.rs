//! Cloud API abstraction for droplet CRUD and creation-event lookup.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

mod digitalocean;
mod types;

pub use digitalocean::DigitalOceanApi;
pub use types::{ActionId, ActionStatus, CreateDroplet, CreatedDroplet, Droplet, DropletId};

/// Future returned by cloud API operations.
pub type CloudFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CloudError>> + Send + 'a>>;

/// Minimal interface implemented by cloud providers.
///
/// Every call is a single attempt; retry and timeout policy belong to the
/// callers.
pub trait CloudApi {
    /// Requests a new droplet and returns its creation event.
    fn create_droplet<'a>(&'a self, request: &'a CreateDroplet) -> CloudFuture<'a, CreatedDroplet>;

    /// Fetches a fresh snapshot of one droplet.
    fn get_droplet(&self, id: DropletId) -> CloudFuture<'_, Droplet>;

    /// Lists every droplet visible to the account.
    fn list_droplets(&self) -> CloudFuture<'_, Vec<Droplet>>;

    /// Destroys a droplet.
    fn destroy_droplet(&self, id: DropletId) -> CloudFuture<'_, ()>;

    /// Reports the progress of an asynchronous action.
    fn get_action(&self, id: ActionId) -> CloudFuture<'_, ActionStatus>;
}

/// Errors raised by cloud API implementations.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CloudError {
    /// Raised when the request never produced an HTTP response.
    #[error("request to {endpoint} failed: {message}")]
    Http {
        /// Endpoint path that was called.
        endpoint: String,
        /// Transport-level failure description.
        message: String,
    },
    /// Raised when the provider answers with a non-success status.
    #[error("provider rejected {endpoint} with status {status}: {message}")]
    Api {
        /// Endpoint path that was called.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Message extracted from the provider's error body.
        message: String,
    },
    /// Raised when a response body does not match the expected shape.
    #[error("unexpected response from {endpoint}: {message}")]
    Decode {
        /// Endpoint path that was called.
        endpoint: String,
        /// Parser or validation message.
        message: String,
    },
}

#[cfg(test)]
mod tests;
