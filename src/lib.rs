//! Core library for the Dropship droplet provisioning tool.
//!
//! The crate drives DigitalOcean droplets from creation to a configured,
//! ready state: create → wait for the creation event → wait for SSH → settle
//! → sync folders → run scripts. Batches fan out with a bounded concurrency
//! limit, and a reconciler destroys every droplet not on an allow-list.

pub mod cloud;
pub mod config;
pub mod configure;
mod fanout;
pub mod fleet;
pub mod lifecycle;
pub mod logging;
pub mod orchestrator;
pub mod remote;
pub mod request;
pub mod scripts;
pub mod test_support;
pub mod transport;

pub use cloud::{
    ActionId, ActionStatus, CloudApi, CloudError, CreateDroplet, CreatedDroplet, DigitalOceanApi,
    Droplet, DropletId,
};
pub use config::{ConfigError, ProviderConfig, TransportConfig};
pub use configure::{ConfigureError, InstanceConfigurator, Stage, StepOutput};
pub use fleet::{FleetAllowList, FleetError, FleetReconciler};
pub use lifecycle::{DropletLifecycleController, LifecycleError, LifecycleState, Timings};
pub use logging::LogSession;
pub use orchestrator::{ProvisionError, ProvisionedDroplet, ProvisioningOrchestrator};
pub use remote::{RemoteError, RemoteExecutor, RetryPolicy};
pub use request::{FolderSync, ProvisioningRequest, ProvisioningRequestBuilder, RequestError};
pub use scripts::{ScriptCatalog, ScriptError, ScriptRef};
pub use transport::{
    CommandOutput, CommandRunner, ProcessCommandRunner, ReachabilityProbe, SshTransport, TcpProbe,
    TransportError,
};
