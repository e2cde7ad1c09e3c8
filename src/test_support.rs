//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here never touch the network or spawn processes. They are
//! `Send + Sync` and cheap to clone so a test can keep a handle for
//! assertions after moving a copy into the component under test.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::sleep;

use crate::cloud::{
    ActionId, ActionStatus, CloudApi, CloudError, CloudFuture, CreateDroplet, CreatedDroplet,
    Droplet, DropletId,
};
use crate::config::{DEFAULT_API_BASE, DEFAULT_CONCURRENCY, ProviderConfig, TransportConfig};
use crate::transport::{
    CommandOutput, CommandRunner, ProbeFuture, ReachabilityProbe, RunnerFuture, TransportError,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex
        .lock()
        .unwrap_or_else(|err| panic!("test double lock poisoned: {err}"))
}

/// Provider configuration with every required field populated.
#[must_use]
pub fn provider_config(scripts_dir: &str) -> ProviderConfig {
    ProviderConfig {
        client_id: String::from("client-123"),
        api_key: String::from("secret-token"),
        scripts_dir: scripts_dir.to_owned(),
        ssh_key_id: String::from("512190"),
        logging: false,
        api_base: DEFAULT_API_BASE.to_owned(),
        concurrency: DEFAULT_CONCURRENCY,
    }
}

/// Transport configuration pointing at fake key paths.
#[must_use]
pub fn transport_config() -> TransportConfig {
    TransportConfig {
        private_key_path: String::from("/keys/id_ed25519"),
        public_key_path: String::from("/keys/id_ed25519.pub"),
        user: String::from("root"),
        port: 22,
        scp_bin: String::from("scp"),
        ssh_bin: String::from("ssh"),
        rsync_bin: String::from("rsync"),
        known_hosts_file: String::from("/dev/null"),
    }
}

/// Builds an active droplet snapshot with a deterministic public address.
#[must_use]
pub fn droplet(id: u64, name: &str) -> Droplet {
    let octet = u8::try_from(id % 250).unwrap_or(0) + 1;
    Droplet {
        id: DropletId::new(id),
        name: name.to_owned(),
        size: String::from("s-1vcpu-1gb"),
        image: String::from("ubuntu-24-04-x64"),
        region: String::from("ams3"),
        public_ipv4: Some(Ipv4Addr::new(203, 0, 113, octet)),
        private_ipv4: Some(Ipv4Addr::new(10, 0, 0, octet)),
        locked: false,
        status: String::from("active"),
        created_at: String::from("2024-05-07T14:11:12Z"),
    }
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

type Responder = dyn Fn(&CommandInvocation) -> CommandOutput + Send + Sync;

#[derive(Default)]
struct RunnerState {
    responses: VecDeque<CommandOutput>,
    invocations: Vec<CommandInvocation>,
}

/// Scripted command runner.
///
/// Queued outputs are returned in FIFO order. Once the queue is empty an
/// optional responder computes the output from the invocation, which keeps
/// tests deterministic when several droplets interleave their commands.
#[derive(Clone, Default)]
pub struct ScriptedRunner {
    state: Arc<Mutex<RunnerState>>,
    responder: Option<Arc<Responder>>,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("invocations", &lock(&self.state).invocations.len())
            .finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a runner that answers every call with `responder`.
    #[must_use]
    pub fn responding<F>(responder: F) -> Self
    where
        F: Fn(&CommandInvocation) -> CommandOutput + Send + Sync + 'static,
    {
        Self {
            state: Arc::default(),
            responder: Some(Arc::new(responder)),
        }
    }

    /// Creates a runner that succeeds on every call.
    #[must_use]
    pub fn always_succeeding() -> Self {
        Self::responding(|_| success_output())
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.state).invocations.clone()
    }

    /// Returns the invocations of one program.
    #[must_use]
    pub fn invocations_of(&self, program: &str) -> Vec<CommandInvocation> {
        self.invocations()
            .into_iter()
            .filter(|call| call.program == program)
            .collect()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.state).responses.push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

/// Output of a command that exited with status zero.
#[must_use]
pub fn success_output() -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: String::new(),
        stderr: String::new(),
    }
}

/// Output of a command that exited with `code` and a canned stderr.
#[must_use]
pub fn failure_output(code: i32) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: String::from("simulated failure"),
    }
}

impl CommandRunner for ScriptedRunner {
    fn run<'a>(&'a self, program: &'a str, args: &'a [OsString]) -> RunnerFuture<'a> {
        let invocation = CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        };
        let queued = {
            let mut state = lock(&self.state);
            state.invocations.push(invocation.clone());
            state.responses.pop_front()
        };
        let result = queued
            .or_else(|| self.responder.as_ref().map(|respond| respond(&invocation)))
            .ok_or_else(|| TransportError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            });
        Box::pin(async move { result })
    }
}

#[derive(Debug)]
struct CloudState {
    droplets: Vec<Droplet>,
    next_id: u64,
    pending_polls: u32,
    poll_counts: HashMap<ActionId, u32>,
    action_owner: HashMap<ActionId, DropletId>,
    lookup_counts: HashMap<DropletId, u32>,
    omit_actions: bool,
    fail_create: BTreeSet<String>,
    fail_destroy: BTreeSet<DropletId>,
    fail_lookup: BTreeSet<DropletId>,
    errored_actions: bool,
    fail_polls: bool,
    fail_list: bool,
    assign_public_ip: bool,
    created: Vec<CreateDroplet>,
    destroyed: Vec<DropletId>,
}

impl Default for CloudState {
    fn default() -> Self {
        Self {
            droplets: Vec::new(),
            next_id: 100,
            pending_polls: 0,
            poll_counts: HashMap::new(),
            action_owner: HashMap::new(),
            lookup_counts: HashMap::new(),
            omit_actions: false,
            fail_create: BTreeSet::new(),
            fail_destroy: BTreeSet::new(),
            fail_lookup: BTreeSet::new(),
            errored_actions: false,
            fail_polls: false,
            fail_list: false,
            assign_public_ip: true,
            created: Vec::new(),
            destroyed: Vec::new(),
        }
    }
}

/// In-memory cloud provider.
///
/// Created droplets receive sequential identifiers starting at 100 and a
/// public address derived from the identifier. Creation actions complete
/// after a configurable number of in-progress polls.
#[derive(Clone, Debug, Default)]
pub struct FakeCloud {
    state: Arc<Mutex<CloudState>>,
}

impl FakeCloud {
    /// Creates an empty fake provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider that already hosts droplets with the given ids.
    #[must_use]
    pub fn with_droplets(ids: &[u64]) -> Self {
        let cloud = Self::new();
        {
            let mut state = lock(&cloud.state);
            state.droplets = ids
                .iter()
                .map(|id| droplet(*id, &format!("existing-{id}")))
                .collect();
        }
        cloud
    }

    /// Every creation action reports in progress `polls` times before it
    /// completes.
    #[must_use]
    pub fn completing_after(self, polls: u32) -> Self {
        lock(&self.state).pending_polls = polls;
        self
    }

    /// Creation actions never complete.
    #[must_use]
    pub fn never_completing(self) -> Self {
        self.completing_after(u32::MAX)
    }

    /// Creation actions finish with a provider-side failure.
    #[must_use]
    pub fn with_errored_actions(self) -> Self {
        lock(&self.state).errored_actions = true;
        self
    }

    /// Action lookups fail at the API level.
    #[must_use]
    pub fn failing_polls(self) -> Self {
        lock(&self.state).fail_polls = true;
        self
    }

    /// Listing droplets fails at the API level.
    #[must_use]
    pub fn failing_list(self) -> Self {
        lock(&self.state).fail_list = true;
        self
    }

    /// Created droplets never receive a public address.
    #[must_use]
    pub fn without_public_ips(self) -> Self {
        lock(&self.state).assign_public_ip = false;
        self
    }

    /// Create responses carry no action link. Created droplets report
    /// `new` until the configured number of lookups has been served.
    #[must_use]
    pub fn without_action_links(self) -> Self {
        lock(&self.state).omit_actions = true;
        self
    }

    /// Create calls for `name` are rejected.
    #[must_use]
    pub fn failing_create(self, name: &str) -> Self {
        lock(&self.state).fail_create.insert(name.to_owned());
        self
    }

    /// Destroy calls for `id` are rejected.
    #[must_use]
    pub fn failing_destroy(self, id: u64) -> Self {
        lock(&self.state).fail_destroy.insert(DropletId::new(id));
        self
    }

    /// Lookups of `id` are rejected.
    #[must_use]
    pub fn failing_lookup(self, id: u64) -> Self {
        lock(&self.state).fail_lookup.insert(DropletId::new(id));
        self
    }

    /// Create calls received so far, in call order.
    #[must_use]
    pub fn created(&self) -> Vec<CreateDroplet> {
        lock(&self.state).created.clone()
    }

    /// Droplets destroyed so far, in call order.
    #[must_use]
    pub fn destroyed(&self) -> Vec<DropletId> {
        lock(&self.state).destroyed.clone()
    }

    /// Identifiers of the droplets still present.
    #[must_use]
    pub fn remaining(&self) -> Vec<DropletId> {
        lock(&self.state).droplets.iter().map(|d| d.id).collect()
    }

    /// Total number of action polls served.
    #[must_use]
    pub fn action_polls(&self) -> u32 {
        lock(&self.state).poll_counts.values().sum()
    }

    fn api_error(endpoint: String, status: u16, message: &str) -> CloudError {
        CloudError::Api {
            endpoint,
            status,
            message: message.to_owned(),
        }
    }
}

impl CloudApi for FakeCloud {
    fn create_droplet<'a>(&'a self, request: &'a CreateDroplet) -> CloudFuture<'a, CreatedDroplet> {
        let result = {
            let mut state = lock(&self.state);
            state.created.push(request.clone());
            if state.fail_create.contains(&request.name) {
                Err(Self::api_error(
                    String::from("/droplets"),
                    422,
                    "size is not available in this region",
                ))
            } else {
                let id = state.next_id;
                state.next_id += 1;
                let mut snapshot = droplet(id, &request.name);
                snapshot.size.clone_from(&request.size);
                snapshot.image.clone_from(&request.image);
                snapshot.region.clone_from(&request.region);
                if !state.assign_public_ip {
                    snapshot.public_ipv4 = None;
                }
                if !request.private_networking {
                    snapshot.private_ipv4 = None;
                }
                let action = if state.omit_actions {
                    snapshot.status = String::from("new");
                    None
                } else {
                    let action = ActionId::new(id * 10);
                    state.action_owner.insert(action, snapshot.id);
                    Some(action)
                };
                state.droplets.push(snapshot.clone());
                snapshot.status = String::from("new");
                snapshot.public_ipv4 = None;
                Ok(CreatedDroplet {
                    droplet: snapshot,
                    action,
                })
            }
        };
        Box::pin(async move { result })
    }

    fn get_droplet(&self, id: DropletId) -> CloudFuture<'_, Droplet> {
        let result = {
            let mut state = lock(&self.state);
            if state.fail_lookup.contains(&id) {
                Err(Self::api_error(format!("/droplets/{id}"), 500, "internal error"))
            } else {
                if state.omit_actions {
                    let served = {
                        let count = state.lookup_counts.entry(id).or_insert(0);
                        *count += 1;
                        *count
                    };
                    let pending = state.pending_polls;
                    if let Some(snapshot) = state.droplets.iter_mut().find(|d| d.id == id)
                        && served > pending
                    {
                        snapshot.status = String::from("active");
                    }
                }
                state
                    .droplets
                    .iter()
                    .find(|candidate| candidate.id == id)
                    .cloned()
                    .ok_or_else(|| {
                        Self::api_error(format!("/droplets/{id}"), 404, "droplet not found")
                    })
            }
        };
        Box::pin(async move { result })
    }

    fn list_droplets(&self) -> CloudFuture<'_, Vec<Droplet>> {
        let result = {
            let state = lock(&self.state);
            if state.fail_list {
                Err(Self::api_error(String::from("/droplets"), 503, "unavailable"))
            } else {
                Ok(state.droplets.clone())
            }
        };
        Box::pin(async move { result })
    }

    fn destroy_droplet(&self, id: DropletId) -> CloudFuture<'_, ()> {
        let result = {
            let mut state = lock(&self.state);
            if state.fail_destroy.contains(&id) {
                Err(Self::api_error(format!("/droplets/{id}"), 500, "destroy rejected"))
            } else {
                state.droplets.retain(|candidate| candidate.id != id);
                state.destroyed.push(id);
                Ok(())
            }
        };
        Box::pin(async move { result })
    }

    fn get_action(&self, id: ActionId) -> CloudFuture<'_, ActionStatus> {
        let result = {
            let mut state = lock(&self.state);
            let served = {
                let count = state.poll_counts.entry(id).or_insert(0);
                *count += 1;
                *count
            };
            if state.fail_polls {
                Err(Self::api_error(format!("/actions/{id}"), 500, "internal error"))
            } else if state.errored_actions {
                Ok(ActionStatus::Errored)
            } else if served > state.pending_polls {
                if let Some(owner) = state.action_owner.get(&id).copied()
                    && let Some(snapshot) = state.droplets.iter_mut().find(|d| d.id == owner)
                {
                    snapshot.status = String::from("active");
                }
                Ok(ActionStatus::Completed)
            } else {
                Ok(ActionStatus::InProgress)
            }
        };
        Box::pin(async move { result })
    }
}

/// Arguments of a single probe call.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ProbeCall {
    /// Address probed.
    pub host: IpAddr,
    /// Port probed.
    pub port: u16,
    /// Poll granularity requested.
    pub poll_interval: Duration,
    /// Overall bound requested.
    pub limit: Duration,
}

/// Reachability probe that reports a fixed answer.
///
/// An unreachable probe sleeps for the full bound before failing so tests on
/// paused time observe realistic elapsed durations.
#[derive(Clone, Debug)]
pub struct FakeProbe {
    reachable: bool,
    calls: Arc<Mutex<Vec<ProbeCall>>>,
}

impl FakeProbe {
    /// Probe whose target port is always open.
    #[must_use]
    pub fn reachable() -> Self {
        Self {
            reachable: true,
            calls: Arc::default(),
        }
    }

    /// Probe whose target port never opens.
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            calls: Arc::default(),
        }
    }

    /// Calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ProbeCall> {
        lock(&self.calls).clone()
    }
}

impl ReachabilityProbe for FakeProbe {
    fn wait_until_open(
        &self,
        host: IpAddr,
        port: u16,
        poll_interval: Duration,
        limit: Duration,
    ) -> ProbeFuture<'_> {
        lock(&self.calls).push(ProbeCall {
            host,
            port,
            poll_interval,
            limit,
        });
        let reachable = self.reachable;
        Box::pin(async move {
            if reachable {
                return Ok(());
            }
            sleep(limit).await;
            Err(TransportError::Unreachable {
                host,
                port,
                waited_secs: limit.as_secs(),
            })
        })
    }
}
