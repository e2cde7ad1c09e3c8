//! Command-line interface definitions for the `dropship` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page. It
//! depends on clap alone; values are converted to domain types in `main`.

use clap::Parser;

/// Top-level CLI for the `dropship` binary.
#[derive(Debug, Parser)]
#[command(
    name = "dropship",
    version,
    about = "Provision, configure and reconcile DigitalOcean droplets",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// List every droplet on the account.
    #[command(name = "list", about = "List every droplet on the account")]
    List,
    /// Destroy a single droplet.
    #[command(name = "destroy", about = "Destroy a single droplet by identifier")]
    Destroy(DestroyCommand),
    /// Create droplets, wait for SSH, sync folders and run scripts.
    #[command(
        name = "provision",
        about = "Create a droplet, wait for SSH, sync folders and run scripts"
    )]
    Provision(ProvisionCommand),
    /// Run scripts against existing droplets.
    #[command(name = "run", about = "Run scripts against existing droplets")]
    Run(RunCommand),
    /// Destroy every droplet not on the keep list.
    #[command(name = "reconcile", about = "Destroy every droplet not on the keep list")]
    Reconcile(ReconcileCommand),
    /// List the scripts available in the scripts directory.
    #[command(name = "scripts", about = "List the scripts in the scripts directory")]
    Scripts,
}

/// Arguments for `dropship destroy`.
#[derive(Debug, Parser)]
pub(crate) struct DestroyCommand {
    /// Droplet identifier.
    #[arg(value_name = "ID")]
    pub(crate) id: u64,
}

/// Arguments for `dropship provision`.
#[derive(Debug, Parser)]
pub(crate) struct ProvisionCommand {
    /// Droplet name. Defaults to `dropship-<random>`. With `--count`
    /// above one, droplets are named `<NAME>-1` to `<NAME>-<N>`.
    #[arg(long, value_name = "NAME")]
    pub(crate) name: Option<String>,
    /// Number of identical droplets to provision concurrently.
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub(crate) count: usize,
    /// Size slug (for example `s-1vcpu-1gb`).
    #[arg(long, value_name = "SLUG")]
    pub(crate) size: String,
    /// Image slug or numeric image identifier.
    #[arg(long, value_name = "IMAGE")]
    pub(crate) image: String,
    /// Region slug (for example `ams3`).
    #[arg(long, value_name = "SLUG")]
    pub(crate) region: String,
    /// Attach the droplet to the private network.
    #[arg(long)]
    pub(crate) private_networking: bool,
    /// Local folder to mirror, as `SOURCE:DESTINATION`. Repeatable; folders
    /// sync in the order given, before any script.
    #[arg(long = "sync", value_name = "SOURCE:DESTINATION")]
    pub(crate) syncs: Vec<String>,
    /// Script to run after the folder syncs. Bare names resolve against the
    /// scripts directory. Repeatable; scripts run in the order given.
    #[arg(long = "script", value_name = "SCRIPT")]
    pub(crate) scripts: Vec<String>,
}

/// Arguments for `dropship run`.
#[derive(Debug, Parser)]
pub(crate) struct RunCommand {
    /// Target droplet identifier. Repeatable.
    #[arg(long = "droplet", value_name = "ID", required = true)]
    pub(crate) droplets: Vec<u64>,
    /// Script to run on every target, in the order given. Repeatable.
    #[arg(long = "script", value_name = "SCRIPT", required = true)]
    pub(crate) scripts: Vec<String>,
}

/// Arguments for `dropship reconcile`.
#[derive(Debug, Parser)]
pub(crate) struct ReconcileCommand {
    /// Droplet identifier to keep. Repeatable; at least one is required.
    #[arg(long = "keep", value_name = "ID", required = true)]
    pub(crate) keep: Vec<String>,
    /// Print the droplets that would be destroyed without destroying them.
    #[arg(long)]
    pub(crate) dry_run: bool,
}
