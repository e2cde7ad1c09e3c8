//! Binary entry point for the Dropship CLI.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use dropship::{
    ConfigError, DigitalOceanApi, Droplet, DropletId, DropletLifecycleController, FleetAllowList,
    FleetReconciler, FolderSync, InstanceConfigurator, LogSession, ProcessCommandRunner,
    ProviderConfig, ProvisioningOrchestrator, ProvisioningRequest, RemoteExecutor, ScriptCatalog,
    ScriptRef, SshTransport, StepOutput, TcpProbe, TransportConfig,
};

mod cli;

use cli::{Cli, DestroyCommand, ProvisionCommand, ReconcileCommand, RunCommand};

type Orchestrator = ProvisioningOrchestrator<DigitalOceanApi, TcpProbe, ProcessCommandRunner>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("provisioning failed: {0}")]
    Provision(String),
    #[error("fleet operation failed: {0}")]
    Fleet(String),
    #[error("script listing failed: {0}")]
    Scripts(String),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let provider = ProviderConfig::load_without_cli_args()?;
    let session = LogSession::open(provider.logging);
    let result = execute(cli, &provider).await;
    if let Err(err) = &result {
        tracing::error!(error = %err, "command failed");
    }
    session.close();
    result
}

async fn execute(cli: Cli, provider: &ProviderConfig) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    match cli {
        Cli::List => {
            let droplets = reconciler(provider)?
                .list()
                .await
                .map_err(|err| CliError::Fleet(err.to_string()))?;
            write_droplets(&mut stdout, &droplets)?;
            Ok(())
        }
        Cli::Destroy(args) => exec_destroy(&mut stdout, provider, &args).await,
        Cli::Provision(args) => exec_provision(&mut stdout, provider, &args).await,
        Cli::Run(args) => exec_run(&mut stdout, provider, &args).await,
        Cli::Reconcile(args) => exec_reconcile(&mut stdout, provider, &args).await,
        Cli::Scripts => {
            let names = ScriptCatalog::new(provider.scripts_path())
                .list()
                .map_err(|err| CliError::Scripts(err.to_string()))?;
            for name in names {
                writeln!(stdout, "{name}")?;
            }
            Ok(())
        }
    }
}

async fn exec_destroy(
    mut out: impl Write,
    provider: &ProviderConfig,
    args: &DestroyCommand,
) -> Result<(), CliError> {
    let id = DropletId::new(args.id);
    reconciler(provider)?
        .destroy(id)
        .await
        .map_err(|err| CliError::Fleet(err.to_string()))?;
    writeln!(out, "destroyed {id}")?;
    Ok(())
}

async fn exec_provision(
    mut out: impl Write,
    provider: &ProviderConfig,
    args: &ProvisionCommand,
) -> Result<(), CliError> {
    let requests = build_requests(args)?;
    let cancel = cancel_on_interrupt();
    let orchestrator = orchestrator(provider, &cancel)?;

    let outcomes = orchestrator.provision_all(&requests).await;
    let mut first_error = None;
    for outcome in outcomes {
        match outcome {
            Ok(provisioned) => {
                write_droplets(&mut out, std::slice::from_ref(&provisioned.droplet))?;
                write_steps(&mut out, &provisioned.droplet.name, &provisioned.steps)?;
            }
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        None => Ok(()),
        Some(err) => Err(CliError::Provision(err.to_string())),
    }
}

async fn exec_run(
    mut out: impl Write,
    provider: &ProviderConfig,
    args: &RunCommand,
) -> Result<(), CliError> {
    let scripts = parse_scripts(&args.scripts)?;
    let ids: Vec<DropletId> = args.droplets.iter().copied().map(DropletId::new).collect();
    let cancel = cancel_on_interrupt();
    let orchestrator = orchestrator(provider, &cancel)?;

    let outcomes = orchestrator.run_against_many(&ids, &scripts).await;
    let mut first_error = None;
    for (id, outcome) in ids.iter().zip(outcomes) {
        match outcome {
            Ok(steps) => write_steps(&mut out, &id.to_string(), &steps)?,
            Err(err) => {
                first_error.get_or_insert(err);
            }
        }
    }

    match first_error {
        None => Ok(()),
        Some(err) => Err(CliError::Provision(err.to_string())),
    }
}

async fn exec_reconcile(
    mut out: impl Write,
    provider: &ProviderConfig,
    args: &ReconcileCommand,
) -> Result<(), CliError> {
    let keep = FleetAllowList::parse(&args.keep)
        .map_err(|err| CliError::InvalidArgument(err.to_string()))?;
    let reconciler = reconciler(provider)?;

    if args.dry_run {
        let planned = reconciler
            .plan(&keep)
            .await
            .map_err(|err| CliError::Fleet(err.to_string()))?;
        for id in planned {
            writeln!(out, "would destroy {id}")?;
        }
        return Ok(());
    }

    let destroyed = reconciler
        .destroy_except(&keep)
        .await
        .map_err(|err| CliError::Fleet(err.to_string()))?;
    for id in destroyed {
        writeln!(out, "destroyed {id}")?;
    }
    Ok(())
}

fn reconciler(provider: &ProviderConfig) -> Result<FleetReconciler<DigitalOceanApi>, CliError> {
    let cloud = DigitalOceanApi::new(provider)?;
    Ok(FleetReconciler::new(cloud).with_concurrency(provider.concurrency))
}

fn orchestrator(
    provider: &ProviderConfig,
    cancel: &CancellationToken,
) -> Result<Orchestrator, CliError> {
    let cloud = DigitalOceanApi::new(provider)?;
    let transport_config = TransportConfig::load_without_cli_args()?;
    let transport = SshTransport::with_process_runner(transport_config)?;
    let remote = RemoteExecutor::with_process_runner(transport).with_cancellation(cancel.clone());
    let configurator = InstanceConfigurator::new(remote, provider.scripts_path());
    let lifecycle =
        DropletLifecycleController::new(cloud, TcpProbe::new(), provider.ssh_key_id.trim())
            .with_cancellation(cancel.clone());

    Ok(ProvisioningOrchestrator::new(lifecycle, configurator)
        .with_concurrency(provider.concurrency))
}

fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    token
}

fn build_requests(args: &ProvisionCommand) -> Result<Vec<ProvisioningRequest>, CliError> {
    if args.count == 0 {
        return Err(CliError::InvalidArgument(String::from(
            "--count must be at least 1",
        )));
    }

    let folders = args
        .syncs
        .iter()
        .map(|value| FolderSync::parse(value))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CliError::InvalidArgument(err.to_string()))?;
    let scripts = parse_scripts(&args.scripts)?;
    let base = args.name.clone().unwrap_or_else(default_name);

    droplet_names(&base, args.count)
        .into_iter()
        .map(|name| {
            ProvisioningRequest::builder()
                .name(name)
                .size(&args.size)
                .image(&args.image)
                .region(&args.region)
                .private_networking(args.private_networking)
                .folders(folders.iter().cloned())
                .scripts(scripts.iter().cloned())
                .build()
                .map_err(|err| CliError::InvalidArgument(err.to_string()))
        })
        .collect()
}

fn droplet_names(base: &str, count: usize) -> Vec<String> {
    if count == 1 {
        return vec![base.to_owned()];
    }
    (1..=count).map(|index| format!("{base}-{index}")).collect()
}

fn default_name() -> String {
    format!("dropship-{}", Uuid::new_v4().simple())
}

fn parse_scripts(values: &[String]) -> Result<Vec<ScriptRef>, CliError> {
    values
        .iter()
        .map(|value| ScriptRef::parse(value))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| CliError::InvalidArgument(err.to_string()))
}

fn write_droplets(mut target: impl Write, droplets: &[Droplet]) -> io::Result<()> {
    writeln!(
        target,
        "{:<12} {:<32} {:<16} {:<10} REGION",
        "ID", "NAME", "PUBLIC IP", "STATUS"
    )?;
    for droplet in droplets {
        let address = droplet
            .public_ipv4
            .map_or_else(|| String::from("-"), |ip| ip.to_string());
        writeln!(
            target,
            "{:<12} {:<32} {:<16} {:<10} {}",
            droplet.id.get(),
            droplet.name,
            address,
            droplet.status,
            droplet.region
        )?;
    }
    Ok(())
}

fn write_steps(mut target: impl Write, label: &str, steps: &[StepOutput]) -> io::Result<()> {
    for step in steps {
        writeln!(
            target,
            "[{label}] {} (exit {})",
            step.stage,
            step.output.status_text()
        )?;
        for line in step.output.stdout.lines() {
            writeln!(target, "  {line}")?;
        }
    }
    Ok(())
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
