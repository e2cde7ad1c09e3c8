//! Unit tests for droplet configuration ordering and failure handling.

use super::*;
use crate::request::FolderSync;
use crate::test_support::{
    ScriptedRunner, droplet, failure_output, success_output, transport_config,
};
use crate::transport::SshTransport;
use rstest::{fixture, rstest};
use tempfile::TempDir;

/// Temporary workspace with three local folders and two scripts.
struct Workspace {
    root: TempDir,
}

impl Workspace {
    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(self.root.path().join(name))
            .unwrap_or_else(|path| panic!("non UTF-8 temp path: {}", path.display()))
    }

    fn scripts_dir(&self) -> Utf8PathBuf {
        self.path("scripts")
    }
}

#[fixture]
fn workspace() -> Workspace {
    let root = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    for folder in ["a", "b", "c", "scripts"] {
        std::fs::create_dir(root.path().join(folder)).expect("create folder");
    }
    for script in ["first.sh", "second.sh"] {
        std::fs::write(root.path().join("scripts").join(script), "#!/bin/sh\n")
            .expect("write script");
    }
    Workspace { root }
}

fn configurator(runner: ScriptedRunner, workspace: &Workspace) -> InstanceConfigurator<ScriptedRunner> {
    let transport = SshTransport::new(transport_config(), runner)
        .unwrap_or_else(|err| panic!("transport config should validate: {err}"));
    InstanceConfigurator::new(RemoteExecutor::new(transport), workspace.scripts_dir())
}

fn request(workspace: &Workspace, folders: &[&str]) -> ProvisioningRequest {
    ProvisioningRequest::builder()
        .name("web-1")
        .size("s-1vcpu-1gb")
        .image("ubuntu-24-04-x64")
        .region("ams3")
        .folders(folders.iter().map(|name| {
            FolderSync::new(workspace.path(name).as_str(), &format!("/srv/{name}"))
                .expect("valid sync")
        }))
        .scripts([
            ScriptRef::parse("first.sh").expect("first"),
            ScriptRef::parse("second.sh").expect("second"),
        ])
        .build()
        .expect("request should build")
}

fn programs(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .invocations()
        .into_iter()
        .map(|call| call.program)
        .collect()
}

#[rstest]
#[tokio::test]
async fn folders_sync_before_scripts_in_order(workspace: Workspace) {
    let runner = ScriptedRunner::always_succeeding();
    let subject = configurator(runner.clone(), &workspace);

    let outputs = subject
        .configure(&droplet(7, "web-1"), &request(&workspace, &["a", "b"]))
        .await
        .expect("configuration should succeed");

    assert_eq!(
        programs(&runner),
        ["rsync", "rsync", "scp", "ssh", "scp", "ssh"]
    );
    let stages: Vec<Stage> = outputs.iter().map(|step| step.stage).collect();
    assert_eq!(
        stages,
        [
            Stage::Folder { index: 0 },
            Stage::Folder { index: 1 },
            Stage::Script { index: 0 },
            Stage::Script { index: 1 },
        ]
    );
}

#[rstest]
#[tokio::test]
async fn second_folder_failure_skips_remaining_steps(workspace: Workspace) {
    let runner = ScriptedRunner::responding(|call| {
        if call.command_string().ends_with(":/srv/b/") {
            failure_output(23)
        } else {
            success_output()
        }
    });
    let subject = configurator(runner.clone(), &workspace);

    let err = subject
        .configure(&droplet(7, "web-1"), &request(&workspace, &["a", "b", "c"]))
        .await
        .expect_err("second folder should fail");

    assert_eq!(err.stage(), Some(Stage::Folder { index: 1 }));
    assert!(matches!(
        err,
        ConfigureError::Step {
            source: RemoteError::SyncFailed { exit_code: Some(23), .. },
            ..
        }
    ));
    assert_eq!(programs(&runner), ["rsync", "rsync"]);
    assert!(
        !runner
            .invocations()
            .iter()
            .any(|call| call.command_string().contains("/srv/c")),
        "third folder must not sync"
    );
}

#[rstest]
#[tokio::test]
async fn script_failure_reports_its_index(workspace: Workspace) {
    let runner = ScriptedRunner::new();
    for _ in 0..3 {
        runner.push_success();
    }
    runner.push_failure(2);
    let subject = configurator(runner.clone(), &workspace);

    let err = subject
        .configure(&droplet(7, "web-1"), &request(&workspace, &[]))
        .await
        .expect_err("second script should fail");

    assert_eq!(err.stage(), Some(Stage::Script { index: 1 }));
    assert_eq!(programs(&runner), ["scp", "ssh", "scp", "ssh"]);
}

#[rstest]
#[tokio::test]
async fn bare_script_names_resolve_in_scripts_dir(workspace: Workspace) {
    let runner = ScriptedRunner::always_succeeding();
    let subject = configurator(runner.clone(), &workspace);
    let host = IpAddr::from([203, 0, 113, 9]);

    subject
        .run_scripts(host, &[ScriptRef::parse("first.sh").expect("script")])
        .await
        .expect("script should deploy");

    let copies = runner.invocations_of("scp");
    let expected = workspace.scripts_dir().join("first.sh");
    assert!(
        copies[0]
            .args
            .iter()
            .any(|arg| arg.to_string_lossy() == expected.as_str()),
        "scp should copy {expected}"
    );
}

#[rstest]
#[tokio::test]
async fn droplet_without_address_is_rejected(workspace: Workspace) {
    let runner = ScriptedRunner::always_succeeding();
    let subject = configurator(runner.clone(), &workspace);
    let mut target = droplet(7, "web-1");
    target.public_ipv4 = None;

    let err = subject
        .configure(&target, &request(&workspace, &["a"]))
        .await
        .expect_err("missing address should fail");

    assert_eq!(
        err,
        ConfigureError::NoAddress {
            droplet: DropletId::new(7)
        }
    );
    assert!(runner.invocations().is_empty());
}

#[rstest]
fn stages_render_one_based() {
    assert_eq!(Stage::Folder { index: 1 }.to_string(), "folder sync #2");
    assert_eq!(Stage::Script { index: 0 }.to_string(), "script #1");
}
