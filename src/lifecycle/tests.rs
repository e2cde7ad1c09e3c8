//! Unit tests for the droplet lifecycle controller.
//!
//! Every async test runs on paused time so the production constants are
//! exercised at their real values.

use super::*;
use crate::test_support::{FakeCloud, FakeProbe};
use rstest::{fixture, rstest};
use std::net::{IpAddr, Ipv4Addr};

#[fixture]
fn request() -> ProvisioningRequest {
    ProvisioningRequest::builder()
        .name("web-1")
        .size("s-1vcpu-1gb")
        .image("ubuntu-24-04-x64")
        .region("ams3")
        .build()
        .expect("request should build")
}

fn controller(cloud: FakeCloud, probe: FakeProbe) -> DropletLifecycleController<FakeCloud, FakeProbe> {
    DropletLifecycleController::new(cloud, probe, "512190")
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn ready_after_first_completed_poll(request: ProvisioningRequest) {
    let cloud = FakeCloud::new();
    let probe = FakeProbe::reachable();
    let started = Instant::now();

    let droplet = controller(cloud.clone(), probe.clone())
        .bring_up(&request)
        .await
        .expect("droplet should become ready");

    assert_eq!(droplet.id, DropletId::new(100));
    assert_eq!(droplet.public_ip(), Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 101))));
    assert_eq!(cloud.action_polls(), 1);
    assert_eq!(started.elapsed(), EVENT_POLL_INTERVAL + SETTLE_DELAY);

    let calls = probe.calls();
    assert_eq!(calls.len(), 1);
    let call = calls[0];
    assert_eq!(call.host, IpAddr::V4(Ipv4Addr::new(203, 0, 113, 101)));
    assert_eq!(call.port, 22);
    assert_eq!(call.poll_interval, Duration::from_secs(1));
    assert_eq!(call.limit, Duration::from_secs(240));

    let created = cloud.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].ssh_keys, vec![String::from("512190")]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn times_out_once_polling_exceeds_budget(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().never_completing();
    let probe = FakeProbe::reachable();
    let started = Instant::now();

    let err = controller(cloud.clone(), probe.clone())
        .bring_up(&request)
        .await
        .expect_err("creation should time out");

    assert_eq!(
        err,
        LifecycleError::CreationTimeout {
            droplet: DropletId::new(100),
            waited_secs: 608,
        }
    );
    assert_eq!(err.failed_in(), LifecycleState::AwaitingEvent);
    assert_eq!(cloud.action_polls(), 76);
    assert_eq!(started.elapsed(), Duration::from_secs(608));
    assert!(probe.calls().is_empty());
}

#[rstest]
#[case::at_budget(74)]
#[case::past_budget(75)]
#[tokio::test(start_paused = true)]
async fn completion_observed_on_late_tick_is_not_a_timeout(
    request: ProvisioningRequest,
    #[case] in_progress_polls: u32,
) {
    let cloud = FakeCloud::new().completing_after(in_progress_polls);

    let result = controller(cloud.clone(), FakeProbe::reachable())
        .bring_up(&request)
        .await;

    assert!(result.is_ok(), "expected ready droplet, got {result:?}");
    assert_eq!(cloud.action_polls(), in_progress_polls + 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn create_failure_is_terminal(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().failing_create("web-1");

    let err = controller(cloud.clone(), FakeProbe::reachable())
        .bring_up(&request)
        .await
        .expect_err("create should fail");

    assert!(matches!(err, LifecycleError::Create { ref name, .. } if name == "web-1"));
    assert_eq!(err.failed_in(), LifecycleState::Creating);
    assert_eq!(err.droplet(), None);
    assert_eq!(cloud.created().len(), 1);
    assert_eq!(cloud.action_polls(), 0);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn poll_failure_is_terminal(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().failing_polls();

    let err = controller(cloud.clone(), FakeProbe::reachable())
        .bring_up(&request)
        .await
        .expect_err("poll should fail");

    assert!(matches!(err, LifecycleError::Poll { .. }));
    assert_eq!(err.droplet(), Some(DropletId::new(100)));
    assert_eq!(cloud.action_polls(), 1);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn errored_event_is_terminal(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().with_errored_actions();

    let err = controller(cloud, FakeProbe::reachable())
        .bring_up(&request)
        .await
        .expect_err("errored action should fail");

    assert_eq!(
        err,
        LifecycleError::EventErrored {
            droplet: DropletId::new(100),
            action: ActionId::new(1000),
        }
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn droplet_without_public_address_fails_before_probing(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().without_public_ips();
    let probe = FakeProbe::reachable();

    let err = controller(cloud, probe.clone())
        .bring_up(&request)
        .await
        .expect_err("missing address should fail");

    assert_eq!(
        err,
        LifecycleError::MissingPublicIp {
            droplet: DropletId::new(100)
        }
    );
    assert!(probe.calls().is_empty());
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn closed_port_fails_after_its_own_bound(request: ProvisioningRequest) {
    let started = Instant::now();

    let err = controller(FakeCloud::new(), FakeProbe::unreachable())
        .bring_up(&request)
        .await
        .expect_err("port should never open");

    assert!(matches!(
        err,
        LifecycleError::PortTimeout {
            source: TransportError::Unreachable { port: 22, .. },
            ..
        }
    ));
    assert_eq!(err.failed_in(), LifecycleState::PortWait);
    assert_eq!(started.elapsed(), EVENT_POLL_INTERVAL + PORT_WAIT_TIMEOUT);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_stops_event_polling(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().never_completing();
    let cancel = CancellationToken::new();
    let lifecycle = controller(cloud.clone(), FakeProbe::reachable()).with_cancellation(cancel.clone());

    let stopper = async {
        sleep(Duration::from_secs(20)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(lifecycle.bring_up(&request), stopper);

    let err = result.expect_err("cancelled lifecycle should fail");
    assert_eq!(
        err,
        LifecycleError::Cancelled {
            droplet: DropletId::new(100),
            state: LifecycleState::AwaitingEvent
        }
    );
    assert_eq!(err.droplet(), Some(DropletId::new(100)));
    assert_eq!(cloud.remaining(), vec![DropletId::new(100)]);
    assert_eq!(cloud.action_polls(), 2);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn cancellation_while_settling_reports_the_droplet(request: ProvisioningRequest) {
    let cloud = FakeCloud::new();
    let cancel = CancellationToken::new();
    let lifecycle = controller(cloud, FakeProbe::reachable()).with_cancellation(cancel.clone());

    let stopper = async {
        sleep(EVENT_POLL_INTERVAL + Duration::from_secs(5)).await;
        cancel.cancel();
    };
    let (result, ()) = tokio::join!(lifecycle.bring_up(&request), stopper);

    let err = result.expect_err("cancelled lifecycle should fail");
    assert_eq!(err.failed_in(), LifecycleState::Settling);
    assert_eq!(err.droplet(), Some(DropletId::new(100)));
    assert_eq!(
        err.to_string(),
        "lifecycle of droplet 100 cancelled while settling"
    );
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_action_link_falls_back_to_droplet_status(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().without_action_links().completing_after(2);
    let started = Instant::now();

    let droplet = controller(cloud.clone(), FakeProbe::reachable())
        .bring_up(&request)
        .await
        .expect("droplet should become ready once active");

    assert_eq!(droplet.id, DropletId::new(100));
    assert_eq!(droplet.status, "active");
    assert_eq!(cloud.action_polls(), 0);
    assert_eq!(started.elapsed(), EVENT_POLL_INTERVAL * 3 + SETTLE_DELAY);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn missing_action_link_still_times_out_with_the_droplet(request: ProvisioningRequest) {
    let cloud = FakeCloud::new().without_action_links().never_completing();

    let err = controller(cloud.clone(), FakeProbe::reachable())
        .bring_up(&request)
        .await
        .expect_err("droplet that never activates should time out");

    assert!(matches!(err, LifecycleError::CreationTimeout { .. }));
    assert_eq!(err.droplet(), Some(DropletId::new(100)));
    assert_eq!(cloud.remaining(), vec![DropletId::new(100)]);
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn custom_timings_are_honoured(request: ProvisioningRequest) {
    let timings = Timings {
        event_poll_interval: Duration::from_secs(1),
        creation_timeout: Duration::from_secs(3),
        ..Timings::default()
    };
    let cloud = FakeCloud::new().never_completing();

    let err = controller(cloud.clone(), FakeProbe::reachable())
        .with_timings(timings)
        .bring_up(&request)
        .await
        .expect_err("short budget should time out");

    assert!(matches!(err, LifecycleError::CreationTimeout { waited_secs: 4, .. }));
    assert_eq!(cloud.action_polls(), 4);
}

#[rstest]
#[case(LifecycleState::Requested, "requested")]
#[case(LifecycleState::AwaitingEvent, "awaiting-event")]
#[case(LifecycleState::PortWait, "port-wait")]
#[case(LifecycleState::Failed, "failed")]
fn states_render_as_kebab_case(#[case] state: LifecycleState, #[case] expected: &str) {
    assert_eq!(state.to_string(), expected);
}
