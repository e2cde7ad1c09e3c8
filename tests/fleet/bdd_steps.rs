//! BDD step definitions for fleet reconciliation.

use dropship::{DropletId, FleetAllowList, FleetError, FleetReconciler};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FleetContext, ReconcileOutcome, droplet_ids, parse_ids};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("runtime setup failed: {0}")]
    Runtime(String),
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn sorted(mut ids: Vec<DropletId>) -> Vec<DropletId> {
    ids.sort_unstable();
    ids
}

fn keep_list(ids: &str) -> FleetAllowList {
    droplet_ids(ids).into_iter().collect()
}

#[given("a fleet of droplets \"{ids}\"")]
fn fleet_of_droplets(ids: String) -> FleetContext {
    FleetContext {
        cloud: dropship::test_support::FakeCloud::with_droplets(&parse_ids(&ids)),
    }
}

#[given("destroying droplet \"{id}\" fails")]
fn destroying_droplet_fails(fleet: &FleetContext, id: u64) -> FleetContext {
    FleetContext {
        cloud: fleet.cloud.clone().failing_destroy(id),
    }
}

#[when("I reconcile keeping \"{ids}\"")]
fn reconcile_keeping(fleet: &FleetContext, ids: String) -> Result<ReconcileOutcome, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))?;
    let reconciler = FleetReconciler::new(fleet.cloud.clone());
    let keep = keep_list(&ids);
    let result = runtime.block_on(async move { reconciler.destroy_except(&keep).await });
    Ok(ReconcileOutcome {
        result: Some(result),
    })
}

#[when("I plan a reconciliation keeping \"{ids}\"")]
fn plan_keeping(fleet: &FleetContext, ids: String) -> Result<ReconcileOutcome, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Runtime(err.to_string()))?;
    let reconciler = FleetReconciler::new(fleet.cloud.clone());
    let keep = keep_list(&ids);
    let result = runtime.block_on(async move { reconciler.plan(&keep).await });
    Ok(ReconcileOutcome {
        result: Some(result),
    })
}

#[then("the reconciliation reports droplets \"{ids}\"")]
fn reconciliation_reports(outcome: &ReconcileOutcome, ids: String) -> Result<(), StepError> {
    match outcome.result {
        Some(Ok(ref reported)) if *reported == droplet_ids(&ids) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected droplets {ids}, got {other:?}"
        ))),
    }
}

#[then("the reconciliation fails for droplet \"{id}\"")]
fn reconciliation_fails_for(outcome: &ReconcileOutcome, id: u64) -> Result<(), StepError> {
    match outcome.result {
        Some(Err(FleetError::Destroy { droplet, .. })) if droplet == DropletId::new(id) => Ok(()),
        ref other => Err(StepError::Assertion(format!(
            "expected destroy failure for {id}, got {other:?}"
        ))),
    }
}

#[then("droplets \"{ids}\" are destroyed")]
fn droplets_destroyed(fleet: &FleetContext, ids: String) -> Result<(), StepError> {
    let destroyed = sorted(fleet.cloud.destroyed());
    let expected = sorted(droplet_ids(&ids));
    if destroyed == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?} destroyed, got {destroyed:?}"
        )))
    }
}

#[then("droplets \"{ids}\" remain")]
fn droplets_remain(fleet: &FleetContext, ids: String) -> Result<(), StepError> {
    let remaining = sorted(fleet.cloud.remaining());
    let expected = sorted(droplet_ids(&ids));
    if remaining == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {expected:?} to remain, got {remaining:?}"
        )))
    }
}

#[then("no droplets are destroyed")]
fn no_droplets_destroyed(fleet: &FleetContext) -> Result<(), StepError> {
    let destroyed = fleet.cloud.destroyed();
    if destroyed.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no destroys, got {destroyed:?}"
        )))
    }
}
