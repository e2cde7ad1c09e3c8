//! BDD scenarios for fleet reconciliation.

use rstest_bdd_macros::scenario;

use super::test_helpers::{FleetContext, ReconcileOutcome, fleet, outcome};

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Destroy droplets missing from the keep list"
)]
fn scenario_destroy_unlisted(fleet: FleetContext, outcome: ReconcileOutcome) {
    drop((fleet, outcome));
}

#[scenario(path = "tests/features/fleet.feature", name = "Keep the whole fleet")]
fn scenario_keep_all(fleet: FleetContext, outcome: ReconcileOutcome) {
    drop((fleet, outcome));
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Report a failed destroy while completing the others"
)]
fn scenario_failed_destroy(fleet: FleetContext, outcome: ReconcileOutcome) {
    drop((fleet, outcome));
}

#[scenario(
    path = "tests/features/fleet.feature",
    name = "Plan a reconciliation without destroying anything"
)]
fn scenario_plan(fleet: FleetContext, outcome: ReconcileOutcome) {
    drop((fleet, outcome));
}
