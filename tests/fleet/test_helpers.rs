//! Shared fixtures for fleet reconciliation scenarios.

use dropship::test_support::FakeCloud;
use dropship::{DropletId, FleetError};
use rstest::fixture;

#[derive(Clone, Debug)]
pub struct FleetContext {
    pub cloud: FakeCloud,
}

#[derive(Clone, Debug, Default)]
pub struct ReconcileOutcome {
    pub result: Option<Result<Vec<DropletId>, FleetError>>,
}

#[fixture]
pub fn fleet() -> FleetContext {
    FleetContext {
        cloud: FakeCloud::new(),
    }
}

#[fixture]
pub fn outcome() -> ReconcileOutcome {
    ReconcileOutcome::default()
}

/// Parses a comma separated list such as `1,3`.
pub fn parse_ids(value: &str) -> Vec<u64> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.parse()
                .unwrap_or_else(|err| panic!("invalid droplet id `{item}` in step: {err}"))
        })
        .collect()
}

pub fn droplet_ids(value: &str) -> Vec<DropletId> {
    parse_ids(value).into_iter().map(DropletId::new).collect()
}
