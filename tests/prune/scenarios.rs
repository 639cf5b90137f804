//! BDD scenarios for the pruner.

use rstest_bdd_macros::scenario;

use super::test_helpers::{PruneContext, prune_context};

#[scenario(
    path = "tests/features/prune.feature",
    name = "Stale sweep removes only old prefixed functions"
)]
fn scenario_stale_sweep(prune_context: PruneContext) {
    let _ = prune_context;
}

#[scenario(
    path = "tests/features/prune.feature",
    name = "Session sweep removes the session's functions regardless of age"
)]
fn scenario_session_sweep(prune_context: PruneContext) {
    let _ = prune_context;
}

#[scenario(
    path = "tests/features/prune.feature",
    name = "Sweeping an empty namespace issues no deletes"
)]
fn scenario_empty_namespace(prune_context: PruneContext) {
    let _ = prune_context;
}

#[scenario(
    path = "tests/features/prune.feature",
    name = "A failed delete does not stop the sweep"
)]
fn scenario_failed_delete(prune_context: PruneContext) {
    let _ = prune_context;
}

#[scenario(
    path = "tests/features/prune.feature",
    name = "A listing failure aborts the sweep"
)]
fn scenario_listing_failure(prune_context: PruneContext) {
    let _ = prune_context;
}
