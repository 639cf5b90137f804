//! Shared fixtures and helpers for prune BDD scenarios.

use std::time::Duration;

use metadata_systest::FunctionsApiError;
use metadata_systest::prune::PruneSummary;
use metadata_systest::test_support::FakeFunctionsApi;
use rstest::fixture;

pub const FUNCTION_PARENT: &str = "projects/test-project/locations/-";

#[derive(Clone, Debug)]
pub enum SweepOutcome {
    Success(PruneSummary<FunctionsApiError>),
    Failure(String),
}

#[derive(Clone, Debug)]
pub struct PruneContext {
    pub api: FakeFunctionsApi,
    pub name_prefix: String,
    pub session_tag: String,
    pub stale_after: Duration,
    pub outcome: Option<SweepOutcome>,
}

#[fixture]
pub fn prune_context() -> PruneContext {
    PruneContext {
        api: FakeFunctionsApi::default(),
        name_prefix: String::new(),
        session_tag: String::new(),
        stale_after: Duration::from_secs(60 * 60),
        outcome: None,
    }
}

pub fn function_name(id: &str) -> String {
    format!("projects/test-project/locations/us-central1/functions/{id}")
}

pub fn function_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
