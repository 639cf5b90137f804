//! BDD step definitions for pruner behaviour.

use metadata_systest::prune::{PruneMode, PrunePolicy, Pruner};
use metadata_systest::{FunctionsApiError, RemoteResource};
use rstest_bdd_macros::{given, then, when};
use time::OffsetDateTime;
use tokio::runtime::Runtime;

use super::test_helpers::{
    FUNCTION_PARENT, PruneContext, SweepOutcome, function_id, function_name,
};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

#[given("a pruner for prefix \"{prefix}\" with a {minutes:u32} minute threshold")]
fn configured_pruner(mut prune_context: PruneContext, prefix: String, minutes: u32) -> PruneContext {
    prune_context.name_prefix = prefix.trim().to_owned();
    prune_context.stale_after = std::time::Duration::from_secs(u64::from(minutes) * 60);
    prune_context
}

#[given("the current session tag is \"{tag}\"")]
fn session_tag(mut prune_context: PruneContext, tag: String) -> PruneContext {
    prune_context.session_tag = tag.trim().to_owned();
    prune_context
}

#[given("a function \"{id}\" updated {minutes:u32} minutes ago")]
fn existing_function(prune_context: PruneContext, id: String, minutes: u32) -> PruneContext {
    let updated = OffsetDateTime::now_utc() - time::Duration::minutes(i64::from(minutes));
    prune_context.api.insert(RemoteResource::new(
        function_name(id.trim()),
        Some(updated),
    ));
    prune_context
}

#[given("deleting \"{id}\" fails")]
fn delete_fails(prune_context: PruneContext, id: String) -> PruneContext {
    prune_context.api.fail_delete(function_name(id.trim()));
    prune_context
}

#[given("listing functions fails")]
fn listing_fails(prune_context: PruneContext) -> PruneContext {
    prune_context.api.fail_list(FunctionsApiError::Status {
        operation: String::from("list"),
        status: 503,
        body: String::from("backend unavailable"),
    });
    prune_context
}

fn run_sweep(mut prune_context: PruneContext, mode: PruneMode) -> Result<PruneContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))?;
    let policy = PrunePolicy::new(
        prune_context.session_tag.clone(),
        prune_context.name_prefix.clone(),
        prune_context.stale_after,
    );
    let pruner = Pruner::new(prune_context.api.clone(), FUNCTION_PARENT, policy);
    let result = runtime.block_on(async move { pruner.prune(mode).await });
    prune_context.outcome = Some(match result {
        Ok(summary) => SweepOutcome::Success(summary),
        Err(err) => SweepOutcome::Failure(err.to_string()),
    });
    Ok(prune_context)
}

#[when("I prune stale functions")]
fn prune_stale(prune_context: PruneContext) -> Result<PruneContext, StepError> {
    run_sweep(prune_context, PruneMode::Stale)
}

#[when("I prune the current session")]
fn prune_session(prune_context: PruneContext) -> Result<PruneContext, StepError> {
    run_sweep(prune_context, PruneMode::Session)
}

#[then("the sweep reports {deleted:u32} deleted and {failed:u32} failed")]
fn reports_counts(
    prune_context: &PruneContext,
    deleted: u32,
    failed: u32,
) -> Result<(), StepError> {
    let Some(outcome) = prune_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from("missing outcome")));
    };
    let SweepOutcome::Success(summary) = outcome else {
        return Err(StepError::Assertion(format!(
            "expected success, got: {outcome:?}"
        )));
    };
    if summary.deleted() == deleted as usize && summary.failed() == failed as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {deleted} deleted and {failed} failed, got {summary:?}"
        )))
    }
}

#[then("the remaining functions are \"{ids}\"")]
fn remaining_functions(prune_context: &PruneContext, ids: String) -> Result<(), StepError> {
    let expected: Vec<&str> = ids.split(',').map(str::trim).collect();
    let remaining = prune_context.api.remaining();
    let actual: Vec<&str> = remaining.iter().map(|name| function_id(name)).collect();
    if actual == expected {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected remaining {expected:?}, got {actual:?}"
        )))
    }
}

#[then("no delete requests are issued")]
fn no_deletes(prune_context: &PruneContext) -> Result<(), StepError> {
    let calls = prune_context.api.delete_calls();
    if calls.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no delete requests, got {calls:?}"
        )))
    }
}

#[then("the sweep fails with a listing error")]
fn fails_with_listing_error(prune_context: &PruneContext) -> Result<(), StepError> {
    let Some(SweepOutcome::Failure(message)) = prune_context.outcome.as_ref() else {
        return Err(StepError::Assertion(String::from(
            "expected sweep to fail",
        )));
    };
    if message.contains("failed to list functions") {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected listing error, got: {message}"
        )))
    }
}
