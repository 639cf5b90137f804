//! Stale-resource pruning for functions created by the suite.
//!
//! Every function the suite deploys is named `{prefix}-{suffix}`. At setup
//! the pruner removes prefixed functions older than a threshold, which were
//! leaked by earlier runs that crashed before teardown. At teardown it
//! removes the functions of the current session only. Deletion is
//! best-effort: each selected function gets one delete request, the
//! requests run concurrently, and a failed delete is logged and recorded
//! without failing the sweep.

use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;

use crate::functions::FunctionsApi;
use crate::resource::RemoteResource;
use crate::settle::settle_all;

/// Which resources a sweep targets.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PruneMode {
    /// Resources of the current session, regardless of age.
    Session,
    /// Prefixed resources from any session whose age exceeds the threshold.
    Stale,
}

/// Selection criteria for a sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PrunePolicy {
    /// Tag identifying the current session (usually the session's full
    /// prefix).
    pub session_tag: String,
    /// Prefix shared by every session.
    pub name_prefix: String,
    /// Age beyond which a prefixed resource counts as stale.
    pub stale_after: Duration,
}

impl PrunePolicy {
    /// Creates a policy.
    #[must_use]
    pub fn new(
        session_tag: impl Into<String>,
        name_prefix: impl Into<String>,
        stale_after: Duration,
    ) -> Self {
        Self {
            session_tag: session_tag.into(),
            name_prefix: name_prefix.into(),
            stale_after,
        }
    }

    /// Returns `true` when `resource` should be deleted in `mode`.
    ///
    /// Names without the shared prefix are never selected. Both the prefix
    /// and the session tag are substring matches against the full resource
    /// name, `projects/{project}/locations/{region}/functions/{id}`, not just
    /// the function id, so a project or region containing the prefix makes
    /// every function in it a candidate. In [`PruneMode::Stale`] the age must
    /// be strictly greater than the threshold; a resource without an update
    /// time has age zero.
    #[must_use]
    pub fn selects(&self, resource: &RemoteResource, mode: PruneMode, now: OffsetDateTime) -> bool {
        if !resource.name_contains(&self.name_prefix) {
            return false;
        }
        match mode {
            PruneMode::Session => resource.name_contains(&self.session_tag),
            PruneMode::Stale => resource.age_seconds(now) > self.stale_after.as_secs(),
        }
    }

    /// Filters `resources` down to the ones [`PrunePolicy::selects`] picks,
    /// preserving order.
    #[must_use]
    pub fn select<'a>(
        &self,
        resources: &'a [RemoteResource],
        mode: PruneMode,
        now: OffsetDateTime,
    ) -> Vec<&'a RemoteResource> {
        resources
            .iter()
            .filter(|resource| self.selects(resource, mode, now))
            .collect()
    }
}

/// Result of the single delete attempt made for one resource.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeletionOutcome<E> {
    /// Name of the resource the request targeted.
    pub name: String,
    /// Outcome of the request.
    pub result: Result<(), E>,
}

impl<E> DeletionOutcome<E> {
    /// Returns `true` when the delete request succeeded.
    #[must_use]
    pub const fn is_deleted(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a sweep.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PruneSummary<E> {
    /// Mode the sweep ran in.
    pub mode: PruneMode,
    /// Number of resources returned by the listing.
    pub listed: usize,
    /// One entry per selected resource.
    pub outcomes: Vec<DeletionOutcome<E>>,
}

impl<E> PruneSummary<E> {
    /// Number of successful delete requests.
    #[must_use]
    pub fn deleted(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.is_deleted()).count()
    }

    /// Number of failed delete requests.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.deleted()
    }
}

/// Errors that abort a sweep.
#[derive(Debug, Error)]
pub enum PruneError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when the listing fails; nothing is deleted without a complete
    /// listing.
    #[error("failed to list functions under {parent}: {source}")]
    List {
        /// Listing parent.
        parent: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
}

/// Deletes functions selected by a [`PrunePolicy`].
#[derive(Clone, Debug)]
pub struct Pruner<A> {
    api: A,
    parent: String,
    policy: PrunePolicy,
}

impl<A: FunctionsApi> Pruner<A> {
    /// Creates a pruner that lists functions under `parent`
    /// (`projects/{project}/locations/-`).
    #[must_use]
    pub fn new(api: A, parent: impl Into<String>, policy: PrunePolicy) -> Self {
        Self {
            api,
            parent: parent.into(),
            policy,
        }
    }

    /// Selection policy of this pruner.
    #[must_use]
    pub const fn policy(&self) -> &PrunePolicy {
        &self.policy
    }

    /// Underlying API handle.
    #[must_use]
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Lists the namespace and prunes it in `mode` as of the current time.
    ///
    /// # Errors
    ///
    /// Returns [`PruneError::List`] when the listing fails. Delete failures
    /// are reported in the summary instead.
    pub async fn prune(&self, mode: PruneMode) -> Result<PruneSummary<A::Error>, PruneError<A::Error>> {
        tracing::info!(?mode, parent = %self.parent, "pruning leaked functions");
        let resources = self
            .api
            .list_functions(&self.parent)
            .await
            .map_err(|source| PruneError::List {
                parent: self.parent.clone(),
                source,
            })?;
        let outcomes = self
            .prune_listed(&resources, mode, OffsetDateTime::now_utc())
            .await;
        let summary = PruneSummary {
            mode,
            listed: resources.len(),
            outcomes,
        };
        tracing::info!(
            ?mode,
            listed = summary.listed,
            deleted = summary.deleted(),
            failed = summary.failed(),
            "prune complete"
        );
        Ok(summary)
    }

    /// Selects from an existing listing and issues one concurrent delete
    /// per selected resource, waiting for all of them to settle.
    pub async fn prune_listed(
        &self,
        resources: &[RemoteResource],
        mode: PruneMode,
        now: OffsetDateTime,
    ) -> Vec<DeletionOutcome<A::Error>> {
        let selected = self.policy.select(resources, mode, now);
        if selected.is_empty() {
            return Vec::new();
        }

        let results = settle_all(
            selected
                .iter()
                .map(|resource| self.api.delete_function(&resource.name)),
        )
        .await;

        selected
            .into_iter()
            .zip(results)
            .map(|(resource, result)| {
                let age_minutes = resource.age_minutes(now);
                if let Err(err) = &result {
                    tracing::warn!(
                        function = %resource.name,
                        age_minutes,
                        error = %err,
                        "failed to delete function"
                    );
                } else {
                    tracing::debug!(function = %resource.name, age_minutes, "deleted function");
                }
                DeletionOutcome {
                    name: resource.name.clone(),
                    result,
                }
            })
            .collect()
    }
}
