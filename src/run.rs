//! Orchestrates the system test suites.
//!
//! The functions suite packs the module, prunes stale functions left by
//! earlier runs, deploys the HTTP fixture, opens it to public invocation,
//! checks the response, and removes this session's function again. The
//! build suite submits the Cloud Build fixture and checks its log. Teardown
//! runs whenever deployment was attempted, including after failures.
//!
//! `npm` and `gcloud` block until they exit, so they run on Tokio's blocking
//! pool rather than on the runtime's worker threads.

use std::fmt::Display;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::command::{CommandError, CommandRunner};
use crate::config::HarnessConfig;
use crate::deploy::{DeployError, DeploySpec, GcloudDeployer};
use crate::functions::FunctionsApi;
use crate::package::{PackageError, PackedModule, Packager};
use crate::prune::{PruneError, PruneMode, PrunePolicy, PruneSummary, Pruner};
use crate::resource::{FunctionName, IamPolicy};
use crate::session::Session;
use crate::verify::{VerifyError, Verifier, check_build_log};

/// Steps of a suite, recorded in the order they complete.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Stage {
    /// Nothing has run yet.
    Init,
    /// The module tarball is staged in the fixtures.
    Packaged,
    /// Stale functions from earlier sessions were pruned.
    PrunedPrior,
    /// The HTTP fixture is deployed.
    Deployed,
    /// The function accepts unauthenticated invocations.
    Authorized,
    /// The Cloud Build fixture finished.
    Built,
    /// The deployed code reported a detected metadata service.
    Verified,
    /// This session's functions were pruned.
    PrunedSelf,
    /// Every step succeeded.
    Done,
    /// A step failed; see the suite's error.
    Failed,
}

/// Errors surfaced while running a suite.
#[derive(Debug, Error)]
pub enum SuiteError<E>
where
    E: std::error::Error + 'static,
{
    /// Raised when packing or staging the module fails.
    #[error("packaging failed: {0}")]
    Package(#[source] PackageError),
    /// Raised when listing functions for the prior prune fails.
    #[error("pruning stale functions failed: {0}")]
    PruneList(#[source] PruneError<E>),
    /// Raised when the function cannot be deployed.
    #[error("deployment failed: {message}")]
    Deploy {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying deployment error.
        #[source]
        source: DeployError,
    },
    /// Raised when the invoker binding cannot be applied.
    #[error("authorizing public invocation failed: {message}")]
    Authorize {
        /// Human-readable description of the failure.
        message: String,
        /// Provider-specific error.
        #[source]
        source: E,
    },
    /// Raised when the deployed code does not report the metadata service.
    #[error("verification failed: {message}")]
    Verify {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying verification error.
        #[source]
        source: VerifyError,
    },
    /// Raised when the Cloud Build submission fails.
    #[error("cloud build failed: {0}")]
    Build(#[source] DeployError),
    /// Raised when removing this session's functions fails after the
    /// primary steps succeeded.
    #[error("failed to prune session functions: {0}")]
    Teardown(#[source] PruneError<E>),
}

impl<E> SuiteError<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` for failures of the check itself rather than of the
    /// infrastructure around it.
    #[must_use]
    pub const fn is_assertion(&self) -> bool {
        matches!(
            self,
            Self::Verify {
                source: VerifyError::Assertion(_),
                ..
            }
        )
    }
}

/// Stages reached by a suite and how it ended.
#[derive(Debug)]
pub struct SuiteReport<E>
where
    E: std::error::Error + 'static,
{
    /// Completed stages, starting with [`Stage::Init`].
    pub stages: Vec<Stage>,
    /// Outcome of the suite.
    pub result: Result<(), SuiteError<E>>,
}

impl<E> SuiteReport<E>
where
    E: std::error::Error + 'static,
{
    fn new() -> Self {
        Self {
            stages: vec![Stage::Init],
            result: Ok(()),
        }
    }

    fn advance(&mut self, stage: Stage) {
        tracing::info!(?stage, "suite stage reached");
        self.stages.push(stage);
    }

    fn fail(mut self, err: SuiteError<E>) -> Self {
        tracing::error!(error = %err, "suite failed");
        self.stages.push(Stage::Failed);
        self.result = Err(err);
        self
    }

    fn finish(mut self) -> Self {
        self.advance(Stage::Done);
        self
    }

    /// Returns `true` when the suite reached [`Stage::Done`].
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Last stage reached.
    #[must_use]
    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Init)
    }
}

/// Outcome of running both suites with one packaging step.
#[derive(Debug)]
pub struct RunReport<E>
where
    E: std::error::Error + 'static,
{
    /// Cloud Functions suite.
    pub functions: SuiteReport<E>,
    /// Cloud Build suite.
    pub build: SuiteReport<E>,
}

impl<E> RunReport<E>
where
    E: std::error::Error + 'static,
{
    /// Returns `true` when both suites succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.functions.is_success() && self.build.is_success()
    }
}

enum StepFailure<E> {
    Deploy(DeployError),
    Authorize(E),
    Verify(VerifyError),
}

/// Runs the suites for one session.
#[derive(Debug)]
pub struct SuiteOrchestrator<A, R: CommandRunner> {
    config: HarnessConfig,
    session: Session,
    project: String,
    workspace: Utf8PathBuf,
    runner: R,
    pruner: Pruner<A>,
    verifier: Verifier,
}

impl<A, R> SuiteOrchestrator<A, R>
where
    A: FunctionsApi,
    R: CommandRunner + Clone + Send + 'static,
{
    /// Creates an orchestrator working in the current directory.
    #[must_use]
    pub fn new(
        config: HarnessConfig,
        session: Session,
        project_id: impl Into<String>,
        api: A,
        runner: R,
        verifier: Verifier,
    ) -> Self {
        let project: String = project_id.into();
        let policy = PrunePolicy::new(
            session.full_prefix(),
            session.short_prefix(),
            config.stale_after(),
        );
        let pruner = Pruner::new(api, FunctionName::all_locations_parent(&project), policy);
        Self {
            config,
            session,
            project,
            workspace: Utf8PathBuf::from("."),
            runner,
            pruner,
            verifier,
        }
    }

    /// Overrides the directory holding `package.json` and the fixtures.
    #[must_use]
    pub fn with_workspace(mut self, workspace: impl Into<Utf8PathBuf>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Session this orchestrator provisions resources for.
    #[must_use]
    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Resource name of this session's function.
    #[must_use]
    pub fn function_name(&self) -> FunctionName {
        FunctionName::new(&self.project, &self.config.region, self.session.full_prefix())
    }

    /// Packs the module and stages it in the fixtures.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] when packing or copying fails.
    pub async fn package(&self) -> Result<PackedModule, PackageError> {
        let packager = Packager::new(
            self.runner.clone(),
            &self.config.npm_bin,
            self.workspace.clone(),
            &self.config.package_manifest,
            &self.config.fixtures_dir,
        );
        run_blocking(&self.config.npm_bin, move || packager.pack()).await
    }

    /// Runs one prune sweep outside a suite.
    ///
    /// # Errors
    ///
    /// Returns [`PruneError::List`] when listing fails.
    pub async fn prune(&self, mode: PruneMode) -> Result<PruneSummary<A::Error>, PruneError<A::Error>> {
        self.pruner.prune(mode).await
    }

    /// Packs the module once, then runs the functions suite followed by the
    /// build suite. The build suite runs even when the functions suite fails.
    ///
    /// # Errors
    ///
    /// Returns [`SuiteError::Package`] when packaging fails; neither suite
    /// runs in that case.
    pub async fn run_all(&self) -> Result<RunReport<A::Error>, SuiteError<A::Error>> {
        let packed = self.package().await.map_err(SuiteError::Package)?;
        tracing::debug!(staged = packed.staged.len(), "tarball staged for both suites");

        let mut functions_start = SuiteReport::new();
        functions_start.advance(Stage::Packaged);
        let functions = self.functions_after_packaging(functions_start).await;

        let mut build_start = SuiteReport::new();
        build_start.advance(Stage::Packaged);
        let build = self.build_after_packaging(build_start).await;
        Ok(RunReport { functions, build })
    }

    /// Runs the Cloud Functions suite, including packaging.
    pub async fn run_functions(&self) -> SuiteReport<A::Error> {
        let mut report = SuiteReport::new();
        if let Err(err) = self.package().await {
            return report.fail(SuiteError::Package(err));
        }
        report.advance(Stage::Packaged);
        self.functions_after_packaging(report).await
    }

    /// Runs the Cloud Build suite, including packaging.
    pub async fn run_build(&self) -> SuiteReport<A::Error> {
        let mut report = SuiteReport::new();
        if let Err(err) = self.package().await {
            return report.fail(SuiteError::Package(err));
        }
        report.advance(Stage::Packaged);
        self.build_after_packaging(report).await
    }

    async fn functions_after_packaging(
        &self,
        mut report: SuiteReport<A::Error>,
    ) -> SuiteReport<A::Error> {
        if let Err(err) = self.pruner.prune(PruneMode::Stale).await {
            return report.fail(SuiteError::PruneList(err));
        }
        report.advance(Stage::PrunedPrior);

        let primary = self.deploy_authorize_verify(&mut report).await;
        let teardown_result = self.pruner.prune(PruneMode::Session).await;
        if teardown_result.is_ok() {
            report.advance(Stage::PrunedSelf);
        }

        match (primary, teardown_result) {
            (Ok(()), Ok(_)) => report.finish(),
            (Ok(()), Err(err)) => report.fail(SuiteError::Teardown(err)),
            (Err(failure), Ok(_)) => report.fail(with_teardown_note(failure, None)),
            (Err(failure), Err(err)) => report.fail(with_teardown_note(failure, Some(&err))),
        }
    }

    async fn deploy_authorize_verify(
        &self,
        report: &mut SuiteReport<A::Error>,
    ) -> Result<(), StepFailure<A::Error>> {
        let function = self.function_name();
        let spec = DeploySpec {
            function_id: function.id.clone(),
            entry_point: self.config.entry_point.clone(),
            runtime: self.config.runtime.clone(),
            region: self.config.region.clone(),
            project: self.project.clone(),
            source: self.fixture_path(&self.config.hook_dir()),
        };
        let deployer = GcloudDeployer::new(self.runner.clone(), &self.config.gcloud_bin);
        run_blocking(&self.config.gcloud_bin, move || deployer.deploy(&spec))
            .await
            .map_err(StepFailure::Deploy)?;
        report.advance(Stage::Deployed);

        let resource = function.to_string();
        let policy = IamPolicy::public_invoker();
        self.pruner
            .api()
            .set_iam_policy(&resource, &policy)
            .await
            .map_err(StepFailure::Authorize)?;
        report.advance(Stage::Authorized);

        let url = self.config.function_url(&self.project, &function.id);
        self.verifier
            .verify(&url)
            .await
            .map_err(StepFailure::Verify)?;
        report.advance(Stage::Verified);
        Ok(())
    }

    async fn build_after_packaging(
        &self,
        mut report: SuiteReport<A::Error>,
    ) -> SuiteReport<A::Error> {
        let source = self.fixture_path(&self.config.cloudbuild_dir());
        let project = self.project.clone();
        let deployer = GcloudDeployer::new(self.runner.clone(), &self.config.gcloud_bin);
        let submitted = run_blocking(&self.config.gcloud_bin, move || {
            deployer.submit_build(&source, &project)
        })
        .await;
        let log = match submitted {
            Ok(log) => log,
            Err(err) => return report.fail(SuiteError::Build(err)),
        };
        report.advance(Stage::Built);
        tracing::info!(log = %log.text, "cloud build log");

        if let Err(err) = check_build_log(&log) {
            return report.fail(SuiteError::Verify {
                message: err.to_string(),
                source: err,
            });
        }
        report.advance(Stage::Verified);
        report.finish()
    }

    fn fixture_path(&self, relative: &Utf8Path) -> Utf8PathBuf {
        if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.workspace.join(relative)
        }
    }
}

/// Runs a blocking tool invocation on the blocking pool. A task that panics
/// or is cancelled is reported as a failure to run `program`.
async fn run_blocking<T, E, F>(program: &str, task: F) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: From<CommandError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .unwrap_or_else(|err| {
            Err(E::from(CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            }))
        })
}

fn with_teardown_note<E>(failure: StepFailure<E>, teardown_error: Option<&PruneError<E>>) -> SuiteError<E>
where
    E: std::error::Error + 'static,
{
    match failure {
        StepFailure::Deploy(source) => SuiteError::Deploy {
            message: append_teardown_note(source.to_string(), teardown_error),
            source,
        },
        StepFailure::Authorize(source) => SuiteError::Authorize {
            message: append_teardown_note(source.to_string(), teardown_error),
            source,
        },
        StepFailure::Verify(source) => SuiteError::Verify {
            message: append_teardown_note(source.to_string(), teardown_error),
            source,
        },
    }
}

fn append_teardown_note<E: Display>(message: String, teardown_error: Option<&E>) -> String {
    match teardown_error {
        Some(teardown) => format!("{message} (teardown also failed: {teardown})"),
        None => message,
    }
}
