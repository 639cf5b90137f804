//! System-test harness for the metadata client.
//!
//! The crate packs the client, deploys it to Cloud Functions and Cloud
//! Build, checks that the deployed code detects the metadata service, and
//! keeps the test project clean by pruning functions that earlier runs
//! leaked.

pub mod command;
pub mod config;
pub mod deploy;
pub mod functions;
pub mod package;
pub mod prune;
pub mod resource;
pub mod run;
pub mod session;
pub mod settle;
pub mod test_support;
pub mod verify;

pub use command::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use config::{ConfigError, HarnessConfig};
pub use deploy::{BuildLog, DeployError, DeploySpec, GcloudDeployer};
pub use functions::{
    CloudFunctionsClient, ContextError, FunctionsApi, FunctionsApiError, GcpContext,
};
pub use package::{PackageError, PackageManifest, PackedModule, Packager};
pub use prune::{DeletionOutcome, PruneError, PruneMode, PrunePolicy, PruneSummary, Pruner};
pub use resource::{FunctionName, IamPolicy, RemoteResource};
pub use run::{RunReport, Stage, SuiteError, SuiteOrchestrator, SuiteReport};
pub use session::Session;
pub use settle::settle_all;
pub use verify::{Verifier, VerifyError};
