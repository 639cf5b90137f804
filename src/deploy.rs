//! Deployment of the fixtures through the `gcloud` CLI.
//!
//! Both drivers block until `gcloud` exits, so a returned `Ok` means the
//! function is serving or the build has finished.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::command::{CommandError, CommandRunner};

/// Everything needed to deploy the HTTP function.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DeploySpec {
    /// Function identifier (the session's full prefix).
    pub function_id: String,
    /// Exported handler name.
    pub entry_point: String,
    /// Runtime identifier (for example `nodejs18`).
    pub runtime: String,
    /// Target region.
    pub region: String,
    /// Project receiving the function.
    pub project: String,
    /// Directory containing the function source.
    pub source: Utf8PathBuf,
}

/// Errors raised while deploying or building.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Raised when the source directory does not exist.
    #[error("deployment source directory missing: {path}")]
    MissingSource {
        /// Directory that was expected to exist.
        path: Utf8PathBuf,
    },
    /// Raised when `gcloud` fails to run or exits unsuccessfully.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Log captured from a Cloud Build run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BuildLog {
    /// Combined stdout and stderr of `gcloud builds submit`.
    pub text: String,
}

/// Deploys HTTP functions and submits builds via `gcloud`.
#[derive(Clone, Debug)]
pub struct GcloudDeployer<R: CommandRunner> {
    runner: R,
    gcloud_bin: String,
}

impl<R: CommandRunner> GcloudDeployer<R> {
    /// Creates a deployer that shells out to `gcloud_bin`.
    #[must_use]
    pub fn new(runner: R, gcloud_bin: impl Into<String>) -> Self {
        Self {
            runner,
            gcloud_bin: gcloud_bin.into(),
        }
    }

    /// Deploys the function and waits for `gcloud` to report completion.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::MissingSource`] when the source directory is
    /// absent and [`DeployError::Command`] when `gcloud` fails.
    pub fn deploy(&self, spec: &DeploySpec) -> Result<(), DeployError> {
        require_dir(&spec.source)?;
        let args = build_deploy_args(spec);
        tracing::info!(
            function = %spec.function_id,
            region = %spec.region,
            runtime = %spec.runtime,
            "deploying function"
        );
        self.runner.run_checked(&self.gcloud_bin, &args)?;
        Ok(())
    }

    /// Submits `source` (which holds a `cloudbuild.yaml`) to Cloud Build
    /// and returns the build log.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::MissingSource`] when the directory is absent
    /// and [`DeployError::Command`] when the build fails.
    pub fn submit_build(&self, source: &Utf8Path, project: &str) -> Result<BuildLog, DeployError> {
        require_dir(source)?;
        let args = vec![
            OsString::from("builds"),
            OsString::from("submit"),
            OsString::from(source.as_str()),
            OsString::from(format!("--config={}", source.join("cloudbuild.yaml"))),
            OsString::from(format!("--project={project}")),
        ];
        tracing::info!(source = %source, "submitting cloud build");
        let output = self.runner.run_checked(&self.gcloud_bin, &args)?;
        Ok(BuildLog {
            text: output.combined(),
        })
    }
}

fn require_dir(path: &Utf8Path) -> Result<(), DeployError> {
    if path.is_dir() {
        return Ok(());
    }
    Err(DeployError::MissingSource {
        path: path.to_path_buf(),
    })
}

fn build_deploy_args(spec: &DeploySpec) -> Vec<OsString> {
    vec![
        OsString::from("functions"),
        OsString::from("deploy"),
        OsString::from(&spec.function_id),
        OsString::from(format!("--entry-point={}", spec.entry_point)),
        OsString::from("--trigger-http"),
        OsString::from(format!("--runtime={}", spec.runtime)),
        OsString::from(format!("--region={}", spec.region)),
        OsString::from(format!("--source={}", spec.source)),
        OsString::from(format!("--project={}", spec.project)),
        OsString::from("--no-gen2"),
        OsString::from("--quiet"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn source_dir() -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let path = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
        (tmp, path)
    }

    fn spec(source: Utf8PathBuf) -> DeploySpec {
        DeploySpec {
            function_id: String::from("gcloud-tests-abcd"),
            entry_point: String::from("getMetadata"),
            runtime: String::from("nodejs18"),
            region: String::from("us-central1"),
            project: String::from("proj"),
            source,
        }
    }

    #[rstest]
    fn deploy_passes_trigger_runtime_and_region(source_dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = source_dir;
        let runner = ScriptedRunner::new();
        runner.push_success();

        GcloudDeployer::new(runner.clone(), "gcloud")
            .deploy(&spec(path.clone()))
            .expect("deploy");

        let invocations = runner.invocations();
        let call = invocations.first().expect("gcloud invocation");
        assert_eq!(
            call.command_string(),
            format!(
                "gcloud functions deploy gcloud-tests-abcd --entry-point=getMetadata \
                 --trigger-http --runtime=nodejs18 --region=us-central1 --source={path} \
                 --project=proj --no-gen2 --quiet"
            )
        );
    }

    #[rstest]
    fn deploy_rejects_missing_source() {
        let runner = ScriptedRunner::new();
        let err = GcloudDeployer::new(runner.clone(), "gcloud")
            .deploy(&spec(Utf8PathBuf::from("/definitely/not/here")))
            .expect_err("missing source");
        assert!(matches!(err, DeployError::MissingSource { .. }));
        assert!(runner.invocations().is_empty());
    }

    #[rstest]
    fn deploy_surfaces_gcloud_failure(source_dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = source_dir;
        let runner = ScriptedRunner::new();
        runner.push_failure(1);

        let err = GcloudDeployer::new(runner, "gcloud")
            .deploy(&spec(path))
            .expect_err("gcloud failure");
        assert!(matches!(
            err,
            DeployError::Command(CommandError::Failure { status: Some(1), .. })
        ));
    }

    #[rstest]
    fn submit_build_returns_combined_log(source_dir: (TempDir, Utf8PathBuf)) {
        let (_tmp, path) = source_dir;
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "DONE", "Step #0: isAvailable: true");

        let log = GcloudDeployer::new(runner.clone(), "gcloud")
            .submit_build(&path, "proj")
            .expect("build");

        assert!(log.text.contains("isAvailable: true"));
        assert!(log.text.contains("DONE"));
        let invocations = runner.invocations();
        let call = invocations.first().expect("gcloud invocation");
        assert!(
            call.command_string()
                .starts_with(&format!("gcloud builds submit {path} --config={path}/cloudbuild.yaml"))
        );
    }
}
