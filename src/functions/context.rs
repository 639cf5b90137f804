//! Construction-time acquisition of project and credentials.

use std::ffi::OsString;

use thiserror::Error;

use crate::command::{CommandError, CommandRunner};
use crate::config::HarnessConfig;

/// Project and access token used for every remote call of a run.
///
/// Built once by [`GcpContext::resolve`] and passed explicitly to the
/// clients that need it.
#[derive(Clone, Eq, PartialEq)]
pub struct GcpContext {
    project_id: String,
    access_token: String,
}

impl std::fmt::Debug for GcpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcpContext")
            .field("project_id", &self.project_id)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Errors raised while resolving the project or credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ContextError {
    /// Raised when `gcloud` cannot be run or fails.
    #[error("failed to resolve {what}: {source}")]
    Command {
        /// Value being resolved (`project id` or `access token`).
        what: String,
        /// Underlying command error.
        #[source]
        source: CommandError,
    },
    /// Raised when the resolved value is empty.
    #[error("{what} is empty: set {env_var} or configure gcloud")]
    Empty {
        /// Value being resolved.
        what: String,
        /// Environment variable that overrides the lookup.
        env_var: String,
    },
}

impl GcpContext {
    /// Creates a context from known values.
    #[must_use]
    pub fn new(project_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            access_token: access_token.into(),
        }
    }

    /// Resolves the project id and access token.
    ///
    /// Explicit configuration wins; otherwise the values come from
    /// `gcloud config get-value project` and `gcloud auth
    /// print-access-token`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError`] when `gcloud` fails or yields an empty value.
    pub fn resolve<R: CommandRunner>(
        config: &HarnessConfig,
        runner: &R,
    ) -> Result<Self, ContextError> {
        let project_id = resolve_value(
            config.project_id.as_deref(),
            runner,
            &config.gcloud_bin,
            &["config", "get-value", "project"],
            "project id",
            "SYSTEST_PROJECT_ID",
        )?;
        let access_token = resolve_value(
            config.access_token.as_deref(),
            runner,
            &config.gcloud_bin,
            &["auth", "print-access-token"],
            "access token",
            "SYSTEST_ACCESS_TOKEN",
        )?;
        tracing::debug!(project = %project_id, "resolved gcp context");
        Ok(Self {
            project_id,
            access_token,
        })
    }

    /// Project that owns every resource of the run.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// OAuth bearer token for the REST API.
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

fn resolve_value<R: CommandRunner>(
    configured: Option<&str>,
    runner: &R,
    gcloud_bin: &str,
    args: &[&str],
    what: &str,
    env_var: &str,
) -> Result<String, ContextError> {
    let value = if let Some(explicit) = configured {
        explicit.trim().to_owned()
    } else {
        let argv = args.iter().map(OsString::from).collect::<Vec<_>>();
        let output =
            runner
                .run_checked(gcloud_bin, &argv)
                .map_err(|source| ContextError::Command {
                    what: what.to_owned(),
                    source,
                })?;
        output.stdout.trim().to_owned()
    };

    if value.is_empty() {
        return Err(ContextError::Empty {
            what: what.to_owned(),
            env_var: env_var.to_owned(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedRunner, harness_config};
    use rstest::rstest;

    #[rstest]
    fn explicit_values_skip_gcloud() {
        let mut config = harness_config();
        config.project_id = Some(String::from(" proj "));
        config.access_token = Some(String::from("token"));
        let runner = ScriptedRunner::new();

        let ctx = GcpContext::resolve(&config, &runner).expect("context");
        assert_eq!(ctx.project_id(), "proj");
        assert_eq!(ctx.access_token(), "token");
        assert!(runner.invocations().is_empty());
    }

    #[rstest]
    fn falls_back_to_gcloud_lookups() {
        let mut config = harness_config();
        config.project_id = None;
        config.access_token = None;
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "from-gcloud\n", "");
        runner.push_output(Some(0), "ya29.token\n", "");

        let ctx = GcpContext::resolve(&config, &runner).expect("context");
        assert_eq!(ctx.project_id(), "from-gcloud");
        assert_eq!(ctx.access_token(), "ya29.token");

        let commands = runner
            .invocations()
            .iter()
            .map(crate::test_support::CommandInvocation::command_string)
            .collect::<Vec<_>>();
        assert_eq!(
            commands,
            vec![
                "gcloud config get-value project",
                "gcloud auth print-access-token"
            ]
        );
    }

    #[rstest]
    fn empty_project_is_rejected() {
        let mut config = harness_config();
        config.project_id = None;
        let runner = ScriptedRunner::new();
        runner.push_output(Some(0), "\n", "(unset)");

        let err = GcpContext::resolve(&config, &runner).expect_err("empty project");
        assert!(matches!(err, ContextError::Empty { ref env_var, .. } if env_var == "SYSTEST_PROJECT_ID"));
    }

    #[rstest]
    fn debug_output_redacts_token() {
        let ctx = GcpContext::new("proj", "secret-token");
        let rendered = format!("{ctx:?}");
        assert!(!rendered.contains("secret-token"), "leaked: {rendered}");
    }
}
