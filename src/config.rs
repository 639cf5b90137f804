//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::functions::DEFAULT_API_URL;

/// Short prefix shared by every resource the suite creates.
pub const DEFAULT_NAME_PREFIX: &str = "gcloud-tests";

/// Age after which a prefixed resource is presumed leaked.
pub const DEFAULT_STALE_AFTER_MINUTES: u64 = 60;

/// Harness settings derived from environment variables and configuration
/// files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "SYSTEST",
    discovery(
        app_name = "metadata-systest",
        env_var = "SYSTEST_CONFIG_PATH",
        config_file_name = "metadata-systest.toml",
        dotfile_name = ".metadata-systest.toml",
        project_file_name = "metadata-systest.toml"
    )
)]
pub struct HarnessConfig {
    /// Project that receives the deployed function. Resolved through
    /// `gcloud config get-value project` when unset.
    pub project_id: Option<String>,
    /// OAuth access token for the REST API. Resolved through
    /// `gcloud auth print-access-token` when unset.
    pub access_token: Option<String>,
    /// Region the function is deployed to.
    #[ortho_config(default = "us-central1".to_owned())]
    pub region: String,
    /// Shared prefix for resource names; the per-run suffix is appended.
    #[ortho_config(default = DEFAULT_NAME_PREFIX.to_owned())]
    pub name_prefix: String,
    /// Prefixed resources older than this many minutes are pruned before
    /// deployment.
    #[ortho_config(default = DEFAULT_STALE_AFTER_MINUTES)]
    pub stale_after_minutes: u64,
    /// Function runtime identifier.
    #[ortho_config(default = "nodejs18".to_owned())]
    pub runtime: String,
    /// Exported handler invoked by the HTTP trigger.
    #[ortho_config(default = "getMetadata".to_owned())]
    pub entry_point: String,
    /// Base URL of the Cloud Functions v1 API.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub functions_api_url: String,
    /// Overrides `https://{region}-{project}.cloudfunctions.net` when
    /// invoking the deployed function.
    pub invoke_base_url: Option<String>,
    /// Path to the `gcloud` CLI binary.
    #[ortho_config(default = "gcloud".to_owned())]
    pub gcloud_bin: String,
    /// Path to the `npm` binary.
    #[ortho_config(default = "npm".to_owned())]
    pub npm_bin: String,
    /// Directory holding the `hook` and `cloudbuild` fixtures.
    #[ortho_config(default = "system-test/fixtures".to_owned())]
    pub fixtures_dir: String,
    /// Manifest of the package under test.
    #[ortho_config(default = "package.json".to_owned())]
    pub package_manifest: String,
    /// Timeout for HTTP requests, in seconds.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl HarnessConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to metadata-systest.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_optional_field(
        value: Option<&str>,
        metadata: &FieldMetadata,
    ) -> Result<(), ConfigError> {
        value.map_or(Ok(()), |present| Self::require_field(present, metadata))
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("metadata-systest")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation. Error messages name the environment
    /// variable and TOML key that supply the value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// and [`ConfigError::Invalid`] when a numeric field is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_optional_field(
            self.project_id.as_deref(),
            &FieldMetadata::new("project id", "SYSTEST_PROJECT_ID", "project_id"),
        )?;
        Self::require_optional_field(
            self.access_token.as_deref(),
            &FieldMetadata::new("access token", "SYSTEST_ACCESS_TOKEN", "access_token"),
        )?;
        let required = [
            (
                self.region.as_str(),
                FieldMetadata::new("deployment region", "SYSTEST_REGION", "region"),
            ),
            (
                self.name_prefix.as_str(),
                FieldMetadata::new("resource name prefix", "SYSTEST_NAME_PREFIX", "name_prefix"),
            ),
            (
                self.runtime.as_str(),
                FieldMetadata::new("function runtime", "SYSTEST_RUNTIME", "runtime"),
            ),
            (
                self.entry_point.as_str(),
                FieldMetadata::new("function entry point", "SYSTEST_ENTRY_POINT", "entry_point"),
            ),
            (
                self.functions_api_url.as_str(),
                FieldMetadata::new(
                    "Cloud Functions API URL",
                    "SYSTEST_FUNCTIONS_API_URL",
                    "functions_api_url",
                ),
            ),
            (
                self.gcloud_bin.as_str(),
                FieldMetadata::new("gcloud binary", "SYSTEST_GCLOUD_BIN", "gcloud_bin"),
            ),
            (
                self.npm_bin.as_str(),
                FieldMetadata::new("npm binary", "SYSTEST_NPM_BIN", "npm_bin"),
            ),
            (
                self.fixtures_dir.as_str(),
                FieldMetadata::new("fixtures directory", "SYSTEST_FIXTURES_DIR", "fixtures_dir"),
            ),
            (
                self.package_manifest.as_str(),
                FieldMetadata::new(
                    "package manifest",
                    "SYSTEST_PACKAGE_MANIFEST",
                    "package_manifest",
                ),
            ),
        ];
        for (value, metadata) in &required {
            Self::require_field(value, metadata)?;
        }

        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(String::from(
                "request_timeout_secs must be greater than zero (SYSTEST_REQUEST_TIMEOUT_SECS)",
            )));
        }
        Ok(())
    }

    /// Fixture directory deployed as the HTTP function.
    #[must_use]
    pub fn hook_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.fixtures_dir).join("hook")
    }

    /// Fixture directory submitted to Cloud Build.
    #[must_use]
    pub fn cloudbuild_dir(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.fixtures_dir).join("cloudbuild")
    }

    /// Staleness threshold as a duration.
    #[must_use]
    pub const fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_minutes.saturating_mul(60))
    }

    /// HTTP request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// URL at which the function `id` in `project` answers HTTP requests.
    #[must_use]
    pub fn function_url(&self, project: &str, id: &str) -> String {
        self.invoke_base_url.as_deref().map_or_else(
            || format!("https://{}-{project}.cloudfunctions.net/{id}", self.region),
            |base| format!("{}/{id}", base.trim_end_matches('/')),
        )
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a field holds an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
