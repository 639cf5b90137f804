//! Packs the module under test and stages the tarball in the fixtures.
//!
//! `npm pack` writes `<stem>-<version>.tgz` into the workspace; the tarball
//! is then copied into each fixture directory as `<stem>.tgz`, which is the
//! file the fixtures' own `package.json` depends on.

use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::Deserialize;
use thiserror::Error;

use crate::command::{CommandError, CommandRunner};

/// Fixture directories that receive a copy of the tarball.
pub const FIXTURE_TARGETS: [&str; 2] = ["hook", "cloudbuild"];

/// Name and version read from `package.json`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct PackageManifest {
    /// npm package name, possibly scoped (`@scope/name`).
    pub name: String,
    /// Package version.
    pub version: String,
}

impl PackageManifest {
    /// File stem npm uses for the tarball: scoped names drop the `@` and
    /// replace the `/` with `-`.
    #[must_use]
    pub fn tarball_stem(&self) -> String {
        self.name.trim_start_matches('@').replace('/', "-")
    }

    /// File name `npm pack` produces.
    #[must_use]
    pub fn tarball_name(&self) -> String {
        format!("{}-{}.tgz", self.tarball_stem(), self.version)
    }

    /// File name the fixtures depend on.
    #[must_use]
    pub fn staged_name(&self) -> String {
        format!("{}.tgz", self.tarball_stem())
    }
}

/// Tarball produced by [`Packager::pack`] and the copies made from it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PackedModule {
    /// Manifest of the packed module.
    pub manifest: PackageManifest,
    /// Tarball written by `npm pack`, relative to the workspace.
    pub tarball: Utf8PathBuf,
    /// Copies placed into the fixture directories, relative to the workspace.
    pub staged: Vec<Utf8PathBuf>,
}

/// Errors raised while packing or staging the module.
#[derive(Debug, Error)]
pub enum PackageError {
    /// Raised when the manifest cannot be read.
    #[error("failed to read {path}: {message}")]
    ManifestRead {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
    /// Raised when the manifest lacks a name or version.
    #[error("failed to parse {path}: {message}")]
    ManifestParse {
        /// Manifest path.
        path: Utf8PathBuf,
        /// Parser error message.
        message: String,
    },
    /// Raised when `npm pack` fails.
    #[error("npm pack failed: {0}")]
    Pack(#[from] CommandError),
    /// Raised when a copy into a fixture directory fails.
    #[error("failed to copy {from} to {to}: {message}")]
    Copy {
        /// Source tarball.
        from: Utf8PathBuf,
        /// Destination path.
        to: Utf8PathBuf,
        /// Underlying error message.
        message: String,
    },
}

/// Runs `npm pack` and stages the tarball into the fixtures.
#[derive(Clone, Debug)]
pub struct Packager<R: CommandRunner> {
    runner: R,
    npm_bin: String,
    workspace: Utf8PathBuf,
    manifest: Utf8PathBuf,
    fixtures_dir: Utf8PathBuf,
}

impl<R: CommandRunner> Packager<R> {
    /// Creates a packager rooted at `workspace`. `manifest` and
    /// `fixtures_dir` are resolved relative to it.
    #[must_use]
    pub fn new(
        runner: R,
        npm_bin: impl Into<String>,
        workspace: impl Into<Utf8PathBuf>,
        manifest: impl Into<Utf8PathBuf>,
        fixtures_dir: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            runner,
            npm_bin: npm_bin.into(),
            workspace: workspace.into(),
            manifest: manifest.into(),
            fixtures_dir: fixtures_dir.into(),
        }
    }

    /// Reads the package manifest.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError::ManifestRead`] or
    /// [`PackageError::ManifestParse`] when the file is missing or lacks a
    /// name and version.
    pub fn read_manifest(&self) -> Result<PackageManifest, PackageError> {
        let path = self.workspace.join(&self.manifest);
        let content = self
            .open_workspace()
            .and_then(|dir| dir.read_to_string(&self.manifest))
            .map_err(|err| PackageError::ManifestRead {
                path: path.clone(),
                message: err.to_string(),
            })?;
        serde_json::from_str(&content).map_err(|err| PackageError::ManifestParse {
            path,
            message: err.to_string(),
        })
    }

    /// Packs the module and copies the tarball into every fixture target.
    ///
    /// # Errors
    ///
    /// Returns [`PackageError`] when the manifest is unusable, `npm pack`
    /// fails, or a copy fails.
    pub fn pack(&self) -> Result<PackedModule, PackageError> {
        let manifest = self.read_manifest()?;
        let args = vec![
            OsString::from("pack"),
            OsString::from(self.workspace.as_str()),
            OsString::from("--pack-destination"),
            OsString::from(self.workspace.as_str()),
        ];
        self.runner.run_checked(&self.npm_bin, &args)?;

        let tarball = Utf8PathBuf::from(manifest.tarball_name());
        let staged_name = manifest.staged_name();
        let mut staged = Vec::with_capacity(FIXTURE_TARGETS.len());
        for target in FIXTURE_TARGETS {
            let destination = self.fixtures_dir.join(target).join(&staged_name);
            self.copy_into_workspace(&tarball, &destination)?;
            staged.push(destination);
        }

        tracing::info!(
            package = %manifest.name,
            version = %manifest.version,
            tarball = %tarball,
            "packed module into fixtures"
        );
        Ok(PackedModule {
            manifest,
            tarball,
            staged,
        })
    }

    fn open_workspace(&self) -> std::io::Result<Dir> {
        Dir::open_ambient_dir(&self.workspace, ambient_authority())
    }

    fn copy_into_workspace(&self, from: &Utf8Path, to: &Utf8Path) -> Result<(), PackageError> {
        let copy_error = |message: String| PackageError::Copy {
            from: self.workspace.join(from),
            to: self.workspace.join(to),
            message,
        };
        let (Some(target_dir), Some(file_name)) = (to.parent(), to.file_name()) else {
            return Err(copy_error(String::from("destination has no file name")));
        };

        let workspace = self.open_workspace().map_err(|err| copy_error(err.to_string()))?;
        let destination_dir = workspace
            .open_dir(target_dir)
            .map_err(|err| copy_error(err.to_string()))?;
        workspace
            .copy(from, &destination_dir, file_name)
            .map_err(|err| copy_error(err.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRunner;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    fn workspace(manifest: &str) -> (TempDir, Utf8PathBuf) {
        let tmp = TempDir::new().expect("tempdir");
        let root = Utf8PathBuf::from_path_buf(tmp.path().to_path_buf()).expect("utf8 path");
        fs::write(root.join("package.json"), manifest).expect("write manifest");
        for target in FIXTURE_TARGETS {
            fs::create_dir_all(root.join("system-test/fixtures").join(target))
                .expect("create fixture dir");
        }
        (tmp, root)
    }

    fn packager(runner: ScriptedRunner, root: &Utf8Path) -> Packager<ScriptedRunner> {
        Packager::new(
            runner,
            "npm",
            root.to_owned(),
            "package.json",
            "system-test/fixtures",
        )
    }

    #[rstest]
    #[case("gcp-metadata", "gcp-metadata-6.1.0.tgz", "gcp-metadata.tgz")]
    #[case("@google-cloud/meta", "google-cloud-meta-6.1.0.tgz", "google-cloud-meta.tgz")]
    fn tarball_names_follow_npm(#[case] name: &str, #[case] tarball: &str, #[case] staged: &str) {
        let manifest = PackageManifest {
            name: name.to_owned(),
            version: String::from("6.1.0"),
        };
        assert_eq!(manifest.tarball_name(), tarball);
        assert_eq!(manifest.staged_name(), staged);
    }

    #[rstest]
    fn pack_copies_tarball_into_each_fixture() {
        let (_tmp, root) = workspace(r#"{"name":"gcp-metadata","version":"6.1.0"}"#);
        fs::write(root.join("gcp-metadata-6.1.0.tgz"), b"tarball").expect("write tarball");
        let runner = ScriptedRunner::new();
        runner.push_success();

        let packed = packager(runner.clone(), &root).pack().expect("pack");

        assert_eq!(packed.tarball, Utf8PathBuf::from("gcp-metadata-6.1.0.tgz"));
        for target in FIXTURE_TARGETS {
            let staged = root
                .join("system-test/fixtures")
                .join(target)
                .join("gcp-metadata.tgz");
            assert_eq!(fs::read(&staged).expect("staged copy"), b"tarball");
        }
        let invocations = runner.invocations();
        let pack_call = invocations.first().expect("npm invocation");
        assert_eq!(pack_call.program, "npm");
        assert_eq!(
            pack_call.args.first().map(|arg| arg.to_string_lossy().into_owned()),
            Some(String::from("pack"))
        );
    }

    #[rstest]
    fn pack_fails_when_npm_fails() {
        let (_tmp, root) = workspace(r#"{"name":"gcp-metadata","version":"6.1.0"}"#);
        let runner = ScriptedRunner::new();
        runner.push_failure(1);

        let err = packager(runner, &root).pack().expect_err("npm failure");
        assert!(matches!(err, PackageError::Pack(CommandError::Failure { .. })));
    }

    #[rstest]
    fn pack_fails_when_tarball_is_missing() {
        let (_tmp, root) = workspace(r#"{"name":"gcp-metadata","version":"6.1.0"}"#);
        let runner = ScriptedRunner::new();
        runner.push_success();

        let err = packager(runner, &root).pack().expect_err("missing tarball");
        assert!(matches!(err, PackageError::Copy { .. }), "got {err:?}");
    }

    #[rstest]
    fn manifest_without_version_is_rejected() {
        let (_tmp, root) = workspace(r#"{"name":"gcp-metadata"}"#);
        let err = packager(ScriptedRunner::new(), &root)
            .read_manifest()
            .expect_err("version is required");
        assert!(matches!(err, PackageError::ManifestParse { .. }));
    }
}
