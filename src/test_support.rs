//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};

use crate::command::{CommandError, CommandOutput, CommandRunner};
use crate::config::HarnessConfig;
use crate::functions::{ApiFuture, FunctionsApi, FunctionsApiError};
use crate::resource::{IamPolicy, RemoteResource};

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<Mutex<VecDeque<CommandOutput>>>,
    invocations: Arc<Mutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// Thread the command ran on.
    pub thread: ThreadId,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            thread: thread::current().id(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct FakeState {
    functions: Vec<RemoteResource>,
    failing_deletes: BTreeSet<String>,
    list_error: Option<FunctionsApiError>,
    list_error_after: usize,
    iam_error: Option<FunctionsApiError>,
    list_calls: usize,
    delete_calls: Vec<String>,
    iam_calls: Vec<(String, IamPolicy)>,
}

/// In-memory function namespace implementing [`FunctionsApi`].
///
/// Successful deletes remove the function, so a second sweep observes the
/// state the first one left behind.
#[derive(Clone, Debug, Default)]
pub struct FakeFunctionsApi {
    state: Arc<Mutex<FakeState>>,
}

impl FakeFunctionsApi {
    /// Creates a namespace holding `functions`.
    #[must_use]
    pub fn with_functions(functions: Vec<RemoteResource>) -> Self {
        let api = Self::default();
        api.lock().functions = functions;
        api
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        lock(&self.state)
    }

    /// Adds a function to the namespace.
    pub fn insert(&self, function: RemoteResource) {
        self.lock().functions.push(function);
    }

    /// Makes every delete request for `name` fail.
    pub fn fail_delete(&self, name: impl Into<String>) {
        self.lock().failing_deletes.insert(name.into());
    }

    /// Makes listing fail with `error`.
    pub fn fail_list(&self, error: FunctionsApiError) {
        self.fail_list_after(0, error);
    }

    /// Lets the first `successful_calls` listings succeed, then fails every
    /// later one with `error`.
    pub fn fail_list_after(&self, successful_calls: usize, error: FunctionsApiError) {
        let mut state = self.lock();
        state.list_error = Some(error);
        state.list_error_after = successful_calls;
    }

    /// Makes `set_iam_policy` fail with `error`.
    pub fn fail_iam(&self, error: FunctionsApiError) {
        self.lock().iam_error = Some(error);
    }

    /// Names of functions still present.
    #[must_use]
    pub fn remaining(&self) -> Vec<String> {
        self.lock()
            .functions
            .iter()
            .map(|function| function.name.clone())
            .collect()
    }

    /// Number of listing requests received.
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.lock().list_calls
    }

    /// Names passed to delete requests, in arrival order.
    #[must_use]
    pub fn delete_calls(&self) -> Vec<String> {
        self.lock().delete_calls.clone()
    }

    /// Resources and policies passed to `set_iam_policy`.
    #[must_use]
    pub fn iam_calls(&self) -> Vec<(String, IamPolicy)> {
        self.lock().iam_calls.clone()
    }
}

impl FunctionsApi for FakeFunctionsApi {
    type Error = FunctionsApiError;

    fn list_functions<'a>(
        &'a self,
        _parent: &'a str,
    ) -> ApiFuture<'a, Vec<RemoteResource>, Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.list_calls += 1;
            let exhausted = state.list_calls > state.list_error_after;
            if let Some(err) = state.list_error.clone().filter(|_| exhausted) {
                return Err(err);
            }
            Ok(state.functions.clone())
        })
    }

    fn delete_function<'a>(&'a self, name: &'a str) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.delete_calls.push(name.to_owned());
            if state.failing_deletes.contains(name) {
                return Err(FunctionsApiError::Status {
                    operation: String::from("delete"),
                    status: 500,
                    body: format!("simulated failure deleting {name}"),
                });
            }
            state.functions.retain(|function| function.name != name);
            Ok(())
        })
    }

    fn set_iam_policy<'a>(
        &'a self,
        resource: &'a str,
        policy: &'a IamPolicy,
    ) -> ApiFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let mut state = self.lock();
            state.iam_calls.push((resource.to_owned(), policy.clone()));
            state.iam_error.clone().map_or(Ok(()), Err)
        })
    }
}

/// Configuration with defaults and explicit credentials, suitable for
/// tests that must not touch `gcloud`.
#[must_use]
pub fn harness_config() -> HarnessConfig {
    HarnessConfig {
        project_id: Some(String::from("test-project")),
        access_token: Some(String::from("test-token")),
        region: String::from("us-central1"),
        name_prefix: String::from(crate::config::DEFAULT_NAME_PREFIX),
        stale_after_minutes: crate::config::DEFAULT_STALE_AFTER_MINUTES,
        runtime: String::from("nodejs18"),
        entry_point: String::from("getMetadata"),
        functions_api_url: String::from(crate::functions::DEFAULT_API_URL),
        invoke_base_url: None,
        gcloud_bin: String::from("gcloud"),
        npm_bin: String::from("npm"),
        fixtures_dir: String::from("system-test/fixtures"),
        package_manifest: String::from("package.json"),
        request_timeout_secs: 30,
    }
}

/// Produces a JSON page matching the Cloud Functions list response.
#[must_use]
pub fn json_functions(functions: &[(&str, Option<&str>)], next_page_token: Option<&str>) -> String {
    let items = functions
        .iter()
        .map(|(name, update_time)| {
            update_time.map_or_else(
                || format!("{{\"name\":\"{name}\"}}"),
                |time| format!("{{\"name\":\"{name}\",\"updateTime\":\"{time}\"}}"),
            )
        })
        .collect::<Vec<_>>()
        .join(",");
    next_page_token.map_or_else(
        || format!("{{\"functions\":[{items}]}}"),
        |token| format!("{{\"functions\":[{items}],\"nextPageToken\":\"{token}\"}}"),
    )
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: AsyncMutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
