//! Binary entry point for the metadata system-test harness.

use std::io::{self, Write};
use std::process;

use clap::Parser;
use thiserror::Error;

use metadata_systest::{
    CloudFunctionsClient, ConfigError, ContextError, FunctionName, FunctionsApiError, GcpContext,
    HarnessConfig, PackageError, Packager, ProcessCommandRunner, PruneError, PruneMode,
    PrunePolicy, PruneSummary, Pruner, Session, SuiteError, SuiteOrchestrator, SuiteReport,
    Verifier, VerifyError,
};

mod cli;

use cli::{Cli, PruneCommand};

type Orchestrator = SuiteOrchestrator<CloudFunctionsClient, ProcessCommandRunner>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("credential error: {0}")]
    Context(#[from] ContextError),
    #[error("api client error: {0}")]
    Api(#[from] FunctionsApiError),
    #[error("verifier error: {0}")]
    Verifier(#[from] VerifyError),
    #[error("packaging failed: {0}")]
    Package(#[from] PackageError),
    #[error("prune failed: {0}")]
    Prune(#[from] PruneError<FunctionsApiError>),
    #[error("{suite} suite failed: {source}")]
    Suite {
        suite: &'static str,
        #[source]
        source: SuiteError<FunctionsApiError>,
    },
    #[error("invalid session tag {0:?}: expected 8 lowercase hex digits")]
    InvalidSessionTag(String),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config = load_config()?;
    match cli {
        Cli::Pack => exec_pack(&config),
        Cli::Prune(command) => exec_prune(&config, command).await,
        Cli::Functions => {
            let orchestrator = build_orchestrator(config)?;
            let report = orchestrator.run_functions().await;
            finish_suite("functions", report)
        }
        Cli::Build => {
            let orchestrator = build_orchestrator(config)?;
            let report = orchestrator.run_build().await;
            finish_suite("build", report)
        }
        Cli::Run => {
            let orchestrator = build_orchestrator(config)?;
            let report = orchestrator
                .run_all()
                .await
                .map_err(|source| CliError::Suite {
                    suite: "system test",
                    source,
                })?;
            let outcomes = [
                finish_suite("functions", report.functions),
                finish_suite("build", report.build),
            ];
            let mut exit_code = 0;
            for outcome in outcomes {
                if let Err(err) = outcome {
                    report_error(&err);
                    exit_code = 1;
                }
            }
            Ok(exit_code)
        }
    }
}

fn load_config() -> Result<HarnessConfig, CliError> {
    let config = HarnessConfig::load_without_cli_args()?;
    config.validate()?;
    Ok(config)
}

fn build_client(config: &HarnessConfig) -> Result<CloudFunctionsClient, CliError> {
    let context = GcpContext::resolve(config, &ProcessCommandRunner)?;
    Ok(CloudFunctionsClient::new(
        context,
        &config.functions_api_url,
        config.request_timeout(),
    )?)
}

fn build_orchestrator(config: HarnessConfig) -> Result<Orchestrator, CliError> {
    let client = build_client(&config)?;
    let project = client.context().project_id().to_owned();
    let session = Session::generate(&config.name_prefix);
    let verifier = Verifier::new(config.request_timeout())?;
    tracing::info!(%session, %project, "starting system test session");
    Ok(SuiteOrchestrator::new(
        config,
        session,
        project,
        client,
        ProcessCommandRunner,
        verifier,
    ))
}

fn exec_pack(config: &HarnessConfig) -> Result<i32, CliError> {
    let packed = Packager::new(
        ProcessCommandRunner,
        &config.npm_bin,
        ".",
        &config.package_manifest,
        &config.fixtures_dir,
    )
    .pack()?;
    let mut stdout = io::stdout();
    for staged in &packed.staged {
        writeln!(stdout, "{staged}").ok();
    }
    Ok(0)
}

async fn exec_prune(config: &HarnessConfig, command: PruneCommand) -> Result<i32, CliError> {
    let (mode, tag) = match command.session {
        Some(tag) => {
            validate_session_tag(&tag)?;
            let session = Session::with_suffix(&config.name_prefix, tag);
            (PruneMode::Session, session.full_prefix())
        }
        None => (PruneMode::Stale, config.name_prefix.clone()),
    };
    let client = build_client(config)?;
    let parent = FunctionName::all_locations_parent(client.context().project_id());
    let policy = PrunePolicy::new(tag, &config.name_prefix, config.stale_after());
    let summary = Pruner::new(client, parent, policy).prune(mode).await?;
    write_prune_summary(io::stdout(), &summary);
    Ok(0)
}

fn validate_session_tag(tag: &str) -> Result<(), CliError> {
    let valid = tag.len() == metadata_systest::session::SUFFIX_LEN
        && tag
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch));
    if valid {
        Ok(())
    } else {
        Err(CliError::InvalidSessionTag(tag.to_owned()))
    }
}

fn finish_suite(
    suite: &'static str,
    report: SuiteReport<FunctionsApiError>,
) -> Result<i32, CliError> {
    tracing::info!(suite, stages = ?report.stages, "suite finished");
    report
        .result
        .map(|()| 0)
        .map_err(|source| CliError::Suite { suite, source })
}

fn write_prune_summary<E>(mut target: impl Write, summary: &PruneSummary<E>) {
    writeln!(
        target,
        "listed {} functions, deleted {}, failed {}",
        summary.listed,
        summary.deleted(),
        summary.failed()
    )
    .ok();
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
