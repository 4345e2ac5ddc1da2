//! infra-reconcile CLI entrypoint.
//!
//! This is the main entrypoint for the infra-reconcile command-line tool.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use infra_reconciler::cli::{Cli, Commands, LogFormat, OutputFormatter};
use infra_reconciler::config::{
    find_manifest_file, Manifest, ManifestParser, ManifestValidator, ValidationReport,
};
use infra_reconciler::error::Result;
use infra_reconciler::gateway::SimulatedProvider;
use infra_reconciler::reconciler::{DeleteAction, SkipReason};
use infra_reconciler::runner::{ManifestRunner, RunReport};
use infra_reconciler::state::{
    HistoryEntry, LocalProviderStore, LocalState, RunOperation, STATE_DIR, StateStore,
};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose, cli.log_format);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `RUST_LOG` takes precedence over `--verbose`. Logs go to stderr so that
/// reports on stdout stay machine-readable.
fn init_logging(verbose: bool, format: LogFormat) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<ExitCode> {
    let formatter = OutputFormatter::new(cli.output);
    let manifest = cli.manifest.as_ref();
    let state = cli.state.as_ref();

    match cli.command {
        Commands::Validate { warnings } => cmd_validate(manifest, warnings, &formatter),
        Commands::Sync { continue_on_error } => {
            cmd_sync(manifest, state, continue_on_error, &formatter).await
        }
        Commands::Delete {
            yes,
            continue_on_error,
        } => cmd_delete(manifest, state, yes, continue_on_error, &formatter).await,
        Commands::Show => cmd_show(manifest, state, &formatter).await,
    }
}

/// Validate the manifest.
fn cmd_validate(
    manifest_path: Option<&PathBuf>,
    show_warnings: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (_manifest, report, _dir) = load_manifest(manifest_path)?;
    println!("{}", formatter.format_validation(&report, show_warnings));
    Ok(ExitCode::SUCCESS)
}

/// Sync every resource.
async fn cmd_sync(
    manifest_path: Option<&PathBuf>,
    state_path: Option<&PathBuf>,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (mut manifest, _report, dir) = load_manifest(manifest_path)?;
    let store = state_store(state_path, &dir);
    let mut state = store.load().await?.unwrap_or_default();

    let adopted = manifest.adopt_recorded(&state.resources);
    debug!("Adopted {adopted} recorded identifier(s)");

    let provider = SimulatedProvider::from_snapshot(state.provider.clone());
    let runner = ManifestRunner::new(&provider)
        .with_snapshot_prefix(manifest.engine.snapshot_prefix.clone())
        .with_continue_on_error(continue_on_error)
        .with_cancellation(cancel_on_ctrl_c());

    let report = runner.sync_all(&mut manifest.resources).await;

    state.record_resources(
        manifest
            .resources
            .iter()
            .filter(|r| !r.meta().identifier.is_empty())
            .cloned(),
    );
    finish_run(&store, &mut state, &provider, RunOperation::Sync, &report).await?;

    println!("{}", formatter.format_run(&report));
    Ok(exit_code(&report))
}

/// Delete every resource.
async fn cmd_delete(
    manifest_path: Option<&PathBuf>,
    state_path: Option<&PathBuf>,
    auto_approve: bool,
    continue_on_error: bool,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let (mut manifest, _report, dir) = load_manifest(manifest_path)?;
    let store = state_store(state_path, &dir);
    let mut state = store.load().await?.unwrap_or_default();

    let adopted = manifest.adopt_recorded(&state.resources);
    if adopted == 0 {
        eprintln!("No recorded resources match the manifest.");
    }

    // Confirm
    if !auto_approve {
        eprintln!("The following resources will be deleted per their deletion policy:");
        for resource in manifest.resources.iter().rev() {
            eprintln!("  - {}/{}", resource.kind(), resource.name());
        }
        eprint!("\nType 'delete' to confirm: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "delete" {
            eprintln!("Deletion cancelled.");
            return Ok(ExitCode::SUCCESS);
        }
    }

    let provider = SimulatedProvider::from_snapshot(state.provider.clone());
    let runner = ManifestRunner::new(&provider)
        .with_snapshot_prefix(manifest.engine.snapshot_prefix.clone())
        .with_continue_on_error(continue_on_error)
        .with_cancellation(cancel_on_ctrl_c());

    let report = runner.delete_all(&manifest.resources).await;

    // Retained and stopped resources stay recorded so a later sync adopts them
    for resource in &report.resources {
        let released = matches!(
            resource.delete_action,
            Some(
                DeleteAction::Delete
                    | DeleteAction::SnapshotThenDelete { .. }
                    | DeleteAction::Skip {
                        reason: SkipReason::Orphaned | SkipReason::NeverCreated,
                    }
            )
        );
        if released {
            state.forget(resource.kind, &resource.name);
        }
    }
    finish_run(&store, &mut state, &provider, RunOperation::Delete, &report).await?;

    println!("{}", formatter.format_run(&report));
    Ok(exit_code(&report))
}

/// Show persisted state.
async fn cmd_show(
    manifest_path: Option<&PathBuf>,
    state_path: Option<&PathBuf>,
    formatter: &OutputFormatter,
) -> Result<ExitCode> {
    let dir = match (state_path, manifest_path) {
        (Some(_), _) => PathBuf::from("."),
        (None, Some(path)) => manifest_dir(path),
        (None, None) => {
            find_manifest_file(".").map_or_else(|_| PathBuf::from("."), |p| manifest_dir(&p))
        }
    };
    let store = state_store(state_path, &dir);

    if let Some(state) = store.load().await? {
        println!("{}", formatter.format_state(&state));
    } else {
        eprintln!("No state found at {}.", store.path().display());
    }

    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the manifest path.
fn resolve_manifest_path(manifest_path: Option<&PathBuf>) -> Result<PathBuf> {
    manifest_path.map_or_else(|| find_manifest_file("."), |path| Ok(path.clone()))
}

/// Directory containing a manifest.
fn manifest_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Loads and validates the manifest.
fn load_manifest(
    manifest_path: Option<&PathBuf>,
) -> Result<(Manifest, ValidationReport, PathBuf)> {
    let manifest_file = resolve_manifest_path(manifest_path)?;
    debug!("Loading manifest from: {}", manifest_file.display());

    let dir = manifest_dir(&manifest_file);
    let parser = ManifestParser::new().with_base_path(&dir);
    parser.load_dotenv()?;

    let mut manifest = parser.load_with_env(&manifest_file)?;

    let validator = ManifestValidator::new();
    let report = validator.validate(&mut manifest)?;
    info!("Manifest has {} resource(s)", report.resources);

    Ok((manifest, report, dir))
}

/// Creates the state store, next to the manifest unless a path is given.
fn state_store(state_path: Option<&PathBuf>, manifest_dir: &Path) -> LocalProviderStore {
    let store = state_path.map_or_else(
        || LocalProviderStore::with_base_dir(manifest_dir.join(STATE_DIR)),
        |path| LocalProviderStore::with_state_path(path.clone()),
    );
    debug!(
        "Using {} state at {}",
        store.backend_type(),
        store.path().display()
    );
    store
}

/// Returns a token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight provider calls");
            token.cancel();
        }
    });
    cancel
}

/// Persists the provider and the run history.
async fn finish_run(
    store: &LocalProviderStore,
    state: &mut LocalState,
    provider: &SimulatedProvider,
    operation: RunOperation,
    report: &RunReport,
) -> Result<()> {
    state.provider = provider.snapshot();
    state.add_history(HistoryEntry::new(
        operation,
        report.labels(),
        report.first_error().map(str::to_string),
    ));
    store.save(state).await
}

/// Maps a run report to the process exit code.
fn exit_code(report: &RunReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
