//! Lakeward CLI entrypoint.
//!
//! This is the main entrypoint for the lakeward command-line tool.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use lakeward_deploy_bundles::bundle::Bundle;
use lakeward_deploy_bundles::cli::{Cli, Commands, OutputFormatter};
use lakeward_deploy_bundles::config::loader::find_root;
use lakeward_deploy_bundles::config::schema::bundle_schema;
use lakeward_deploy_bundles::config::User;
use lakeward_deploy_bundles::error::{LakewardError, Result};
use lakeward_deploy_bundles::iac::ShellEngine;
use lakeward_deploy_bundles::mutator::{apply, apply_seq, Diagnostics, Mutator};
use lakeward_deploy_bundles::phases::{
    build_phase, deploy_phase, destroy_phase, initialize_phase, load_phase, ReleaseLock,
};
use lakeward_deploy_bundles::sync::{sync_once, watch_loop};
use lakeward_deploy_bundles::workspace::FsWorkspace;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse();

    // .env first so logging and workspace settings can come from it.
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let formatter = OutputFormatter::new(cli.output);
    let diags = runtime.block_on(run(cli));
    formatter.emit_diagnostics(&diags);
    if diags.has_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Diagnostics {
    let formatter = OutputFormatter::new(cli.output);

    if matches!(cli.command, Commands::Schema) {
        return cmd_schema();
    }

    let mut bundle = match setup_bundle(&cli) {
        Ok(bundle) => bundle,
        Err(err) => return Diagnostics::from_error(err),
    };

    match cli.command {
        Commands::Schema => unreachable!("handled above"),
        Commands::Validate => cmd_validate(&mut bundle, &formatter).await,
        Commands::Summary => cmd_summary(&mut bundle, &formatter).await,
        Commands::Sync { watch, interval } => cmd_sync(&mut bundle, watch, interval).await,
        Commands::Deploy {
            force_lock,
            auto_approve,
        } => {
            bundle.force_lock = force_lock;
            bundle.auto_approve = auto_approve;
            cmd_deploy(&mut bundle, &formatter).await
        }
        Commands::Destroy {
            auto_approve,
            force_lock,
        } => {
            bundle.force_lock = force_lock;
            bundle.auto_approve = auto_approve;
            cmd_destroy(&mut bundle).await
        }
    }
}

/// Builds the bundle with its workspace and engine capabilities attached.
fn setup_bundle(cli: &Cli) -> Result<Bundle> {
    let cwd = std::env::current_dir()?;
    let root = find_root(&cwd)?;
    debug!(root = %root.display(), "bundle root");

    let workspace_dir = std::env::var("LAKEWARD_WORKSPACE_DIR")
        .map_or_else(|_| root.join(".lakeward").join("workspace"), Into::into);
    let user = User {
        user_name: std::env::var("LAKEWARD_USER")
            .unwrap_or_else(|_| String::from("dev@localhost")),
        display_name: None,
    };
    let engine_binary =
        std::env::var("LAKEWARD_ENGINE_BIN").unwrap_or_else(|_| String::from("terraform"));

    let mut bundle = Bundle::new(
        root,
        Arc::new(FsWorkspace::new(workspace_dir, user)),
        Arc::new(ShellEngine::new(engine_binary)),
    );
    bundle.target = cli.target.clone();
    for var in &cli.vars {
        let (name, value) = var.split_once('=').ok_or_else(|| {
            LakewardError::internal(format!("invalid --var '{var}', expected NAME=value"))
        })?;
        bundle
            .var_overrides
            .insert(name.to_string(), value.to_string());
    }
    Ok(bundle)
}

/// Runs phases in order, stopping at the first error.
async fn run_phases(bundle: &mut Bundle, phases: Vec<Vec<Box<dyn Mutator>>>) -> Diagnostics {
    let mut all = Diagnostics::new();
    for phase in phases {
        let diags = apply_seq(bundle, &phase).await;
        let failed = diags.has_error();
        all.extend(diags);
        if failed {
            break;
        }
    }
    all
}

/// Releases a held lock after a failed run.
async fn release_on_failure(bundle: &mut Bundle, diags: &mut Diagnostics) {
    if bundle.lock.is_some() {
        diags.extend(apply(bundle, &ReleaseLock).await);
    }
}

/// Validate configuration.
async fn cmd_validate(bundle: &mut Bundle, formatter: &OutputFormatter) -> Diagnostics {
    let diags = run_phases(bundle, vec![load_phase(), initialize_phase(false)]).await;
    if !diags.has_error() {
        eprintln!("{}", formatter.format_result(true, "configuration is valid"));
    }
    diags
}

/// Print the configuration schema.
fn cmd_schema() -> Diagnostics {
    let schema = match bundle_schema() {
        Ok(schema) => schema,
        Err(err) => return Diagnostics::from_error(err),
    };
    match serde_json::to_string_pretty(&schema) {
        Ok(rendered) => {
            println!("{rendered}");
            Diagnostics::new()
        }
        Err(e) => Diagnostics::from_error(LakewardError::internal(e.to_string())),
    }
}

/// Show the bundle summary.
async fn cmd_summary(bundle: &mut Bundle, formatter: &OutputFormatter) -> Diagnostics {
    let diags = run_phases(bundle, vec![load_phase(), initialize_phase(false)]).await;
    if !diags.has_error() {
        eprintln!("{}", formatter.format_summary(bundle));
    }
    diags
}

/// One-shot or continuous file sync.
async fn cmd_sync(bundle: &mut Bundle, watch: bool, interval: u64) -> Diagnostics {
    let mut diags = run_phases(bundle, vec![load_phase(), initialize_phase(false)]).await;
    if diags.has_error() {
        return diags;
    }

    if watch {
        let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = stop_tx.send(true);
            }
        });
        info!("watching for changes; press Ctrl-C to stop");
        if let Err(err) = watch_loop(bundle, Duration::from_secs(interval), stop_rx).await {
            diags.extend(Diagnostics::from_error(err));
        }
        return diags;
    }

    match sync_once(bundle).await {
        Ok(stats) => {
            eprintln!(
                "Synced: {} uploaded, {} deleted.",
                stats.uploaded, stats.deleted
            );
            diags
        }
        Err(err) => {
            diags.extend(Diagnostics::from_error(err));
            diags
        }
    }
}

/// Full deployment: load, initialize, build, deploy.
async fn cmd_deploy(bundle: &mut Bundle, formatter: &OutputFormatter) -> Diagnostics {
    let mut diags = run_phases(
        bundle,
        vec![
            load_phase(),
            initialize_phase(true),
            build_phase(),
            deploy_phase(),
        ],
    )
    .await;
    if diags.has_error() {
        release_on_failure(bundle, &mut diags).await;
        eprintln!("{}", formatter.format_result(false, "deploy"));
    } else {
        eprintln!(
            "{}",
            formatter.format_result(
                true,
                &format!(
                    "deployed bundle '{}' to target '{}'",
                    bundle.config.bundle.name,
                    bundle.selected_target()
                )
            )
        );
    }
    diags
}

/// Destroy deployment.
async fn cmd_destroy(bundle: &mut Bundle) -> Diagnostics {
    let mut diags = run_phases(
        bundle,
        vec![load_phase(), initialize_phase(true), destroy_phase()],
    )
    .await;
    if diags.has_error() {
        release_on_failure(bundle, &mut diags).await;
    } else {
        // The remote state area is gone along with the lock it held.
        bundle.lock = None;
        eprintln!("All deployed resources destroyed.");
    }
    diags
}
