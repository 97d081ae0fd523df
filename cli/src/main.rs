//! Keystone CLI - runs one bootstrap against in-process collaborators.
//!
//! ```text
//! keystone [ROLE]
//!   main() -> load config -> resolve role -> Loopback::install(tree)
//!          -> install_parameters -> Sequencer::run(manifest_for(role))
//! ```
//!
//! The role comes from the command line, then `KEYSTONE_ROLE`, then
//! `[bootstrap] role` in `~/.keystone/config.toml`, then `chain`.

use std::{
    env,
    fs::{self, File, OpenOptions},
    io,
    path::PathBuf,
    process::ExitCode,
    sync::Mutex,
    time::Duration,
};

use anyhow::{Context, Result};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use keystone_config::{KeystoneConfig, ROLE_ENV, resolve_role};
use keystone_engine::loopback::Loopback;
use keystone_engine::{
    BootstrapReport, PowerTree, Sequencer, builtin_registry, install_parameters, manifest_for,
};
use keystone_types::Role;

fn init_tracing(configured_filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured_filter.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (log_file, init_warnings) = open_keystone_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
    for warning in init_warnings {
        tracing::warn!("{warning}");
    }
}

fn open_keystone_log_file() -> (Option<(PathBuf, File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in keystone_log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn keystone_log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.keystone/logs/keystone.log
    if let Some(config_path) = KeystoneConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("keystone.log"));
    }

    // Fallback: ./.keystone/logs/keystone.log
    candidates.push(PathBuf::from(".keystone").join("logs").join("keystone.log"));

    candidates
}

async fn bootstrap(role: Role, config: Option<&KeystoneConfig>) -> Result<BootstrapReport> {
    let tree = PowerTree::new();
    Loopback::new().install(&tree);
    if let Some(config) = config {
        install_parameters(&tree, config.parameters()?);
    }

    let manifest = manifest_for(role).context("built-in manifest is invalid")?;
    let sequencer = Sequencer::new(builtin_registry(role)?, tree);

    let report = match config.and_then(KeystoneConfig::watchdog_secs) {
        Some(secs) => {
            sequencer
                .run_within(&manifest, Duration::from_secs(secs))
                .await?
        }
        None => sequencer.run(&manifest).await?,
    };
    Ok(report)
}

fn print_report(role: Role, report: &BootstrapReport) {
    println!(
        "{role} bootstrap {} complete: {} behaviors in {:?}",
        report.run_id,
        report.behaviors.len(),
        report.elapsed
    );
    for outcome in &report.behaviors {
        println!("  {:<24} {:?}", outcome.name, outcome.elapsed);
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let config = match KeystoneConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(config.as_ref().and_then(KeystoneConfig::log_filter).as_deref());

    let cli_role = env::args().nth(1);
    let env_role = env::var(ROLE_ENV).ok();
    let role = match resolve_role(
        cli_role.as_deref(),
        env_role.as_deref(),
        config.as_ref().and_then(KeystoneConfig::role),
    ) {
        Ok(role) => role,
        Err(err) => {
            tracing::error!(error = %err, "role resolution failed");
            eprintln!("Error: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%role, "starting bootstrap");

    match bootstrap(role, config.as_ref()).await {
        Ok(report) => {
            print_report(role, &report);
            ExitCode::SUCCESS
        }
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "bootstrap failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
