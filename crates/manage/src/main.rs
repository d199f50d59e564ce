//! # Deployment profile orchestrator
//!
//! Contract sources import addresses from a shared constants file which
//! contains quoted placeholder tokens (`"MARKETPLACE_ADDRESS"`, `"ADMIN_ADDRESS"`, etc.).
//! Before the build tool is started, the constants file is patched with one
//! of the environment profiles, and the original content is restored once
//! the tool exits.
//!
//! # Profiles
//!
//! Profiles are ordered lists of placeholder bindings, loaded from the built-in
//! profile data (see [`profile`]). The `test` profile is used for tests,
//! `testnet` and `mainnet` profiles are used for builds and scripts.
//!
//! # Patch cycle
//!
//! Every tool invocation is bracketed by an apply and restore pair, performed by
//! the [`patcher`] module. Multi-target requests patch and restore the resource
//! separately for each target, see [`orchestrator`] for details.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

/// CLI definition.
mod commands;

/// External tool invocations.
mod invoker;

/// Top-level control flow.
mod orchestrator;

/// Reversible configuration resource patching.
mod patcher;

/// Profile data and selection rules.
mod profile;

/// Request validation.
mod request;

/// Target expansion.
mod targets;

use std::{path::PathBuf, process::ExitCode};

use clap::Parser;
use commands::Cli;
use common::{config::Config, logging};
use invoker::{ProcessInvoker, Tool};
use orchestrator::Orchestrator;
use patcher::{FileStore, ResourcePatcher};
use profile::ProfileRegistry;
use request::Request;
use tracing::{error, info, warn};

/// CLI entrypoint.
fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();

    let dotenv = load_environment_file();

    let config = Config::new(cli.config.clone())?;

    logging::init(&config);

    match dotenv {
        Ok(Some(path)) => info!(path = %path.display(), "loaded environment file"),
        Ok(None) => {}
        Err(e) => warn!(%e, "unable to load environment file"),
    }

    let request = Request::from_cli(cli)?;
    let registry = ProfileRegistry::load(config.profiles.path.as_deref())?;

    let store = FileStore::new(config.resource.path);
    info!(resource = %store.path().display(), "using configuration resource");

    let mut orchestrator = Orchestrator::new(
        registry,
        ResourcePatcher::new(store),
        ProcessInvoker,
        Tool::new(config.tools.build)?,
        Tool::new(config.tools.extractor)?,
    );

    let report = orchestrator.run(&request)?;

    for failure in report.failures() {
        error!(
            contract = %failure.target,
            outcome = %failure.outcome,
            "invocation failed"
        );
    }

    Ok(ExitCode::from(&report))
}

/// Load variables from the nearest `.env` file, if there is one.
///
/// Variables already present in the process environment are kept.
fn load_environment_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
