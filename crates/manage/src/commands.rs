use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use derive_more::Display;

/// CLI configuration.
#[derive(Parser)]
#[command(about, version)]
pub(crate) struct Cli {
    /// Configuration file path.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Action passed to the build tool.
    pub action: Action,

    /// Contract name.
    pub target: Option<String>,

    /// Process every contract from the catalogue.
    #[arg(long)]
    pub all: bool,

    /// Use testnet addresses (build and run only).
    #[arg(long)]
    pub testnet: bool,

    /// Ask the build tool for a gas report (build and test only).
    #[arg(long)]
    pub gas_report: bool,

    /// Extract deploy functions with test addresses.
    #[arg(long)]
    pub test: bool,

    /// Additional arguments passed to the build tool.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub tool_args: Vec<String>,
}

/// Supported actions.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, ValueEnum)]
pub(crate) enum Action {
    /// Build contracts.
    #[display(fmt = "build")]
    Build,

    /// Run contract tests.
    #[display(fmt = "test")]
    Test,

    /// Run a project script.
    #[display(fmt = "run")]
    Run,

    /// Extract deploy function code of a contract.
    #[display(fmt = "get_deploy_functions")]
    #[value(name = "get_deploy_functions")]
    GetDeployFunctions,
}
