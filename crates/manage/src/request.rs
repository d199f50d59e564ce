use derive_more::{Display, Error};

use crate::commands::{Action, Cli};

/// Wildcard target flag.
const ALL_FLAG: &str = "--all";

/// Testnet profile flag, also understood by run scripts.
const TESTNET_FLAG: &str = "--testnet";

/// Gas report flag.
const GAS_REPORT_FLAG: &str = "--gas-report";

/// Deploy function test variant flag.
const TEST_FLAG: &str = "--test";

/// Requested target.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Target {
    /// Every contract from the catalogue.
    All,

    /// A single contract or script name.
    Named(String),
}

/// Request flags that affect profile selection and tool arguments.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Flags {
    /// Select the testnet profile.
    pub testnet: bool,

    /// Insert the gas report flag before each target.
    pub gas_report: bool,

    /// Select the test deploy variant for deploy function extraction.
    pub test: bool,
}

/// Invalid action, target and flag combinations.
#[derive(Debug, Display, Error)]
pub(crate) enum RequestError {
    /// Neither a target name nor `--all` was passed.
    #[display(fmt = "missing target, pass a contract name or --all")]
    MissingTarget,

    /// Flag is not applicable to the requested action.
    #[display(fmt = "--{} is not supported by the {} action", flag, action)]
    UnsupportedFlag {
        /// Flag name, without leading dashes.
        flag: &'static str,

        /// Requested action.
        action: Action,
    },

    /// Action works with a single target only.
    #[display(fmt = "--all is not supported by the {} action", _0)]
    UnsupportedWildcard(#[error(ignore)] Action),
}

/// Validated orchestrator request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Request {
    /// Requested action.
    pub action: Action,

    /// Requested target.
    pub target: Target,

    /// Request flags.
    pub flags: Flags,

    /// Arguments passed through to the build tool.
    pub extra: Vec<String>,
}

impl Request {
    /// Validate parsed CLI arguments.
    ///
    /// Request flags are recognized anywhere in the argument list, including
    /// among the forwarded arguments. With `--all` every positional argument
    /// is forwarded to the build tool.
    pub fn from_cli(cli: Cli) -> Result<Self, RequestError> {
        let Cli {
            action,
            target,
            mut all,
            testnet,
            gas_report,
            test,
            tool_args,
            ..
        } = cli;

        let mut flags = Flags {
            testnet,
            gas_report,
            test,
        };

        let tool_args: Vec<String> = tool_args
            .into_iter()
            .filter(|arg| match arg.as_str() {
                ALL_FLAG => {
                    all = true;
                    false
                }
                TESTNET_FLAG => {
                    flags.testnet = true;
                    action == Action::Run
                }
                GAS_REPORT_FLAG => {
                    flags.gas_report = true;
                    false
                }
                TEST_FLAG => {
                    flags.test = true;
                    false
                }
                _ => true,
            })
            .collect();

        let (target, extra) = if all {
            (Target::All, target.into_iter().chain(tool_args).collect())
        } else {
            (
                Target::Named(target.ok_or(RequestError::MissingTarget)?),
                tool_args,
            )
        };

        let request = Self {
            action,
            target,
            flags,
            extra,
        };

        request.validate()?;

        Ok(request)
    }

    /// Reject flag and target combinations the action does not support.
    fn validate(&self) -> Result<(), RequestError> {
        let unsupported = |flag| RequestError::UnsupportedFlag {
            flag,
            action: self.action,
        };

        match self.action {
            Action::Build => {
                if self.flags.test {
                    return Err(unsupported("test"));
                }
            }
            Action::Test => {
                if self.flags.testnet {
                    return Err(unsupported("testnet"));
                }

                if self.flags.test {
                    return Err(unsupported("test"));
                }
            }
            Action::Run => {
                if self.flags.gas_report {
                    return Err(unsupported("gas-report"));
                }

                if self.flags.test {
                    return Err(unsupported("test"));
                }
            }
            Action::GetDeployFunctions => {
                if self.flags.testnet {
                    return Err(unsupported("testnet"));
                }

                if self.flags.gas_report {
                    return Err(unsupported("gas-report"));
                }
            }
        }

        let single_target = matches!(self.action, Action::Run | Action::GetDeployFunctions);

        if self.target == Target::All && single_target {
            return Err(RequestError::UnsupportedWildcard(self.action));
        }

        Ok(())
    }

    /// Arguments forwarded to the build tool after the target name.
    ///
    /// `--testnet` is consumed by the build action, while scripts
    /// started with the run action receive it as well. A flag placed among
    /// the forwarded arguments keeps its position.
    pub fn forwarded_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra.len() + 1);

        if self.action == Action::Run
            && self.flags.testnet
            && !self.extra.iter().any(|arg| arg == TESTNET_FLAG)
        {
            args.push(String::from(TESTNET_FLAG));
        }

        args.extend(self.extra.iter().cloned());
        args
    }
}
