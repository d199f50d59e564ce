use std::process::ExitCode;

use derive_more::{Display, Error, From};
use tracing::{error, info, instrument};

use crate::{
    commands::Action,
    invoker::{Invocation, InvocationStatus, InvokeError, Invoker, Tool},
    patcher::{ConfigStore, PatchError, ResourcePatcher},
    profile::{Profile, ProfileRegistry},
    request::{Request, RequestError, Target},
    targets,
};

/// Errors that abort the whole run.
#[derive(Debug, Display, From, Error)]
pub(crate) enum OrchestratorError {
    /// Configuration resource access error.
    Patch(PatchError),

    /// Request is not supported.
    Request(RequestError),
}

/// Outcome of a single invocation.
#[derive(Debug, Display)]
pub(crate) enum Outcome {
    /// Tool ran to completion.
    Finished(InvocationStatus),

    /// Tool could not be started.
    #[display(fmt = "unable to run tool: {}", _0)]
    Failed(InvokeError),
}

impl Outcome {
    /// Whether the tool exited successfully.
    pub fn success(&self) -> bool {
        matches!(self, Outcome::Finished(status) if status.success())
    }
}

/// Result of a single apply, invoke and restore cycle.
#[derive(Debug)]
pub(crate) struct TargetReport {
    /// Target name.
    pub target: String,

    /// Invocation outcome.
    pub outcome: Outcome,
}

/// Results of every cycle performed during a run.
#[derive(Debug, Default)]
pub(crate) struct RunReport {
    /// Per-target results, in execution order.
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    /// Whether every invocation succeeded.
    #[cfg(test)]
    pub fn success(&self) -> bool {
        self.targets.iter().all(|report| report.outcome.success())
    }

    /// Reports of failed invocations, in execution order.
    pub fn failures(&self) -> impl Iterator<Item = &TargetReport> {
        self.targets.iter().filter(|report| !report.outcome.success())
    }

    /// Names of targets whose invocation failed.
    #[cfg(test)]
    pub fn failed_targets(&self) -> Vec<&str> {
        self.failures().map(|report| report.target.as_str()).collect()
    }

    /// Process exit code: the last non-zero tool exit code.
    ///
    /// Tools terminated by a signal or not started at all map to `1`.
    pub fn exit_code(&self) -> u8 {
        self.targets
            .iter()
            .rev()
            .find(|report| !report.outcome.success())
            .map(|report| match &report.outcome {
                Outcome::Finished(status) => status
                    .code()
                    .and_then(|code| u8::try_from(code).ok())
                    .filter(|code| *code != 0)
                    .unwrap_or(1),
                Outcome::Failed(_) => 1,
            })
            .unwrap_or(0)
    }
}

impl From<&RunReport> for ExitCode {
    fn from(report: &RunReport) -> Self {
        ExitCode::from(report.exit_code())
    }
}

/// Drives profile selection, target resolution and patched tool invocations.
pub(crate) struct Orchestrator<S, I> {
    /// Profile data.
    registry: ProfileRegistry,

    /// Shared configuration resource patcher.
    patcher: ResourcePatcher<S>,

    /// External tool runner.
    invoker: I,

    /// Build, test and run tool.
    build_tool: Tool,

    /// Deploy function extraction tool.
    extractor: Tool,
}

impl<S: ConfigStore, I: Invoker> Orchestrator<S, I> {
    /// Create a new orchestrator.
    pub fn new(
        registry: ProfileRegistry,
        patcher: ResourcePatcher<S>,
        invoker: I,
        build_tool: Tool,
        extractor: Tool,
    ) -> Self {
        Self {
            registry,
            patcher,
            invoker,
            build_tool,
            extractor,
        }
    }

    /// Process the request.
    ///
    /// Tool failures do not stop the run, they are collected into the
    /// returned [`RunReport`]. Resource access errors abort the run,
    /// with every cycle started so far already restored.
    pub fn run(&mut self, request: &Request) -> Result<RunReport, OrchestratorError> {
        let selected = self.registry.select_profile(request.action, request.flags);

        info!(
            action = %request.action,
            profile = selected.name(),
            "profile selected"
        );

        let mut report = RunReport::default();

        match request.action {
            Action::GetDeployFunctions => {
                let target = single_target(request)?;
                let invocation = Invocation::extractor(&self.extractor, target);

                report
                    .targets
                    .push(self.cycle(target, &selected, &invocation)?);
            }
            Action::Run => {
                let target = single_target(request)?;
                let invocation = Invocation::build_tool(
                    &self.build_tool,
                    request.action,
                    target,
                    &request.forwarded_args(),
                    false,
                );

                report
                    .targets
                    .push(self.cycle(target, &selected, &invocation)?);
            }
            Action::Build | Action::Test => {
                let forwarded = request.forwarded_args();

                for target in targets::resolve(&self.registry, request.action, &request.target) {
                    let profile = target.profile(&selected);
                    let invocation = Invocation::build_tool(
                        &self.build_tool,
                        request.action,
                        &target.name,
                        &forwarded,
                        request.flags.gas_report,
                    );

                    report
                        .targets
                        .push(self.cycle(&target.name, &profile, &invocation)?);
                }
            }
        }

        Ok(report)
    }

    /// Apply the profile, run the invocation and restore the resource.
    #[instrument(skip_all, fields(contract = target))]
    fn cycle(
        &mut self,
        target: &str,
        profile: &Profile,
        invocation: &Invocation,
    ) -> Result<TargetReport, OrchestratorError> {
        let invoker = &mut self.invoker;

        let result = self.patcher.scoped(profile, || {
            info!(%invocation, "running tool");
            invoker.run(invocation)
        })?;

        let outcome = match result {
            Ok(status) if status.success() => Outcome::Finished(status),
            Ok(status) => {
                error!(%status, "tool failed");
                Outcome::Finished(status)
            }
            Err(e) => {
                error!(%e, "unable to run tool");
                Outcome::Failed(e)
            }
        };

        Ok(TargetReport {
            target: target.to_owned(),
            outcome,
        })
    }

    /// External tool runner.
    #[cfg(test)]
    pub fn invoker(&self) -> &I {
        &self.invoker
    }
}

/// Target name of actions that work with a single target only.
fn single_target(request: &Request) -> Result<&str, RequestError> {
    match &request.target {
        Target::Named(name) => Ok(name.as_str()),
        Target::All => Err(RequestError::UnsupportedWildcard(request.action)),
    }
}
