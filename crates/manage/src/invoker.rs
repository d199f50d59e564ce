use std::{
    fmt, io,
    process::{Command, Stdio},
};

use derive_more::{Display, Error, From};
use itertools::Itertools;

use crate::commands::Action;

/// Gas report flag understood by the build tool.
const GAS_REPORT_FLAG: &str = "--gas-report";

/// Errors that may occur while starting an external tool.
#[derive(Debug, Display, From, Error)]
pub(crate) enum InvokeError {
    /// IO-related error.
    Io(io::Error),

    /// [`which`] crate was unable to determine location of the tool binary file.
    #[display(fmt = "unable to locate tool: {}", _0)]
    Which(which::Error),

    /// Tool command is empty.
    #[from(ignore)]
    #[display(fmt = "tool command must contain at least a program name")]
    EmptyCommand,
}

/// External tool command prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Tool {
    /// Program name or path.
    program: String,

    /// Leading arguments.
    args: Vec<String>,
}

impl Tool {
    /// Create a tool from a program name followed by its leading arguments.
    pub fn new(command: Vec<String>) -> Result<Self, InvokeError> {
        let mut command = command.into_iter();
        let program = command.next().ok_or(InvokeError::EmptyCommand)?;

        Ok(Self {
            program,
            args: command.collect(),
        })
    }
}

/// A single external tool invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Invocation {
    /// Program name or path.
    pub program: String,

    /// Full argument list.
    pub args: Vec<String>,
}

impl Invocation {
    /// Build tool invocation for a single target.
    ///
    /// Arguments are laid out as `action [--gas-report] target extra...`.
    pub fn build_tool(
        tool: &Tool,
        action: Action,
        target: &str,
        extra: &[String],
        gas_report: bool,
    ) -> Self {
        let mut args = tool.args.clone();
        args.push(action.to_string());

        if gas_report {
            args.push(String::from(GAS_REPORT_FLAG));
        }

        args.push(target.to_owned());
        args.extend(extra.iter().cloned());

        Self {
            program: tool.program.clone(),
            args,
        }
    }

    /// Deploy function extraction for a single target.
    pub fn extractor(tool: &Tool, target: &str) -> Self {
        let mut args = tool.args.clone();
        args.push(target.to_owned());

        Self {
            program: tool.program.clone(),
            args,
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.program)
        } else {
            write!(f, "{} {}", self.program, self.args.iter().join(" "))
        }
    }
}

/// Exit status of a finished invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct InvocationStatus {
    /// Exit code, missing if the process was terminated by a signal.
    code: Option<i32>,
}

impl InvocationStatus {
    /// Create a status from an exit code.
    pub fn from_code(code: Option<i32>) -> Self {
        Self { code }
    }

    /// Exit code, if any.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Whether the tool exited successfully.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "exit code {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// External tool runner.
pub(crate) trait Invoker {
    /// Run the invocation, blocking until it finishes.
    fn run(&mut self, invocation: &Invocation) -> Result<InvocationStatus, InvokeError>;
}

/// Runs invocations as child processes sharing the current stdio.
pub(crate) struct ProcessInvoker;

impl Invoker for ProcessInvoker {
    fn run(&mut self, invocation: &Invocation) -> Result<InvocationStatus, InvokeError> {
        let program = which::which(&invocation.program)?;

        let status = Command::new(program)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .args(&invocation.args)
            .spawn()?
            .wait()?;

        Ok(InvocationStatus::from_code(status.code()))
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::Action;

    use super::{Invocation, InvocationStatus, InvokeError, Invoker, ProcessInvoker, Tool};

    fn blueprint() -> Tool {
        Tool::new(vec![String::from("npx"), String::from("blueprint")]).unwrap()
    }

    #[test]
    fn build_arguments() {
        let invocation =
            Invocation::build_tool(&blueprint(), Action::Build, "TonSimpleSale", &[], false);

        assert_eq!(invocation.program, "npx");
        assert_eq!(invocation.args, ["blueprint", "build", "TonSimpleSale"]);
        assert_eq!(invocation.to_string(), "npx blueprint build TonSimpleSale");
    }

    #[test]
    fn gas_report_precedes_target() {
        let extra = vec![String::from("--verbose")];
        let invocation =
            Invocation::build_tool(&blueprint(), Action::Test, "Marketplace", &extra, true);

        assert_eq!(
            invocation.args,
            ["blueprint", "test", "--gas-report", "Marketplace", "--verbose"]
        );

        let position = invocation
            .args
            .iter()
            .position(|arg| arg == "--gas-report")
            .unwrap();
        assert_eq!(invocation.args[position + 1], "Marketplace");
    }

    #[test]
    fn gas_report_omitted() {
        let invocation =
            Invocation::build_tool(&blueprint(), Action::Test, "Marketplace", &[], false);

        assert!(!invocation.args.iter().any(|arg| arg == "--gas-report"));
    }

    #[test]
    fn extractor_arguments() {
        let tool = Tool::new(
            ["npx", "ts-node", "scripts/getDeployFunctionCode.ts"]
                .map(String::from)
                .to_vec(),
        )
        .unwrap();

        let invocation = Invocation::extractor(&tool, "TonSimpleOffer");

        assert_eq!(
            invocation.args,
            ["ts-node", "scripts/getDeployFunctionCode.ts", "TonSimpleOffer"]
        );
    }

    #[test]
    fn empty_tool() {
        assert!(matches!(Tool::new(Vec::new()), Err(InvokeError::EmptyCommand)));
    }

    #[test]
    fn status() {
        assert!(InvocationStatus::from_code(Some(0)).success());
        assert!(!InvocationStatus::from_code(Some(2)).success());
        assert!(!InvocationStatus::from_code(None).success());
        assert_eq!(InvocationStatus::from_code(Some(2)).to_string(), "exit code 2");
    }

    #[test]
    fn missing_program() {
        let tool = Tool::new(vec![String::from("definitely-not-an-installed-tool")]).unwrap();
        let invocation = Invocation::extractor(&tool, "Marketplace");

        assert!(matches!(
            ProcessInvoker.run(&invocation),
            Err(InvokeError::Which(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn process_exit_status() {
        let tool = Tool::new(vec![String::from("sh"), String::from("-c")]).unwrap();

        let success = Invocation::extractor(&tool, "exit 0");
        assert!(ProcessInvoker.run(&success).unwrap().success());

        let failure = Invocation::extractor(&tool, "exit 3");
        assert_eq!(ProcessInvoker.run(&failure).unwrap().code(), Some(3));
    }
}
