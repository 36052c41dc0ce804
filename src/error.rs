//! Error Types
//!
//! The error taxonomy of the engine:
//!
//! - [`ScenarioError`]: a scenario document could not be turned into steps
//! - [`StepError`]: what a single step returns when it fails
//! - [`CommandAwareError`]: the wrapper surfaced by [`Engine::execute`],
//!   carrying the failing step and a snapshot of the namespace
//!
//! [`Engine::execute`]: crate::execution::Engine::execute

use std::fmt;
use std::io;

use thiserror::Error;

use crate::remote::scp::ScpError;
use crate::remote::session::SshError;
use crate::Variables;

/// Errors raised while loading a scenario document.
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to parse YAML scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to parse JSON scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid command type: {0:?}")]
    InvalidCommandType(String),

    #[error("invalid command #{id} of type {kind:?}: {source}")]
    InvalidCommand {
        id: usize,
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to read scenario '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Errors returned by a step's action.
#[derive(Debug, Error)]
pub enum StepError {
    /// The step is misconfigured (missing fields, wrong shapes, wrong types).
    #[error("{0}")]
    Definition(String),

    /// A `requires` expression could not be evaluated.
    #[error("{0}")]
    Evaluation(String),

    /// A local process exited unsuccessfully.
    #[error("process exited with status {status}")]
    Exit { status: i32 },

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Ssh(#[from] SshError),

    #[error(transparent)]
    Scp(#[from] ScpError),

    #[error(transparent)]
    Scenario(#[from] ScenarioError),

    /// An already wrapped failure from a nested engine. Passed through
    /// unchanged by outer engines.
    #[error(transparent)]
    Nested(#[from] Box<CommandAwareError>),

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<StepError>,
    },

    /// Free-form failure, typically raised by hooks and embedder code.
    #[error("{0}")]
    Other(String),
}

impl StepError {
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition(message.into())
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// Wraps this error with a human readable context line.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Exit status of a nonzero-exit-style failure, local or remote.
    ///
    /// Only these failures are eligible for retries; transport and setup
    /// failures return `None`.
    pub fn exit_status(&self) -> Option<i32> {
        match self {
            Self::Exit { status } => Some(*status),
            Self::Ssh(SshError::Exit { status }) => Some(*status),
            _ => None,
        }
    }

    pub fn is_exit(&self) -> bool {
        self.exit_status().is_some()
    }
}

/// Identity of the step that failed, captured at wrap time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSummary {
    /// Effective step name, including any loop suffix
    pub step_name: String,
    /// 1-based position in the scenario, when known
    pub command_id: Option<usize>,
    /// Stable diagnostic name of the step kind
    pub kind: &'static str,
}

/// A step failure together with the failing step and the namespace at the
/// moment of failure.
///
/// Produced exactly once, by the innermost engine that observed the failure.
#[derive(Debug)]
pub struct CommandAwareError {
    cause: StepError,
    step: StepSummary,
    variables: Variables,
}

impl CommandAwareError {
    pub fn new(cause: StepError, step: StepSummary, variables: Variables) -> Self {
        Self {
            cause,
            step,
            variables,
        }
    }

    pub fn cause(&self) -> &StepError {
        &self.cause
    }

    pub fn into_cause(self) -> StepError {
        self.cause
    }

    pub fn step(&self) -> &StepSummary {
        &self.step
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }
}

impl fmt::Display for CommandAwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step.command_id {
            Some(id) => write!(
                f,
                "command failed (stepName={}, commandId={}, commandType={}): {}",
                self.step.step_name, id, self.step.kind, self.cause
            ),
            None => write!(
                f,
                "command failed (stepName={}, commandType={}): {}",
                self.step.step_name, self.step.kind, self.cause
            ),
        }
    }
}

impl std::error::Error for CommandAwareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(command_id: Option<usize>) -> StepSummary {
        StepSummary {
            step_name: "install".to_string(),
            command_id,
            kind: "exec",
        }
    }

    #[test]
    fn test_command_aware_error_message_with_id() {
        let err = CommandAwareError::new(StepError::Exit { status: 2 }, summary(Some(3)), Variables::new());
        assert_eq!(
            err.to_string(),
            "command failed (stepName=install, commandId=3, commandType=exec): process exited with status 2"
        );
    }

    #[test]
    fn test_command_aware_error_message_without_id() {
        let err = CommandAwareError::new(StepError::other("boom"), summary(None), Variables::new());
        assert_eq!(err.to_string(), "command failed (stepName=install, commandType=exec): boom");
    }

    #[test]
    fn test_command_aware_error_source() {
        use std::error::Error as _;

        let err = CommandAwareError::new(StepError::other("boom"), summary(None), Variables::new());
        assert_eq!(err.source().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_exit_status_classification() {
        assert_eq!(StepError::Exit { status: 4 }.exit_status(), Some(4));
        assert_eq!(StepError::Ssh(SshError::Exit { status: 1 }).exit_status(), Some(1));
        assert!(!StepError::Ssh(SshError::Closed).is_exit());
        assert!(!StepError::other("x").is_exit());
    }

    #[test]
    fn test_context_message() {
        let err = StepError::other("permission denied").context("unable to get ssh session");
        assert_eq!(err.to_string(), "unable to get ssh session: permission denied");
    }
}
