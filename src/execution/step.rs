//! Step Contract
//!
//! Every step kind implements [`Step`]. The fields shared by all kinds
//! (`stepName`, `description`, `requires`, `callsAfter`) live in
//! [`StepBase`], which concrete steps embed with `#[serde(flatten)]`.

use serde::Deserialize;
use serde_json::Value;

use super::context::ExecutionContext;
use crate::error::{StepError, StepSummary};
use crate::eval::template::eval_string;
use crate::Variables;

/// Parse-time metadata attached to a step loaded from a scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    /// 1-based position in the scenario
    pub id: usize,
    /// The raw step record as loaded
    pub contents: String,
}

/// Fields common to every step kind.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StepBase {
    pub step_name: String,
    pub description: String,
    pub requires: String,
    pub calls_after: String,

    #[serde(skip)]
    pub debug_info: Option<DebugInfo>,

    #[serde(skip)]
    pub ctx: ExecutionContext,
}

impl StepBase {
    /// The explicit step name, or `__step_no_NNN` derived from the step's
    /// position when no name was given.
    pub fn step_name(&self) -> String {
        match &self.debug_info {
            Some(info) if self.step_name.is_empty() && info.id > 0 => {
                format!("__step_no_{:03}", info.id)
            }
            _ => self.step_name.clone(),
        }
    }

    /// Interpolates the description against `vars`.
    pub fn description(&self, vars: &Variables) -> String {
        if self.description.is_empty() {
            return String::new();
        }
        eval_string(&self.description, vars)
    }
}

/// A unit of work in a scenario.
///
/// Implementations provide their kind name, access to their [`StepBase`]
/// and the action itself; everything else has a default built on the base.
pub trait Step: Send + Sync {
    /// Stable diagnostic name of the step kind, used in error messages.
    fn kind(&self) -> &'static str;

    fn base(&self) -> &StepBase;

    fn base_mut(&mut self) -> &mut StepBase;

    /// Runs the step's action against the namespace.
    fn execute(&self, vars: &mut Variables) -> Result<(), StepError>;

    fn step_name(&self) -> String {
        self.base().step_name()
    }

    fn requires(&self) -> &str {
        &self.base().requires
    }

    /// Name of the hook to invoke after a successful run, if any.
    fn calls_after(&self) -> &str {
        &self.base().calls_after
    }

    fn description(&self, vars: &Variables) -> String {
        self.base().description(vars)
    }

    fn debug_info(&self) -> Option<&DebugInfo> {
        self.base().debug_info.as_ref()
    }

    fn set_debug_info(&mut self, info: DebugInfo) {
        self.base_mut().debug_info = Some(info);
    }

    fn context(&self) -> &ExecutionContext {
        &self.base().ctx
    }

    /// Identity of this step for error reporting, under its effective name.
    fn summary(&self, effective_name: &str) -> StepSummary {
        StepSummary {
            step_name: effective_name.to_string(),
            command_id: self.debug_info().map(|info| info.id),
            kind: self.kind(),
        }
    }
}

/// Reads a `commands` list that may be missing or null.
pub(crate) fn raw_commands(commands: &Option<Vec<Value>>) -> &[Value] {
    commands.as_deref().unwrap_or(&[])
}
