//! `commands`: runs a nested step list against the caller's namespace.

use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;
use crate::execution::{step::raw_commands, ExecutionContext, Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubExecuteStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub commands: Option<Vec<Value>>,
}

impl Step for SubExecuteStep {
    fn kind(&self) -> &'static str {
        "commands"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        run_commands(&self.base.ctx, raw_commands(&self.commands), vars)
    }
}

/// Loads `commands` into a child engine and runs it on `vars`.
///
/// Failures inside the child come back as [`StepError::Nested`] so the
/// calling engine reports them unchanged.
pub(crate) fn run_commands(
    ctx: &ExecutionContext,
    commands: &[Value],
    vars: &mut Variables,
) -> Result<(), StepError> {
    ctx.require_engine()?;

    let scenario = ExecutionContext::scenario_document(commands)
        .map_err(|e| e.context("cannot marshal commands script"))?;
    let child = ctx
        .child_with_scenario(&scenario)
        .map_err(|e| e.context("cannot load child executor"))?;

    child
        .execute(vars)
        .map_err(|e| StepError::Nested(Box::new(e)))
}
