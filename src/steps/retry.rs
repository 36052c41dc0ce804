//! Retry & Failure Hooks
//!
//! Process-running steps (local and remote) share one failure convention,
//! applied after every attempt:
//!
//! 1. With `allowFail`, an exit failure is recorded as
//!    `<stepName>_exit_status` and the step succeeds.
//! 2. `onEachFailure` steps run after every failed attempt.
//! 3. When no attempts remain, `onFinalFailure` steps run and the error is
//!    returned.
//! 4. Exit failures are retried after `delay` seconds; any other failure is
//!    returned as is.
//!
//! Failure hooks are diagnostic: their own errors are logged and never
//! replace the step's error.

use std::time::Duration;

use log::{error, info};
use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;
use crate::execution::{ExecutionContext, StepBase};
use crate::Variables;

/// Retry settings, flattened into the step record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub allow_fail: bool,
    /// Total attempts; 0 and 1 both mean a single attempt
    pub attempts: u32,
    /// Seconds between attempts
    pub delay: u64,
    pub on_each_failure: Option<Vec<Value>>,
    pub on_final_failure: Option<Vec<Value>>,
}

impl RetryPolicy {
    /// Runs `action` under this policy.
    pub fn run<F>(&self, base: &StepBase, vars: &mut Variables, mut action: F) -> Result<(), StepError>
    where
        F: FnMut(&mut Variables) -> Result<(), StepError>,
    {
        let mut attempts = self.attempts;

        loop {
            let result = action(vars);
            let err = match self.settle(base, vars, result) {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };

            info!("Got an error and attempts = {}", attempts);

            if let Some(commands) = &self.on_each_failure {
                run_failure_hook("OnEachFailure", &base.ctx, commands, vars);
            }

            if attempts <= 1 {
                if let Some(commands) = &self.on_final_failure {
                    run_failure_hook("OnFinalFailure", &base.ctx, commands, vars);
                }
                return Err(err);
            }

            if !err.is_exit() {
                return Err(err);
            }

            attempts -= 1;
            info!("Got execution failure, will retry (attempts left {})", attempts);
            base.ctx.sleep(Duration::from_secs(self.delay));
        }
    }

    /// Applies `allowFail` to one attempt's result.
    fn settle(
        &self,
        base: &StepBase,
        vars: &mut Variables,
        result: Result<(), StepError>,
    ) -> Result<(), StepError> {
        if !self.allow_fail {
            return result;
        }

        let key = format!("{}_exit_status", base.step_name());
        match result {
            Ok(()) => {
                vars.insert(key, Value::from(0));
                Ok(())
            }
            Err(e) => match e.exit_status() {
                Some(status) => {
                    vars.insert(key, Value::from(status));
                    Ok(())
                }
                None => {
                    vars.insert(key, Value::from(0));
                    Err(e)
                }
            },
        }
    }
}

/// Runs a failure hook's steps in a child engine over the same namespace.
fn run_failure_hook(label: &str, ctx: &ExecutionContext, commands: &[Value], vars: &mut Variables) {
    let result = ExecutionContext::scenario_document(commands)
        .and_then(|scenario| ctx.child_with_scenario(&scenario))
        .and_then(|child| {
            child
                .execute(vars)
                .map_err(|e| StepError::Nested(Box::new(e)))
        });

    if let Err(e) = result {
        error!("Got an error when running {}: {}", label, e);
    }
}
