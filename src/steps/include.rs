//! `include`: runs the steps of another scenario file.
//!
//! The file is read from the storage given to [`IncludeStep::factory`],
//! relative to its base path unless absolute. Two scoping modes exist:
//!
//! - merged (default): the declared `variables` are written into the
//!   caller's namespace and the included steps run on it directly
//! - isolated (`noMergeVars: true`): the included steps run on a new
//!   namespace made of the declared `variables` plus `_parent`, and the
//!   result is stored whole under `<stepName>_variables`

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::subexecute::run_commands;
use crate::error::StepError;
use crate::eval::eval_string;
use crate::execution::{ExecutionContext, Step, StepBase, StepFactory};
use crate::scenario::parse_scenario;
use crate::storage::FileSystem;
use crate::Variables;

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IncludeStep {
    #[serde(flatten)]
    pub base: StepBase,
    /// Scenario path, a template
    pub file: String,
    /// `null` or absent means no declared variables
    pub variables: Option<Variables>,
    pub no_merge_vars: bool,

    #[serde(skip)]
    storage: Option<Arc<dyn FileSystem>>,
    #[serde(skip)]
    base_path: String,
}

impl IncludeStep {
    /// A registry factory reading included files from `storage`.
    ///
    /// Relative paths are resolved against `base_path` (may be empty).
    pub fn factory(storage: Arc<dyn FileSystem>, base_path: impl Into<String>) -> StepFactory {
        let base_path = base_path.into();
        Arc::new(move |ctx: &ExecutionContext, raw: &Value| -> Result<Box<dyn Step>, serde_json::Error> {
            let mut step: IncludeStep = serde_json::from_value(raw.clone())?;
            step.base.ctx = ctx.clone();
            step.storage = Some(Arc::clone(&storage));
            step.base_path = base_path.clone();
            Ok(Box::new(step) as Box<dyn Step>)
        })
    }

    fn resolve(&self, filename: String) -> String {
        if self.base_path.is_empty() || filename.starts_with('/') {
            return filename;
        }
        format!("{}/{}", self.base_path.trim_end_matches('/'), filename)
    }

    fn load(&self, vars: &Variables) -> Result<Vec<Value>, StepError> {
        let step_name = self.base.step_name();

        let storage = self
            .storage
            .as_ref()
            .ok_or_else(|| StepError::definition("include: no storage configured"))?;

        let filename = eval_string(&self.file, vars);
        if filename.is_empty() {
            return Err(StepError::definition(format!("filename in {:?} is empty", step_name)));
        }
        let filename = self.resolve(filename);

        let script = storage.read_file(&filename).map_err(|e| {
            StepError::from(e).context(format!(
                "unable to load included script {:?} in {:?}",
                filename, step_name
            ))
        })?;

        let text = String::from_utf8_lossy(&script);
        let scenario = parse_scenario(&text).map_err(|e| {
            StepError::from(e).context(format!("failed to parse input {:?} in {:?}", filename, step_name))
        })?;

        Ok(scenario.commands)
    }
}

impl Step for IncludeStep {
    fn kind(&self) -> &'static str {
        "include"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        if self.file.is_empty() {
            return Err(StepError::definition(format!(
                "filename in {:?} is empty",
                self.base.step_name()
            )));
        }

        let commands = self.load(vars)?;

        if !self.no_merge_vars {
            for (key, value) in self.variables.iter().flatten() {
                vars.insert(key.clone(), value.clone());
            }
            return run_commands(&self.base.ctx, &commands, vars);
        }

        let mut isolated = self.variables.clone().unwrap_or_default();
        isolated.insert("_parent".to_string(), Value::Object(vars.clone()));

        let result = run_commands(&self.base.ctx, &commands, &mut isolated);

        isolated.remove("_parent");
        vars.insert(
            format!("{}_variables", self.base.step_name()),
            Value::Object(isolated),
        );

        result
    }
}
