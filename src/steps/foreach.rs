//! `foreach` / `repeat_for`: runs a step list once per collection entry.
//!
//! Each iteration gets a fresh namespace holding exactly three entries:
//! the key (a zero-based index for sequences, the entry key for maps), the
//! value, and the caller's namespace under `parent`. Step names inside the
//! body carry a `_<key>` suffix so skip flags stay distinct per iteration.
//!
//! Map entries are visited in the map's own order, which callers should
//! treat as unspecified.

use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;
use crate::execution::{step::raw_commands, Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ForeachStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub commands: Option<Vec<Value>>,
    /// Literal collection; takes precedence over `variable`
    pub iterable: Option<Value>,
    /// Namespace entry holding the collection
    pub variable: String,
    pub key_var: String,
    pub value_var: String,
    pub parent_var: String,
}

fn or_default<'a>(name: &'a str, default: &'a str) -> &'a str {
    if name.is_empty() {
        default
    } else {
        name
    }
}

impl ForeachStep {
    fn iterable<'a>(&'a self, vars: &'a Variables) -> Result<&'a Value, StepError> {
        if let Some(iterable) = self.iterable.as_ref().filter(|v| !v.is_null()) {
            return Ok(iterable);
        }

        match vars.get(&self.variable).filter(|v| !v.is_null()) {
            Some(value) => Ok(value),
            None if self.variable.is_empty() => {
                Err(StepError::definition("either iterable or variable must be set"))
            }
            None => Err(StepError::definition(format!(
                "variable {:?} does not exist",
                self.variable
            ))),
        }
    }
}

/// Iteration entries of a sequence or map, as `(key, value)` pairs.
fn entries(iterable: &Value) -> Result<Vec<(Value, Value)>, StepError> {
    match iterable {
        Value::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(index, item)| (Value::from(index), item.clone()))
            .collect()),
        Value::Object(map) => Ok(map
            .iter()
            .map(|(key, item)| (Value::String(key.clone()), item.clone()))
            .collect()),
        other => Err(StepError::definition(format!(
            "foreach: invalid variable type {:?} (expected slice or map)",
            type_name(other)
        ))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}

fn suffix(key: &Value) -> String {
    match key {
        Value::String(s) => format!("_{}", s),
        other => format!("_{}", other),
    }
}

impl Step for ForeachStep {
    fn kind(&self) -> &'static str {
        "foreach"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        let ctx = &self.base.ctx;
        ctx.require_engine()?;

        let entries = entries(self.iterable(vars)?)?;
        let mut child = ctx.child_with_commands(raw_commands(&self.commands))?;

        let key_var = or_default(&self.key_var, "key");
        let value_var = or_default(&self.value_var, "value");
        let parent_var = or_default(&self.parent_var, "parent");

        for (key, value) in entries {
            child.set_step_name_suffix(suffix(&key));

            let mut iteration = Variables::new();
            iteration.insert(parent_var.to_string(), Value::Object(vars.clone()));
            iteration.insert(key_var.to_string(), key);
            iteration.insert(value_var.to_string(), value);

            child
                .execute(&mut iteration)
                .map_err(|e| StepError::Nested(Box::new(e)))?;
        }

        Ok(())
    }
}
