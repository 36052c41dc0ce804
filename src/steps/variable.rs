//! `variable`: sets one namespace entry to an interpolated value.

use serde::Deserialize;
use serde_json::Value;

use crate::error::StepError;
use crate::eval::maybe_eval_value;
use crate::execution::{Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VariableStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub variable: String,
    pub value: Value,
}

impl Step for VariableStep {
    fn kind(&self) -> &'static str {
        "variable"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        if self.variable.is_empty() {
            return Err(StepError::definition("variable: variable name cannot be empty"));
        }

        let value = maybe_eval_value(&self.value, vars);
        vars.insert(self.variable.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(raw: Value) -> VariableStep {
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_sets_interpolated_string() {
        let mut vars = Variables::new();
        vars.insert("user".into(), "admin".into());

        step(json!({"variable": "home", "value": "/home/{{ .user }}"}))
            .execute(&mut vars)
            .unwrap();

        assert_eq!(vars["home"], "/home/admin");
    }

    #[test]
    fn test_non_string_values_kept() {
        let mut vars = Variables::new();
        step(json!({"variable": "ports", "value": [22, 80]}))
            .execute(&mut vars)
            .unwrap();

        assert_eq!(vars["ports"], json!([22, 80]));
    }

    #[test]
    fn test_empty_name_is_error() {
        let err = step(json!({"value": 1})).execute(&mut Variables::new()).unwrap_err();
        assert_eq!(err.to_string(), "variable: variable name cannot be empty");
    }
}
