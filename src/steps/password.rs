//! `password`: stores a random secret in the namespace.

use rand::Rng;
use serde::Deserialize;

use crate::error::StepError;
use crate::execution::{Step, StepBase};
use crate::Variables;

const DEFAULT_CHARSET: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MIN_LENGTH: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PasswordStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub variable: String,
    /// Raised to 8 when shorter
    pub length: usize,
    /// Characters to draw from; alphanumeric when empty
    pub charset: String,
}

impl Step for PasswordStep {
    fn kind(&self) -> &'static str {
        "password"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        if self.variable.is_empty() {
            return Err(StepError::definition("password: variable name cannot be empty"));
        }

        let charset = if self.charset.is_empty() {
            DEFAULT_CHARSET
        } else {
            self.charset.as_str()
        };

        let password = generate(self.length.max(MIN_LENGTH), charset);
        vars.insert(self.variable.clone(), password.into());
        Ok(())
    }
}

fn generate(length: usize, charset: &str) -> String {
    let chars: Vec<char> = charset.chars().collect();
    let mut rng = rand::rng();

    (0..length)
        .map(|_| chars[rng.random_range(0..chars.len())])
        .collect()
}
