//! `writefile`: writes interpolated contents through the engine filesystem.

use log::debug;
use serde::Deserialize;

use crate::error::StepError;
use crate::eval::eval_string;
use crate::execution::{Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteFileStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub file: String,
    pub contents: String,
}

impl Step for WriteFileStep {
    fn kind(&self) -> &'static str {
        "writefile"
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

        let contents = eval_string(&self.contents, vars);

        debug!("Writing to {}", self.file);
        self.base.ctx.fs().write_file(&self.file, contents.as_bytes())?;
        Ok(())
    }
}
