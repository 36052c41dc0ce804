//! `message`: a step whose only effect is its logged description.

use serde::Deserialize;

use crate::error::StepError;
use crate::execution::{Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageStep {
    #[serde(flatten)]
    pub base: StepBase,
}

impl Step for MessageStep {
    fn kind(&self) -> &'static str {
        "message"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, _vars: &mut Variables) -> Result<(), StepError> {
        Ok(())
    }
}
