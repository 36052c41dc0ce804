//! `sleep`: pauses for a number of seconds through the engine's sleeper.

use std::time::Duration;

use log::info;
use serde::Deserialize;

use crate::error::StepError;
use crate::execution::{Step, StepBase};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SleepStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub seconds: u64,
}

impl Step for SleepStep {
    fn kind(&self) -> &'static str {
        "sleep"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, _vars: &mut Variables) -> Result<(), StepError> {
        info!("Sleeping for {} seconds", self.seconds);
        self.base.ctx.sleep(Duration::from_secs(self.seconds));
        Ok(())
    }
}
