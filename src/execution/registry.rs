//! Step Registry
//!
//! Maps a step record's `type` to a factory that builds the concrete step.
//! Registries are plain values passed to the engine builder; there is no
//! global registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::context::ExecutionContext;
use super::step::Step;
use crate::steps::{
    ExecStep, ForeachStep, MessageStep, PasswordStep, SleepStep, SubExecuteStep, VariableStep,
    WriteFileStep,
};

/// Builds a step from its raw record, bound to the given context.
pub type StepFactory =
    Arc<dyn Fn(&ExecutionContext, &Value) -> Result<Box<dyn Step>, serde_json::Error> + Send + Sync>;

/// A factory that deserializes the record into `T` and binds the context.
pub fn factory_for<T>() -> StepFactory
where
    T: Step + DeserializeOwned + 'static,
{
    Arc::new(|ctx: &ExecutionContext, raw: &Value| -> Result<Box<dyn Step>, serde_json::Error> {
        let mut step: T = serde_json::from_value(raw.clone())?;
        step.base_mut().ctx = ctx.clone();
        Ok(Box::new(step) as Box<dyn Step>)
    })
}

#[derive(Clone, Default)]
pub struct StepRegistry {
    factories: HashMap<String, StepFactory>,
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl StepRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry of built-in local step kinds.
    ///
    /// `include`, `ssh_exec` and `scp_writefile` need collaborators (a
    /// storage, a connection) and are registered by the caller.
    pub fn builtin() -> Self {
        Self::new()
            .with("message", factory_for::<MessageStep>())
            .with("variable", factory_for::<VariableStep>())
            .with("sleep", factory_for::<SleepStep>())
            .with("password", factory_for::<PasswordStep>())
            .with("writefile", factory_for::<WriteFileStep>())
            .with("", factory_for::<ExecStep>())
            .with("exec", factory_for::<ExecStep>())
            .with("foreach", factory_for::<ForeachStep>())
            .with("repeat_for", factory_for::<ForeachStep>())
            .with("commands", factory_for::<SubExecuteStep>())
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: StepFactory) {
        self.factories.insert(kind.into(), factory);
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(mut self, kind: impl Into<String>, factory: StepFactory) -> Self {
        self.register(kind, factory);
        self
    }

    pub fn remove(&mut self, kind: &str) -> Option<StepFactory> {
        self.factories.remove(kind)
    }

    pub fn get(&self, kind: &str) -> Option<&StepFactory> {
        self.factories.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
