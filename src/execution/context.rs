//! Execution Context
//!
//! The read-mostly configuration handed to every step when it is built:
//! output sinks, the filesystem, the sleep function and, when the step was
//! created by an engine, the capability to spawn child engines.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use super::engine::{Engine, EngineConfig};
use crate::error::StepError;
use crate::output::{shared, SharedWriter};
use crate::storage::{FileSystem, OsFs};

/// Pauses the current thread. Tests replace it to observe retry delays.
pub type Sleeper = Arc<dyn Fn(Duration) + Send + Sync>;

pub(crate) fn default_sleeper() -> Sleeper {
    Arc::new(thread::sleep)
}

#[derive(Clone)]
pub struct ExecutionContext {
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) stdout: SharedWriter,
    pub(crate) stderr: SharedWriter,
    pub(crate) sleeper: Sleeper,
    pub(crate) engine: Option<Arc<EngineConfig>>,
}

impl Default for ExecutionContext {
    /// A context with no owning engine, writing to the process's standard
    /// streams and the host filesystem.
    fn default() -> Self {
        Self {
            fs: Arc::new(OsFs),
            stdout: shared(io::stdout()),
            stderr: shared(io::stderr()),
            sleeper: default_sleeper(),
            engine: None,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("has_engine", &self.engine.is_some())
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    pub(crate) fn for_engine(config: &Arc<EngineConfig>) -> Self {
        Self {
            fs: Arc::clone(&config.fs),
            stdout: Arc::clone(&config.stdout),
            stderr: Arc::clone(&config.stderr),
            sleeper: Arc::clone(&config.sleeper),
            engine: Some(Arc::clone(config)),
        }
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn stdout(&self) -> &SharedWriter {
        &self.stdout
    }

    pub fn stderr(&self) -> &SharedWriter {
        &self.stderr
    }

    pub fn sleep(&self, duration: Duration) {
        (self.sleeper)(duration)
    }

    /// Whether steps built with this context can spawn child engines.
    pub fn has_engine(&self) -> bool {
        self.engine.is_some()
    }

    /// Fails unless this context belongs to an engine.
    pub fn require_engine(&self) -> Result<(), StepError> {
        self.owning_engine().map(|_| ())
    }

    fn owning_engine(&self) -> Result<&Arc<EngineConfig>, StepError> {
        self.engine
            .as_ref()
            .ok_or_else(|| StepError::definition("this command must be run from the executor"))
    }

    /// Builds a child engine from scenario text, inheriting this context's
    /// engine configuration.
    pub fn child_with_scenario(&self, scenario: &str) -> Result<Engine, StepError> {
        let config = self.owning_engine()?;
        let mut child = Engine::from_config(Arc::clone(config));
        child.append_scenario(scenario)?;
        Ok(child)
    }

    /// Builds a child engine from raw step records.
    pub fn child_with_commands(&self, commands: &[Value]) -> Result<Engine, StepError> {
        let config = self.owning_engine()?;
        let mut child = Engine::from_config(Arc::clone(config));
        child.append_commands(commands)?;
        Ok(child)
    }

    /// Re-serializes `commands` into a scenario document.
    pub(crate) fn scenario_document(commands: &[Value]) -> Result<String, StepError> {
        serde_json::to_string(&json!({ "commands": commands }))
            .map_err(|e| StepError::Scenario(e.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detached_context_cannot_spawn() {
        let ctx = ExecutionContext::default();
        assert!(!ctx.has_engine());

        let err = ctx.child_with_commands(&[json!({"type": "message"})]).unwrap_err();
        assert_eq!(err.to_string(), "this command must be run from the executor");

        let err = ctx.child_with_scenario("commands: []").unwrap_err();
        assert!(matches!(err, StepError::Definition(_)));
    }

    #[test]
    fn test_scenario_document() {
        let doc = ExecutionContext::scenario_document(&[json!({"type": "message"})]).unwrap();
        assert_eq!(doc, r#"{"commands":[{"type":"message"}]}"#);
    }

    #[test]
    fn test_custom_sleeper() {
        use std::sync::Mutex;

        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let ctx = ExecutionContext {
            sleeper: Arc::new(move |d: Duration| recorded.lock().unwrap().push(d)),
            ..ExecutionContext::default()
        };

        ctx.sleep(Duration::from_secs(3));
        assert_eq!(*calls.lock().unwrap(), vec![Duration::from_secs(3)]);
    }
}
