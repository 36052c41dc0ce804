//! Scenario Execution Engine
//!
//! The engine owns an ordered list of steps and runs them one at a time
//! against a caller-supplied namespace:
//! - `requires` conditions decide whether each step is skipped
//! - descriptions are interpolated and logged
//! - post-step hooks run after successful steps
//! - the first failure stops the run and is wrapped with step context
//!
//! Child engines created for loops, includes and nested command lists share
//! the parent's configuration through an [`Arc<EngineConfig>`].

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

use log::{debug, info, trace};
use serde_json::Value;

use super::context::{default_sleeper, ExecutionContext, Sleeper};
use super::registry::StepRegistry;
use super::step::{DebugInfo, Step};
use crate::error::{CommandAwareError, ScenarioError, StepError};
use crate::eval::condition::{default_functions, ConditionEvaluator, EvaluatorFunction};
use crate::eval::version::version_functions;
use crate::output::{shared, SharedWriter};
use crate::scenario::parse_scenario;
use crate::storage::{FileSystem, OsFs};
use crate::Variables;

/// A post-step hook, looked up by the step's `callsAfter` name.
pub type HookFn = Arc<dyn Fn(&mut Variables) -> Result<(), StepError> + Send + Sync>;

/// Hook table keyed by hook name.
pub type HooksAfter = HashMap<String, HookFn>;

/// Observer invoked before each step, skipped or not.
pub type BeforeStepCallback = Arc<dyn Fn(&dyn Step, &Variables) + Send + Sync>;

/// Configuration shared by an engine and all of its children.
pub struct EngineConfig {
    pub(crate) stdout: SharedWriter,
    pub(crate) stderr: SharedWriter,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) sleeper: Sleeper,
    pub(crate) registry: StepRegistry,
    pub(crate) hooks_after: HooksAfter,
    pub(crate) evaluator: ConditionEvaluator,
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hooks: Vec<&String> = self.hooks_after.keys().collect();
        hooks.sort();
        f.debug_struct("EngineConfig")
            .field("registry", &self.registry)
            .field("hooks_after", &hooks)
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

/// Scenario execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use stepflow::{Engine, Variables};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let engine = Engine::builder()
///         .with_default_evaluator_functions()
///         .with_hook_after("notify", |vars| {
///             vars.insert("notified".into(), true.into());
///             Ok(())
///         })
///         .build_with_scenario(
///             r#"
/// commands:
///   - type: exec
///     stepName: build
///     cmd: ["make", "all"]
///     requires: file_exists("Makefile")
///     callsAfter: notify
/// "#,
///         )?;
///
///     let mut vars = Variables::new();
///     engine.execute(&mut vars)?;
///     Ok(())
/// }
/// ```
pub struct Engine {
    config: Arc<EngineConfig>,
    steps: Vec<Box<dyn Step>>,
    step_name_suffix: String,
    before_step: Option<BeforeStepCallback>,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("steps", &self.steps.len())
            .field("step_name_suffix", &self.step_name_suffix)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// An empty engine with the built-in registry and default sinks.
    pub fn new() -> Self {
        EngineBuilder::new().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub(crate) fn from_config(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            steps: Vec::new(),
            step_name_suffix: String::new(),
            before_step: None,
        }
    }

    /// Parses a scenario document and appends its steps.
    ///
    /// Each step record's `type` is resolved through the registry; the
    /// first unknown or malformed record aborts the load and leaves the
    /// engine's step list unchanged.
    pub fn append_scenario(&mut self, scenario: &str) -> Result<(), ScenarioError> {
        let raw = parse_scenario(scenario)?;
        self.append_commands(&raw.commands)
    }

    /// Appends steps built from raw step records.
    pub fn append_commands(&mut self, commands: &[Value]) -> Result<(), ScenarioError> {
        let ctx = ExecutionContext::for_engine(&self.config);

        let steps = commands
            .iter()
            .enumerate()
            .map(|(index, raw)| self.instantiate(&ctx, index + 1, raw))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Loaded {} step(s)", steps.len());
        self.steps.extend(steps);
        Ok(())
    }

    fn instantiate(
        &self,
        ctx: &ExecutionContext,
        id: usize,
        raw: &Value,
    ) -> Result<Box<dyn Step>, ScenarioError> {
        let kind = match raw.get("type") {
            None | Some(Value::Null) => "",
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => return Err(ScenarioError::InvalidCommandType(other.to_string())),
        };

        let factory = self
            .config
            .registry
            .get(kind)
            .ok_or_else(|| ScenarioError::InvalidCommandType(kind.to_string()))?;

        let mut step = factory(ctx, raw).map_err(|source| ScenarioError::InvalidCommand {
            id,
            kind: kind.to_string(),
            source,
        })?;

        step.set_debug_info(DebugInfo {
            id,
            contents: raw.to_string(),
        });

        Ok(step)
    }

    /// Runs every step in order against `vars`.
    ///
    /// Stops at the first failure. The returned error names the failing step
    /// and carries a snapshot of the namespace at that point; failures from
    /// nested engines are returned as they were wrapped there.
    pub fn execute(&self, vars: &mut Variables) -> Result<(), CommandAwareError> {
        for step in &self.steps {
            let step = step.as_ref();

            if let Some(callback) = &self.before_step {
                callback(step, vars);
            }

            let step_name = format!("{}{}", step.step_name(), self.step_name_suffix);

            let skip = match self.check_requires(step, vars) {
                Ok(skip) => skip,
                Err(e) => return Err(wrap(e, step, &step_name, vars)),
            };

            vars.insert(format!("__step:{}:skipped", step_name), Value::Bool(skip));
            if skip {
                continue;
            }

            let description = step.description(vars);
            if !description.is_empty() {
                info!("{}", description);
            }

            if let Err(e) = step.execute(vars) {
                return Err(wrap(e, step, &step_name, vars));
            }

            let hook_name = step.calls_after();
            if hook_name.is_empty() {
                continue;
            }

            if let Some(hook) = self.config.hooks_after.get(hook_name) {
                if let Err(e) = hook(vars) {
                    return Err(wrap(e, step, &step_name, vars));
                }
            }
        }

        Ok(())
    }

    /// Returns `Ok(true)` when the step must be skipped.
    fn check_requires(&self, step: &dyn Step, vars: &mut Variables) -> Result<bool, StepError> {
        let requires = step.requires();
        if requires.is_empty() {
            return Ok(false);
        }

        if self.config.evaluator.evaluate(requires, vars)? {
            return Ok(false);
        }

        let name = step.step_name();
        trace!("requirements not met, skipping {:?}", name);
        vars.insert(name, Value::Null);
        Ok(true)
    }

    /// Sets the observer called before each step.
    pub fn set_before_step<F>(&mut self, callback: F) -> &mut Self
    where
        F: Fn(&dyn Step, &Variables) + Send + Sync + 'static,
    {
        self.before_step = Some(Arc::new(callback));
        self
    }

    /// Sets the suffix appended to every step name in skip flags and errors.
    pub fn set_step_name_suffix(&mut self, suffix: impl Into<String>) -> &mut Self {
        self.step_name_suffix = suffix.into();
        self
    }

    /// A child engine over `scenario` sharing this engine's configuration.
    pub fn with_scenario(&self, scenario: &str) -> Result<Engine, ScenarioError> {
        let mut child = Engine::from_config(Arc::clone(&self.config));
        child.append_scenario(scenario)?;
        Ok(child)
    }

    /// A child engine over raw step records sharing this engine's
    /// configuration.
    pub fn with_commands(&self, commands: &[Value]) -> Result<Engine, ScenarioError> {
        let mut child = Engine::from_config(Arc::clone(&self.config));
        child.append_commands(commands)?;
        Ok(child)
    }

    /// The context handed to steps built by this engine.
    pub fn context(&self) -> ExecutionContext {
        ExecutionContext::for_engine(&self.config)
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.config.registry
    }

    pub fn steps(&self) -> &[Box<dyn Step>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn wrap(cause: StepError, step: &dyn Step, step_name: &str, vars: &Variables) -> CommandAwareError {
    match cause {
        StepError::Nested(inner) => *inner,
        cause => CommandAwareError::new(cause, step.summary(step_name), vars.clone()),
    }
}

/// Builder for [`Engine`].
///
/// Unset options fall back to the process's standard streams, the host
/// filesystem, [`StepRegistry::builtin`] and a real sleep.
#[derive(Default)]
pub struct EngineBuilder {
    stdout: Option<SharedWriter>,
    stderr: Option<SharedWriter>,
    fs: Option<Arc<dyn FileSystem>>,
    sleeper: Option<Sleeper>,
    registry: Option<StepRegistry>,
    hooks_after: HooksAfter,
    evaluator_functions: HashMap<String, EvaluatorFunction>,
    default_evaluator_functions: bool,
    version_functions: bool,
    step_name_suffix: String,
    before_step: Option<BeforeStepCallback>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stdout<W: Write + Send + 'static>(mut self, stdout: W) -> Self {
        self.stdout = Some(shared(stdout));
        self
    }

    pub fn with_stderr<W: Write + Send + 'static>(mut self, stderr: W) -> Self {
        self.stderr = Some(shared(stderr));
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    /// Replaces the whole step registry.
    pub fn with_registry(mut self, registry: StepRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_hook_after<F>(mut self, name: impl Into<String>, hook: F) -> Self
    where
        F: Fn(&mut Variables) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.hooks_after.insert(name.into(), Arc::new(hook));
        self
    }

    pub fn with_hooks_after(mut self, hooks: HooksAfter) -> Self {
        self.hooks_after.extend(hooks);
        self
    }

    /// Registers a function callable from `requires` expressions.
    pub fn with_evaluator_function<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.evaluator_functions.insert(name.into(), Arc::new(function));
        self
    }

    /// Enables `file_exists`, `strlen` and `shell_escape` in `requires`
    /// expressions. `file_exists` checks the engine's filesystem.
    pub fn with_default_evaluator_functions(mut self) -> Self {
        self.default_evaluator_functions = true;
        self
    }

    /// Enables `version_lt`, `version_lte`, `version_gt`, `version_gte` and
    /// `version_eq` in `requires` expressions.
    pub fn with_version_functions(mut self) -> Self {
        self.version_functions = true;
        self
    }

    pub fn with_sleeper<F>(mut self, sleeper: F) -> Self
    where
        F: Fn(std::time::Duration) + Send + Sync + 'static,
    {
        self.sleeper = Some(Arc::new(sleeper));
        self
    }

    pub fn with_step_name_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.step_name_suffix = suffix.into();
        self
    }

    pub fn with_before_step<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Step, &Variables) + Send + Sync + 'static,
    {
        self.before_step = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> Engine {
        let fs = self.fs.unwrap_or_else(|| Arc::new(OsFs));

        let mut evaluator = ConditionEvaluator::new();
        if self.default_evaluator_functions {
            evaluator.extend(default_functions(Arc::clone(&fs)));
        }
        if self.version_functions {
            evaluator.extend(version_functions());
        }
        evaluator.extend(self.evaluator_functions);

        let config = EngineConfig {
            stdout: self.stdout.unwrap_or_else(|| shared(std::io::stdout())),
            stderr: self.stderr.unwrap_or_else(|| shared(std::io::stderr())),
            fs,
            sleeper: self.sleeper.unwrap_or_else(default_sleeper),
            registry: self.registry.unwrap_or_else(StepRegistry::builtin),
            hooks_after: self.hooks_after,
            evaluator,
        };

        Engine {
            config: Arc::new(config),
            steps: Vec::new(),
            step_name_suffix: self.step_name_suffix,
            before_step: self.before_step,
        }
    }

    /// Builds the engine and loads `scenario` into it.
    pub fn build_with_scenario(self, scenario: &str) -> Result<Engine, ScenarioError> {
        let mut engine = self.build();
        engine.append_scenario(scenario)?;
        Ok(engine)
    }
}
