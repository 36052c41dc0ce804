//! Condition Evaluation
//!
//! Evaluates `requires` expressions with Rhai. Every namespace entry is
//! visible as a variable, and per-engine helper functions are callable by
//! name. The expression must produce a boolean.
//!
//! String literals may be written with single or double quotes;
//! single-quoted ones are rewritten to double quotes before parsing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use serde_json::Value;

use super::shell::shell_escape;
use crate::error::StepError;
use crate::storage::FileSystem;
use crate::Variables;

/// A helper callable from `requires` expressions.
///
/// Arity and argument types are validated by the function itself; an
/// `Err` aborts the evaluation with that message.
pub type EvaluatorFunction = Arc<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

/// Boolean expression evaluator with a set of named helper functions.
#[derive(Clone, Default)]
pub struct ConditionEvaluator {
    functions: HashMap<String, EvaluatorFunction>,
}

impl fmt::Debug for ConditionEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.functions.keys().collect();
        names.sort();
        f.debug_struct("ConditionEvaluator")
            .field("functions", &names)
            .finish()
    }
}

impl ConditionEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, function: EvaluatorFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn extend(&mut self, functions: HashMap<String, EvaluatorFunction>) {
        self.functions.extend(functions);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Evaluates `expression` against `vars`.
    ///
    /// # Errors
    ///
    /// * [`StepError::Evaluation`] - the expression did not parse or failed
    ///   at runtime (unknown variable, unknown function, helper error)
    /// * [`StepError::Definition`] - the result was not a boolean
    pub fn evaluate(&self, expression: &str, vars: &Variables) -> Result<bool, StepError> {
        let engine = self.build_engine();

        let mut scope = Scope::new();
        for (name, value) in vars {
            let value = rhai::serde::to_dynamic(value).map_err(|e| {
                StepError::Evaluation(format!("unable to expose variable {:?}: {}", name, e))
            })?;
            scope.push_dynamic(name.as_str(), value);
        }

        let source = double_quote_strings(expression);
        let result = engine
            .eval_expression_with_scope::<Dynamic>(&mut scope, &source)
            .map_err(|e| StepError::Evaluation(format!("unable to evaluate {:?}: {}", expression, e)))?;

        result.as_bool().map_err(|type_name| {
            StepError::definition(format!("requires return type must be bool, got {}", type_name))
        })
    }

    fn build_engine(&self) -> Engine {
        let mut engine = Engine::new();

        for (name, function) in &self.functions {
            let f = Arc::clone(function);
            engine.register_fn(name.as_str(), move || call(&f, &[]));

            let f = Arc::clone(function);
            engine.register_fn(name.as_str(), move |a: Dynamic| call(&f, &[a]));

            let f = Arc::clone(function);
            engine.register_fn(name.as_str(), move |a: Dynamic, b: Dynamic| call(&f, &[a, b]));

            let f = Arc::clone(function);
            engine.register_fn(name.as_str(), move |a: Dynamic, b: Dynamic, c: Dynamic| {
                call(&f, &[a, b, c])
            });

            let f = Arc::clone(function);
            engine.register_fn(
                name.as_str(),
                move |a: Dynamic, b: Dynamic, c: Dynamic, d: Dynamic| call(&f, &[a, b, c, d]),
            );
        }

        engine
    }
}

/// Rewrites `'...'` literals as `"..."`, leaving double-quoted and
/// backtick strings untouched.
fn double_quote_strings(expression: &str) -> String {
    let mut out = String::with_capacity(expression.len());
    let mut chars = expression.chars();
    let mut open: Option<char> = None;

    while let Some(c) = chars.next() {
        match (open, c) {
            (Some(_), '\\') => {
                let next = chars.next();
                match (open, next) {
                    (Some('\''), Some('\'')) => out.push('\''),
                    (_, Some(next)) => {
                        out.push(c);
                        out.push(next);
                    }
                    (_, None) => out.push(c),
                }
            }
            (Some(quote), _) if c == quote => {
                open = None;
                out.push(if quote == '\'' { '"' } else { c });
            }
            (Some('\''), '"') => out.push_str("\\\""),
            (Some(_), _) => out.push(c),
            (None, '"' | '`') => {
                open = Some(c);
                out.push(c);
            }
            (None, '\'') => {
                open = Some(c);
                out.push('"');
            }
            (None, _) => out.push(c),
        }
    }

    out
}

fn call(function: &EvaluatorFunction, args: &[Dynamic]) -> Result<Dynamic, Box<EvalAltResult>> {
    let args = args
        .iter()
        .map(|arg| rhai::serde::from_dynamic::<Value>(arg))
        .collect::<Result<Vec<_>, _>>()?;

    let result = function(&args).map_err(runtime_error)?;
    rhai::serde::to_dynamic(result)
}

fn runtime_error(message: String) -> Box<EvalAltResult> {
    EvalAltResult::ErrorRuntime(message.into(), Position::NONE).into()
}

/// The optional built-in helpers: `file_exists(path)`, `strlen(s)` and
/// `shell_escape(s)`.
pub fn default_functions(fs: Arc<dyn FileSystem>) -> HashMap<String, EvaluatorFunction> {
    let mut functions: HashMap<String, EvaluatorFunction> = HashMap::new();

    functions.insert(
        "file_exists".to_string(),
        Arc::new(move |args: &[Value]| {
            let path = single_string_arg("file_exists", args)?;
            fs.exists(path)
                .map(Value::Bool)
                .map_err(|e| format!("file_exists: {}", e))
        }),
    );

    functions.insert(
        "strlen".to_string(),
        Arc::new(|args: &[Value]| {
            let s = single_string_arg("strlen", args)?;
            Ok(Value::from(s.len()))
        }),
    );

    functions.insert(
        "shell_escape".to_string(),
        Arc::new(|args: &[Value]| {
            let s = single_string_arg("shell_escape", args)?;
            Ok(Value::String(shell_escape(s)))
        }),
    );

    functions
}

fn single_string_arg<'a>(name: &str, args: &'a [Value]) -> Result<&'a str, String> {
    match args {
        [Value::String(s)] => Ok(s),
        [_] => Err(format!("{}: invalid argument type, expected string", name)),
        _ => Err(format!("{}: invalid number of arguments", name)),
    }
}
