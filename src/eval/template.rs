//! Value Templates
//!
//! Best-effort interpolation of namespace values into strings, backed by
//! Tera. Templates may use dot-style actions (`{{ .name }}`,
//! `{{ index . "key" }}`, `{{ if .flag }}...{{ end }}`, see
//! [`actions`](super::actions)) or plain Tera (`{{ name }}`,
//! `{% if flag %}`); dot-style actions are translated before rendering.
//!
//! Evaluation never fails: a template that does not parse or render is
//! returned as the literal string it was given.
//!
//! Helper functions for templates live in a process-wide table (see
//! [`register_value_function`]), separate from the per-engine functions
//! used by `requires` conditions.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use log::trace;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;
use tera::{Context, Tera};

use super::actions::{Translator, ROOT};
use super::shell::shell_escape;
use crate::Variables;

/// A helper callable from templates as a filter: `{{ value | name(arg=..) }}`.
pub type ValueFunction = Arc<dyn Fn(&Value, &HashMap<String, Value>) -> Value + Send + Sync>;

static VALUE_FUNCTIONS: Lazy<RwLock<HashMap<String, ValueFunction>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// One `{{ ... }}` or `{% ... %}` tag.
static TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{\{.*?\}\}|\{%.*?%\}").expect("Invalid template tag regex"));

/// A leading-dot variable reference inside a tag Tera will read as-is.
static DOT_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(^|[\s{(\[|,=!<>+*/%-])\.([A-Za-z_])").expect("Invalid dot reference regex")
});

const TEMPLATE_NAME: &str = "value";

/// Registers a process-wide template helper under `name`.
///
/// Replaces any helper previously registered with the same name.
pub fn register_value_function<F>(name: impl Into<String>, function: F)
where
    F: Fn(&Value, &HashMap<String, Value>) -> Value + Send + Sync + 'static,
{
    VALUE_FUNCTIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .insert(name.into(), Arc::new(function));
}

/// Removes a process-wide template helper. Returns whether it existed.
pub fn unregister_value_function(name: &str) -> bool {
    VALUE_FUNCTIONS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(name)
        .is_some()
}

/// Interpolates `value` against `vars` if it is a string template.
///
/// Non-string values come back unchanged, as do strings that fail to parse
/// or render.
pub fn maybe_eval_value(value: &Value, vars: &Variables) -> Value {
    match value {
        Value::String(text) => Value::String(eval_string(text, vars)),
        other => other.clone(),
    }
}

/// String form of [`maybe_eval_value`].
pub fn eval_string(text: &str, vars: &Variables) -> String {
    if !looks_like_template(text) {
        return text.to_string();
    }

    match render(text, vars) {
        Ok(rendered) => rendered,
        Err(e) => {
            trace!("Template left as literal text: {}", e);
            text.to_string()
        }
    }
}

fn looks_like_template(text: &str) -> bool {
    text.contains("{{") || text.contains("{%") || text.contains("{#")
}

fn render(text: &str, vars: &Variables) -> tera::Result<String> {
    let mut tera = Tera::default();
    tera.register_filter("shell_escape", shell_escape_filter);

    let functions = VALUE_FUNCTIONS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let mut filter_names: HashSet<&str> = functions.keys().map(String::as_str).collect();
    filter_names.insert("shell_escape");

    for (name, function) in &functions {
        let function = Arc::clone(function);
        tera.register_filter(
            name,
            move |value: &Value, args: &HashMap<String, Value>| -> tera::Result<Value> {
                Ok(function(value, args))
            },
        );
    }

    let source = normalize(text, &filter_names);
    tera.add_raw_template(TEMPLATE_NAME, &source)?;

    let mut context = Context::from_serialize(vars)?;
    context.insert(ROOT, vars);
    tera.render(TEMPLATE_NAME, &context)
}

fn shell_escape_filter(value: &Value, _args: &HashMap<String, Value>) -> tera::Result<Value> {
    let escaped = match value {
        Value::String(s) => shell_escape(s),
        other => shell_escape(&other.to_string()),
    };
    Ok(Value::String(escaped))
}

/// Translates dot-style actions into Tera, one tag at a time. Tags that
/// are already Tera only get their leading-dot references stripped.
fn normalize(text: &str, filters: &HashSet<&str>) -> String {
    let mut translator = Translator::new(filters);

    TAG_RE
        .replace_all(text, |caps: &Captures| {
            let tag = &caps[0];
            if tag.starts_with("{{") {
                if let Some(translated) = translator.translate(tag) {
                    return translated;
                }
            }
            DOT_REF_RE.replace_all(tag, "${1}${2}").into_owned()
        })
        .into_owned()
}
