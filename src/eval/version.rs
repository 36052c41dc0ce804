//! Version Comparison Helpers
//!
//! Optional `requires` helpers comparing two version strings:
//! `version_lt`, `version_lte`, `version_gt`, `version_gte` and
//! `version_eq`.
//!
//! Versions are parsed with `semver` after light normalisation, so `1.4`,
//! `v1.4` and `1.4.0` are all the same version.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use semver::Version;
use serde_json::Value;

use super::condition::EvaluatorFunction;

/// Message fragment for an argument that is not a valid version.
pub const INVALID_VERSION: &str = "must be a valid version";

/// The `version_*` helpers, ready for [`ConditionEvaluator::extend`].
///
/// [`ConditionEvaluator::extend`]: super::ConditionEvaluator::extend
pub fn version_functions() -> HashMap<String, EvaluatorFunction> {
    let table: [(&str, fn(Ordering) -> bool); 5] = [
        ("version_lt", Ordering::is_lt),
        ("version_lte", Ordering::is_le),
        ("version_gt", Ordering::is_gt),
        ("version_gte", Ordering::is_ge),
        ("version_eq", Ordering::is_eq),
    ];

    table
        .into_iter()
        .map(|(name, accept)| {
            let function: EvaluatorFunction = Arc::new(move |args: &[Value]| {
                let (v1, v2) = parse_args(name, args)?;
                Ok(Value::Bool(accept(v1.cmp_precedence(&v2))))
            });
            (name.to_string(), function)
        })
        .collect()
}

fn parse_args(name: &str, args: &[Value]) -> Result<(Version, Version), String> {
    let [first, second] = args else {
        return Err(format!("{}: invalid number of arguments", name));
    };
    Ok((parse_arg(name, 1, first)?, parse_arg(name, 2, second)?))
}

fn parse_arg(name: &str, position: usize, arg: &Value) -> Result<Version, String> {
    let Value::String(text) = arg else {
        return Err(format!("{}: argument {} must be string", name, position));
    };
    parse_version(text)
        .map_err(|e| format!("{}: argument {} {}: {}", name, position, INVALID_VERSION, e))
}

/// Parses `text`, padding a short numeric core (`1`, `1.4`) to three parts.
pub fn parse_version(text: &str) -> Result<Version, semver::Error> {
    let text = text.trim();
    let text = text.strip_prefix(['v', 'V']).unwrap_or(text);

    let split = text.find(['-', '+']).unwrap_or(text.len());
    let (core, rest) = text.split_at(split);

    let parts = core.split('.').count();
    let padding = if parts < 3 { ".0".repeat(3 - parts) } else { String::new() };

    Version::parse(&format!("{}{}{}", core, padding, rest))
}
