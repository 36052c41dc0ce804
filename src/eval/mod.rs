//! Expression Evaluation
//!
//! # Architecture
//!
//! - [`template`]: fail-open string interpolation over the namespace
//! - [`actions`]: dot-style template actions translated into Tera
//! - [`condition`]: boolean `requires` expressions with pluggable helpers
//! - [`shell`]: POSIX argument quoting shared by both
//! - [`version`]: optional version comparison helpers for conditions

pub mod actions;
pub mod condition;
pub mod shell;
pub mod template;
pub mod version;

pub use condition::{default_functions, ConditionEvaluator, EvaluatorFunction};
pub use shell::{escape_args, shell_escape};
pub use template::{eval_string, maybe_eval_value, ValueFunction};
pub use version::version_functions;
