//! Stepflow - Scenario Execution Engine
//!
//! An embeddable automation engine that runs a declarative list of typed
//! steps (a scenario) against a mutable variable namespace. Scenarios can
//! branch on conditions, loop over collections, include other scenarios,
//! retry failing commands and drive remote hosts over a secure-shell
//! transport.
//!
//! # Architecture
//!
//! - [`execution`]: the engine, the step contract, the step registry and
//!   the execution context shared by every step
//! - [`eval`]: template interpolation and `requires` condition evaluation
//! - [`steps`]: built-in step kinds, including the control-flow steps and
//!   the retry/failure-hook convention
//! - [`remote`]: remote execution and the remote copy protocol client
//! - [`scenario`]: scenario document parsing (JSON or YAML)
//! - [`storage`]: filesystem abstraction used by steps and includes
//! - [`output`]: shared output sinks and capture buffers
//!
//! # Example
//!
//! ```rust,no_run
//! use stepflow::{Engine, Variables};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scenario = r#"
//! commands:
//!   - type: variable
//!     stepName: greet
//!     variable: greeting
//!     value: "hello {{ .name }}"
//! "#;
//!
//!     let engine = Engine::builder().build_with_scenario(scenario)?;
//!
//!     let mut vars = Variables::new();
//!     vars.insert("name".into(), "world".into());
//!     engine.execute(&mut vars)?;
//!
//!     assert_eq!(vars["greeting"], "hello world");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod eval;
pub mod execution;
pub mod output;
pub mod remote;
pub mod scenario;
pub mod steps;
pub mod storage;

// Re-export commonly used types
pub use error::{CommandAwareError, ScenarioError, StepError};
pub use eval::template::{maybe_eval_value, register_value_function, unregister_value_function};
pub use execution::{Engine, EngineBuilder, ExecutionContext, Step, StepRegistry};

/// The variable namespace steps read and write.
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "Stepflow";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_app_name() {
        assert_eq!(APP_NAME, "Stepflow");
    }

    #[test]
    fn test_end_to_end_variable_scenario() {
        let scenario = r#"{"commands":[{"type":"variable","stepName":"s1","variable":"x","value":"{{ .y }}"}]}"#;
        let engine = Engine::builder().build_with_scenario(scenario).unwrap();

        let mut vars = Variables::new();
        vars.insert("y".into(), "hello".into());
        engine.execute(&mut vars).unwrap();

        assert_eq!(vars["x"], "hello");
        assert_eq!(vars["__step:s1:skipped"], false);
    }
}
