//! Scenario Documents
//!
//! # Structure
//!
//! - [`model`]: the raw scenario (untyped step records)
//! - [`parser`]: JSON/YAML loading and normalization

pub mod model;
pub mod parser;

pub use model::RawScenario;
pub use parser::{load_scenario_file, load_variables_file, parse_scenario, to_json};
