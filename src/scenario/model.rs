//! Scenario Document Model

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A scenario as loaded: the ordered, not-yet-typed step records.
///
/// Each record is resolved into a concrete step by the engine's registry
/// using its `type` field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawScenario {
    #[serde(default)]
    pub commands: Vec<Value>,
}

impl RawScenario {
    pub fn new(commands: Vec<Value>) -> Self {
        Self { commands }
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Declared kinds in order; a missing `type` reads as `""`.
    pub fn kinds(&self) -> Vec<&str> {
        self.commands
            .iter()
            .map(|raw| raw.get("type").and_then(Value::as_str).unwrap_or(""))
            .collect()
    }
}
