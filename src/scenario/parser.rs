//! Scenario Parser
//!
//! Scenario documents are JSON or YAML. A document whose first
//! non-whitespace character is `{` is read as JSON; anything else is read
//! as YAML and normalized into the same JSON value tree.

use std::fs;
use std::path::Path;

use log::debug;
use serde_json::Value;

use super::model::RawScenario;
use crate::error::ScenarioError;
use crate::Variables;

/// Parses a JSON or YAML document into a JSON value.
pub fn to_json(data: &[u8]) -> Result<Value, ScenarioError> {
    let is_json = data
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(false, |b| *b == b'{');

    if is_json {
        Ok(serde_json::from_slice(data)?)
    } else {
        Ok(serde_yaml::from_slice(data)?)
    }
}

/// Parses scenario text into its raw step records.
pub fn parse_scenario(scenario: &str) -> Result<RawScenario, ScenarioError> {
    if scenario.trim().is_empty() {
        return Ok(RawScenario::default());
    }

    let value = to_json(scenario.as_bytes())?;

    // A YAML document holding only comments is empty too.
    if value.is_null() {
        return Ok(RawScenario::default());
    }

    Ok(serde_json::from_value(value)?)
}

/// Reads and parses a scenario file.
///
/// # Example
///
/// ```rust,no_run
/// use stepflow::scenario::load_scenario_file;
///
/// let scenario = load_scenario_file("deploy.yaml").unwrap();
/// println!("{} steps", scenario.len());
/// ```
pub fn load_scenario_file(path: impl AsRef<Path>) -> Result<RawScenario, ScenarioError> {
    let text = read_text(path.as_ref())?;
    let scenario = parse_scenario(&text)?;
    debug!("Loaded scenario {} ({} steps)", path.as_ref().display(), scenario.len());
    Ok(scenario)
}

/// Reads a JSON or YAML mapping of variables.
pub fn load_variables_file(path: impl AsRef<Path>) -> Result<Variables, ScenarioError> {
    let text = read_text(path.as_ref())?;
    if text.trim().is_empty() {
        return Ok(Variables::new());
    }

    match to_json(text.as_bytes())? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Variables::new()),
        other => Err(ScenarioError::Json(serde::de::Error::custom(format!(
            "variables file must contain a mapping, got {}",
            other
        )))),
    }
}

fn read_text(path: &Path) -> Result<String, ScenarioError> {
    fs::read_to_string(path).map_err(|source| ScenarioError::Read {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_to_json_detects_json() {
        let value = to_json(b"  \n{\"commands\": []}").unwrap();
        assert_eq!(value, json!({"commands": []}));
    }

    #[test]
    fn test_to_json_yaml() {
        let value = to_json(b"commands:\n  - type: message\n    stepName: hi\n").unwrap();
        assert_eq!(value, json!({"commands": [{"type": "message", "stepName": "hi"}]}));
    }

    #[test]
    fn test_yaml_flow_mapping_is_json_first() {
        // Leading `{` always takes the JSON path
        assert!(to_json(b"{commands: []}").is_err());
    }

    #[test]
    fn test_parse_scenario() {
        let scenario = parse_scenario(
            r#"
commands:
  - type: variable
    variable: x
    value: 1
  - cmd: [echo, hi]
"#,
        )
        .unwrap();

        assert_eq!(scenario.kinds(), vec!["variable", ""]);
        assert_eq!(scenario.commands[1]["cmd"], json!(["echo", "hi"]));
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(parse_scenario("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let err = parse_scenario("commands: [unclosed").unwrap_err();
        assert!(matches!(err, ScenarioError::Yaml(_)));
    }

    #[test]
    fn test_load_scenario_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "commands:\n  - type: message").unwrap();

        let scenario = load_scenario_file(file.path()).unwrap();
        assert_eq!(scenario.len(), 1);
    }

    #[test]
    fn test_load_scenario_file_not_found() {
        let err = load_scenario_file("/nonexistent/scenario.yaml").unwrap_err();
        assert!(matches!(err, ScenarioError::Read { .. }));
    }

    #[test]
    fn test_load_variables_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "host: db01\nport: 5432").unwrap();

        let vars = load_variables_file(file.path()).unwrap();
        assert_eq!(vars["host"], "db01");
        assert_eq!(vars["port"], 5432);
    }

    #[test]
    fn test_load_variables_file_rejects_list() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "- a\n- b").unwrap();

        assert!(load_variables_file(file.path()).is_err());
    }
}
