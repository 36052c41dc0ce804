//! `scp_writefile`: writes a file on the remote host.
//!
//! Contents come from, in order of precedence, a namespace variable
//! (`contentsFromVariable`), a local file read through the engine's
//! filesystem (`contentsFromFile`) or the inline `contents` template.

use std::sync::Arc;
use std::time::Duration;

use log::debug;
use serde::Deserialize;
use serde_json::Value;

use super::scp::Client;
use super::session::Connection;
use crate::error::StepError;
use crate::eval::eval_string;
use crate::execution::{ExecutionContext, Step, StepBase, StepFactory};
use crate::Variables;

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScpWriteFileStep {
    #[serde(flatten)]
    pub base: StepBase,
    /// Remote path, a template
    pub file: String,
    pub contents: String,
    pub contents_from_file: String,
    pub contents_from_variable: String,
    /// Octal mode sent in the file header, e.g. `0644`
    pub permissions: String,
    /// Copy timeout in seconds; 0 keeps the client default
    pub timeout: u64,

    #[serde(skip)]
    connection: Option<Arc<dyn Connection>>,
}

impl ScpWriteFileStep {
    /// A registry factory copying files over `connection`.
    pub fn factory(connection: Arc<dyn Connection>) -> StepFactory {
        Arc::new(move |ctx: &ExecutionContext, raw: &Value| -> Result<Box<dyn Step>, serde_json::Error> {
            let mut step: ScpWriteFileStep = serde_json::from_value(raw.clone())?;
            step.base.ctx = ctx.clone();
            step.connection = Some(Arc::clone(&connection));
            Ok(Box::new(step) as Box<dyn Step>)
        })
    }

    fn contents(&self, vars: &Variables) -> Result<Vec<u8>, StepError> {
        if !self.contents_from_variable.is_empty() {
            let name = eval_string(&self.contents_from_variable, vars);
            return match vars.get(&name) {
                Some(Value::String(s)) => Ok(s.clone().into_bytes()),
                Some(Value::Null) | None => Err(StepError::definition(format!(
                    "variable {:?} does not exist",
                    name
                ))),
                Some(other) => Ok(other.to_string().into_bytes()),
            };
        }

        if !self.contents_from_file.is_empty() {
            let path = eval_string(&self.contents_from_file, vars);
            return self
                .base
                .ctx
                .fs()
                .read_file(&path)
                .map_err(|e| StepError::from(e).context("can't open local file"));
        }

        Ok(eval_string(&self.contents, vars).into_bytes())
    }
}

impl Step for ScpWriteFileStep {
    fn kind(&self) -> &'static str {
        "scp_writefile"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        let step_name = self.base.step_name();
        if self.file.is_empty() {
            return Err(StepError::definition(format!("filename in {:?} is empty", step_name)));
        }
        if self.permissions.is_empty() {
            return Err(StepError::definition(format!(
                "filemode permissions in {:?} are empty",
                step_name
            )));
        }
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| StepError::definition("scp_writefile: no connection configured"))?;

        let remote_path = eval_string(&self.file, vars);
        let contents = self.contents(vars)?;

        let session = connection
            .new_session()
            .map_err(|e| StepError::from(e).context("unable to get ssh session"))?;

        let mut client = Client::new(Arc::clone(connection), Arc::clone(&session));
        if self.timeout > 0 {
            client = client.with_timeout(Duration::from_secs(self.timeout));
        }

        debug!("Writing to {}", remote_path);
        let result = client.copy_file(contents.as_slice(), &remote_path, &self.permissions);

        if let Err(e) = session.close() {
            debug!("Failed to close ssh session: {}", e);
        }
        result.map_err(StepError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Engine, StepRegistry};
    use crate::remote::scp::ScpError;
    use crate::remote::testing::{scp_sink, FakeConnection};
    use crate::storage::MemFs;
    use serde_json::json;
    use std::sync::Mutex;

    type Received = Arc<Mutex<(String, Vec<u8>)>>;

    fn sink_connection() -> (Arc<FakeConnection>, Received) {
        let received: Received = Arc::new(Mutex::new((String::new(), Vec::new())));
        let connection = Arc::new(FakeConnection::new("host:22", Some(scp_sink(Arc::clone(&received)))));
        (connection, received)
    }

    fn engine(connection: Arc<FakeConnection>, fs: Arc<MemFs>, scenario: &str) -> Engine {
        let registry =
            StepRegistry::builtin().with("scp_writefile", ScpWriteFileStep::factory(connection));
        Engine::builder()
            .with_registry(registry)
            .with_fs(fs)
            .build_with_scenario(scenario)
            .unwrap()
    }

    #[test]
    fn test_inline_contents() {
        let (connection, received) = sink_connection();
        let engine = engine(
            connection.clone(),
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","file":"/etc/{{ .app }}.conf",
                "contents":"port={{ .port }}\n","permissions":"0644"}]}"#,
        );

        let mut vars = Variables::new();
        vars.insert("app".into(), json!("billing"));
        vars.insert("port".into(), json!(8080));
        engine.execute(&mut vars).unwrap();

        let (header, data) = received.lock().unwrap().clone();
        assert_eq!(header, "C0644 10 billing.conf");
        assert_eq!(data, b"port=8080\n");

        let session = connection.sessions().remove(0);
        assert_eq!(session.calls(), vec!["run scp -qt /etc/billing.conf", "close"]);
        assert!(!connection.is_closed());
    }

    #[test]
    fn test_contents_from_variable() {
        let (connection, received) = sink_connection();
        let engine = engine(
            connection,
            Arc::new(MemFs::new()),
            r#"{"commands":[
                {"type":"scp_writefile","file":"/tmp/key","contentsFromVariable":"{{ .which }}","permissions":"0600"}
            ]}"#,
        );

        let mut vars = Variables::new();
        vars.insert("which".into(), json!("deploy_key"));
        vars.insert("deploy_key".into(), json!("ssh-ed25519 AAAA"));
        engine.execute(&mut vars).unwrap();

        assert_eq!(received.lock().unwrap().1, b"ssh-ed25519 AAAA");
    }

    #[test]
    fn test_structured_variable_is_written_as_json() {
        let (connection, received) = sink_connection();
        let engine = engine(
            connection,
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","file":"/tmp/c.json","contentsFromVariable":"cfg","permissions":"0644"}]}"#,
        );

        let mut vars = Variables::new();
        vars.insert("cfg".into(), json!({"debug": true}));
        engine.execute(&mut vars).unwrap();

        assert_eq!(received.lock().unwrap().1, br#"{"debug":true}"#);
    }

    #[test]
    fn test_missing_variable() {
        let (connection, _received) = sink_connection();
        let engine = engine(
            connection.clone(),
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","file":"/tmp/x","contentsFromVariable":"nope","permissions":"0644"}]}"#,
        );

        let err = engine.execute(&mut Variables::new()).unwrap_err();
        assert!(err.to_string().ends_with(r#"variable "nope" does not exist"#));
        assert_eq!(connection.session_requests(), 0);
    }

    #[test]
    fn test_contents_from_local_file() {
        let (connection, received) = sink_connection();
        let fs = Arc::new(MemFs::new().with_file("/srv/motd", "welcome\n"));
        let engine = engine(
            connection,
            fs,
            r#"{"commands":[{"type":"scp_writefile","file":"/etc/motd","contentsFromFile":"/srv/motd","permissions":"0644"}]}"#,
        );

        engine.execute(&mut Variables::new()).unwrap();
        assert_eq!(received.lock().unwrap().1, b"welcome\n");
    }

    #[test]
    fn test_missing_local_file() {
        let (connection, _received) = sink_connection();
        let engine = engine(
            connection,
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","file":"/etc/motd","contentsFromFile":"/srv/motd","permissions":"0644"}]}"#,
        );

        let err = engine.execute(&mut Variables::new()).unwrap_err();
        assert!(err.to_string().contains("can't open local file"));
    }

    #[test]
    fn test_required_fields() {
        let (connection, _received) = sink_connection();
        let engine = engine(
            connection.clone(),
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","stepName":"w","file":"/tmp/x"}]}"#,
        );
        let err = engine.execute(&mut Variables::new()).unwrap_err();
        assert!(err.to_string().ends_with(r#"filemode permissions in "w" are empty"#));

        let engine = self::engine(
            connection,
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","stepName":"w","permissions":"0644"}]}"#,
        );
        let err = engine.execute(&mut Variables::new()).unwrap_err();
        assert!(err.to_string().ends_with(r#"filename in "w" is empty"#));
    }

    #[test]
    fn test_step_timeout_override() {
        let connection = Arc::new(FakeConnection::new("host:22", None));
        let engine = engine(
            connection.clone(),
            Arc::new(MemFs::new()),
            r#"{"commands":[{"type":"scp_writefile","file":"/tmp/x","contents":"x","permissions":"0644","timeout":1}]}"#,
        );

        let err = engine.execute(&mut Variables::new()).unwrap_err();

        assert!(matches!(err.cause(), StepError::Scp(ScpError::Timeout)));
        assert!(connection.is_closed());
    }
}
