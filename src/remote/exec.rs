//! `ssh_exec`: runs a command on the remote host.
//!
//! Each attempt opens a fresh session, echoes `<addr>$ <command>` to the
//! stdout sink and runs the shell-escaped command under a pty. Exit
//! failures follow the retry convention of [`RetryPolicy`].

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;
use serde_json::Value;

use super::session::{Connection, Session};
use crate::error::StepError;
use crate::eval::{escape_args, eval_string};
use crate::execution::{ExecutionContext, Step, StepBase, StepFactory};
use crate::output::{step_writer, SharedBuffer, SinkWriter};
use crate::steps::RetryPolicy;
use crate::Variables;

const PTY_TERM: &str = "xterm";
const PTY_COLS: u32 = 80;
const PTY_ROWS: u32 = 40;

#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SshExecStep {
    #[serde(flatten)]
    pub base: StepBase,
    pub cmd: Vec<String>,
    /// `-` hides the command in the echo line; any other value is a
    /// template shown instead of it
    pub cmd_redact: String,
    pub variable: String,
    /// Remote environment, values are templates
    pub env: BTreeMap<String, String>,
    #[serde(flatten)]
    pub retry: RetryPolicy,

    #[serde(skip)]
    connection: Option<Arc<dyn Connection>>,
}

impl SshExecStep {
    /// A registry factory running commands over `connection`.
    pub fn factory(connection: Arc<dyn Connection>) -> StepFactory {
        Arc::new(move |ctx: &ExecutionContext, raw: &Value| -> Result<Box<dyn Step>, serde_json::Error> {
            let mut step: SshExecStep = serde_json::from_value(raw.clone())?;
            step.base.ctx = ctx.clone();
            step.connection = Some(Arc::clone(&connection));
            Ok(Box::new(step) as Box<dyn Step>)
        })
    }

    fn run_once(&self, connection: &dyn Connection, vars: &mut Variables) -> Result<(), StepError> {
        let args: Vec<String> = self.cmd.iter().map(|arg| eval_string(arg, vars)).collect();
        let command = escape_args(&args);
        if command.is_empty() {
            return Err(StepError::definition(format!(
                "command {:?} is empty",
                self.base.step_name
            )));
        }

        let shown = match self.cmd_redact.as_str() {
            "" => command.clone(),
            "-" => "[command redacted]".to_string(),
            template => eval_string(template, vars),
        };
        info!("Executing on {}: {}", connection.remote_addr(), shown);
        writeln!(
            SinkWriter::new(self.base.ctx.stdout()),
            "{}$ {}",
            connection.remote_addr(),
            shown
        )?;

        let session = connection
            .new_session()
            .map_err(|e| StepError::from(e).context("unable to get ssh session"))?;

        let result = self.run_in_session(session.as_ref(), &command, vars);

        if let Err(e) = session.close() {
            debug!("Failed to close ssh session: {}", e);
        }
        result
    }

    fn run_in_session(
        &self,
        session: &dyn Session,
        command: &str,
        vars: &mut Variables,
    ) -> Result<(), StepError> {
        let ctx = &self.base.ctx;

        session
            .request_pty(PTY_TERM, PTY_COLS, PTY_ROWS)
            .map_err(|e| StepError::from(e).context("failed to request pty"))?;

        let capture = (!self.variable.is_empty()).then(SharedBuffer::new);
        session.set_stdout(step_writer(ctx.stdout(), capture.as_ref()));
        session.set_stderr(step_writer(ctx.stderr(), capture.as_ref()));

        for (name, value) in &self.env {
            session
                .set_env(name, &eval_string(value, vars))
                .map_err(|e| StepError::from(e).context("failed to set ssh environment variable"))?;
        }

        let status = session.run(command);

        if let Some(buffer) = &capture {
            vars.insert(self.variable.clone(), Value::String(buffer.to_string_lossy()));
        }

        status.map_err(StepError::from)
    }
}

impl Step for SshExecStep {
    fn kind(&self) -> &'static str {
        "ssh_exec"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        self.base.ctx.require_engine()?;
        let connection = self
            .connection
            .as_deref()
            .ok_or_else(|| StepError::definition("ssh_exec: no connection configured"))?;

        self.retry
            .run(&self.base, vars, |vars| self.run_once(connection, vars))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Engine, StepRegistry};
    use crate::remote::session::SshError;
    use crate::remote::testing::{FakeConnection, Handler, RemoteIo};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn echo_handler() -> Handler {
        Arc::new(|command: &str, io: &mut RemoteIo| -> Result<(), SshError> {
            writeln!(io.stdout, "ran: {}", command)?;
            writeln!(io.stderr, "note")?;
            Ok(())
        })
    }

    fn engine(connection: Arc<FakeConnection>, scenario: &str) -> (Engine, SharedBuffer) {
        let stdout = SharedBuffer::new();
        let registry = StepRegistry::builtin().with("ssh_exec", SshExecStep::factory(connection));
        let engine = Engine::builder()
            .with_registry(registry)
            .with_stdout(stdout.clone())
            .with_stderr(SharedBuffer::new())
            .with_sleeper(|_| {})
            .build_with_scenario(scenario)
            .unwrap();
        (engine, stdout)
    }

    #[test]
    fn test_runs_escaped_command_and_captures() {
        let connection = Arc::new(FakeConnection::new("10.0.0.5:22", Some(echo_handler())));
        let (engine, stdout) = engine(
            connection.clone(),
            r#"{"commands":[{"type":"ssh_exec","variable":"out","cmd":["echo","hello {{ .name }}"],
                "env":{"B":"{{ .name }}","A":"1"}}]}"#,
        );

        let mut vars = Variables::new();
        vars.insert("name".into(), json!("world"));
        engine.execute(&mut vars).unwrap();

        assert_eq!(vars["out"], "ran: echo 'hello world'\nnote\n");
        assert_eq!(
            stdout.to_string_lossy(),
            "10.0.0.5:22$ echo 'hello world'\nran: echo 'hello world'\n"
        );

        let session = connection.sessions().remove(0);
        assert_eq!(
            session.calls(),
            vec![
                "pty xterm 80x40",
                "env A=1",
                "env B=world",
                "run echo 'hello world'",
                "close"
            ]
        );
    }

    #[test]
    fn test_redacted_echo() {
        let connection = Arc::new(FakeConnection::new("host:22", Some(echo_handler())));
        let (engine, stdout) = engine(
            connection.clone(),
            r#"{"commands":[
                {"type":"ssh_exec","cmdRedact":"-","cmd":["passwd","secret"]},
                {"type":"ssh_exec","cmdRedact":"deploy {{ .app }}","cmd":["deploy.sh","--token","t0k3n"]}
            ]}"#,
        );

        let mut vars = Variables::new();
        vars.insert("app".into(), json!("billing"));
        engine.execute(&mut vars).unwrap();

        let out = stdout.to_string_lossy();
        assert!(out.contains("host:22$ [command redacted]\n"));
        assert!(out.contains("host:22$ deploy billing\n"));
        assert!(!out.contains("host:22$ passwd"));
    }

    #[test]
    fn test_allow_fail_records_remote_status() {
        let handler: Handler =
            Arc::new(|_: &str, _: &mut RemoteIo| -> Result<(), SshError> { Err(SshError::Exit { status: 3 }) });
        let connection = Arc::new(FakeConnection::new("host:22", Some(handler)));
        let (engine, _stdout) = engine(
            connection,
            r#"{"commands":[{"type":"ssh_exec","stepName":"probe","allowFail":true,"cmd":["false"]}]}"#,
        );

        let mut vars = Variables::new();
        engine.execute(&mut vars).unwrap();
        assert_eq!(vars["probe_exit_status"], 3);
    }

    #[test]
    fn test_retries_remote_exit_failures() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let handler: Handler = Arc::new(move |_: &str, _: &mut RemoteIo| -> Result<(), SshError> {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(SshError::Exit { status: 1 })
            } else {
                Ok(())
            }
        });
        let connection = Arc::new(FakeConnection::new("host:22", Some(handler)));

        let slept = Arc::new(Mutex::new(Vec::new()));
        let recorder = Arc::clone(&slept);
        let registry =
            StepRegistry::builtin().with("ssh_exec", SshExecStep::factory(connection.clone()));
        let engine = Engine::builder()
            .with_registry(registry)
            .with_stdout(SharedBuffer::new())
            .with_sleeper(move |d| recorder.lock().unwrap().push(d))
            .build_with_scenario(
                r#"{"commands":[{"type":"ssh_exec","attempts":2,"delay":5,"cmd":["apt-get","update"]}]}"#,
            )
            .unwrap();

        engine.execute(&mut Variables::new()).unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(connection.sessions().len(), 2);
        assert!(connection.sessions().iter().all(|s| s.is_closed()));
        assert_eq!(*slept.lock().unwrap(), vec![Duration::from_secs(5)]);
    }

    #[test]
    fn test_session_failure_is_not_retried() {
        let connection = Arc::new(FakeConnection::refusing("host:22"));
        let (engine, _stdout) = engine(
            connection.clone(),
            r#"{"commands":[{"type":"ssh_exec","attempts":3,"cmd":["uptime"]}]}"#,
        );

        let err = engine.execute(&mut Variables::new()).unwrap_err();

        assert!(err
            .to_string()
            .ends_with("unable to get ssh session: administratively prohibited"));
        assert_eq!(connection.session_requests(), 1);
    }

    #[test]
    fn test_empty_command() {
        let connection = Arc::new(FakeConnection::new("host:22", Some(echo_handler())));
        let (engine, _stdout) = engine(
            connection.clone(),
            r#"{"commands":[{"type":"ssh_exec","stepName":"noop"}]}"#,
        );

        let err = engine.execute(&mut Variables::new()).unwrap_err();
        assert!(err.to_string().ends_with(r#"command "noop" is empty"#));
        assert_eq!(connection.session_requests(), 0);
    }

    #[test]
    fn test_requires_engine() {
        let factory = SshExecStep::factory(Arc::new(FakeConnection::new("host:22", None)));
        let step = factory(&ExecutionContext::default(), &json!({"cmd": ["uptime"]})).unwrap();

        let err = step.execute(&mut Variables::new()).unwrap_err();
        assert!(matches!(err, StepError::Definition(_)));
    }
}
