//! `exec`: runs a local process.
//!
//! The command's stdout and stderr are pumped into the engine's sinks by
//! helper threads. When `variable` is set, both streams are also captured
//! into that namespace entry, including on failure.

use std::io::{self, Read, Write};
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};

use log::{info, warn};
use serde::Deserialize;
use serde_json::Value;

use super::retry::RetryPolicy;
use crate::error::StepError;
use crate::eval::{escape_args, eval_string};
use crate::execution::{Step, StepBase};
use crate::output::{step_writer, SharedBuffer};
use crate::Variables;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecStep {
    #[serde(flatten)]
    pub base: StepBase,
    /// Program and arguments, each a template
    pub cmd: Vec<String>,
    /// Namespace entry receiving the combined output
    pub variable: String,
    /// Extra `KEY=VALUE` entries on top of the inherited environment
    pub env: Vec<String>,
    #[serde(flatten)]
    pub retry: RetryPolicy,
}

impl Step for ExecStep {
    fn kind(&self) -> &'static str {
        "exec"
    }

    fn base(&self) -> &StepBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut StepBase {
        &mut self.base
    }

    fn execute(&self, vars: &mut Variables) -> Result<(), StepError> {
        self.retry.run(&self.base, vars, |vars| self.run_once(vars))
    }
}

impl ExecStep {
    fn run_once(&self, vars: &mut Variables) -> Result<(), StepError> {
        let args: Vec<String> = self.cmd.iter().map(|arg| eval_string(arg, vars)).collect();

        let Some((program, rest)) = args.split_first() else {
            return Err(StepError::definition(format!(
                "command {:?} is empty",
                self.base.step_name
            )));
        };

        info!("{}", format!("Executing: {} {}", program, escape_args(rest)).trim());

        let mut command = Command::new(program);
        command
            .args(rest)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        for entry in &self.env {
            match entry.split_once('=') {
                Some((key, value)) => command.env(key, value),
                None => command.env(entry, ""),
            };
        }

        let ctx = &self.base.ctx;
        let capture = (!self.variable.is_empty()).then(SharedBuffer::new);

        let mut child = command.spawn()?;
        let pumps = [
            pump(child.stdout.take(), step_writer(ctx.stdout(), capture.as_ref())),
            pump(child.stderr.take(), step_writer(ctx.stderr(), capture.as_ref())),
        ];

        let status = child.wait();

        for handle in pumps.into_iter().flatten() {
            match handle.join() {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Failed to forward process output: {}", e),
                Err(_) => warn!("Output forwarding thread panicked"),
            }
        }

        if let Some(buffer) = &capture {
            vars.insert(self.variable.clone(), Value::String(buffer.to_string_lossy()));
        }

        let status = status?;
        if status.success() {
            Ok(())
        } else {
            Err(StepError::Exit {
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

/// Copies a child's output stream into `sink` on a helper thread.
fn pump<R>(source: Option<R>, mut sink: Box<dyn Write + Send>) -> Option<JoinHandle<io::Result<u64>>>
where
    R: Read + Send + 'static,
{
    source.map(|mut source| thread::spawn(move || io::copy(&mut source, &mut sink)))
}
