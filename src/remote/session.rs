//! Secure-Shell Boundary
//!
//! The remote steps and the copy client never open connections themselves.
//! They consume an already established [`Connection`] and the [`Session`]s it
//! hands out, so any SSH library (or an in-memory fake) can sit behind them.

use std::io::{self, Read, Write};
use std::sync::Arc;

use thiserror::Error;

/// Failures reported by the transport.
#[derive(Debug, Error)]
pub enum SshError {
    /// The remote command ran and exited unsuccessfully.
    #[error("process exited with status {status}")]
    Exit { status: i32 },

    #[error("session closed")]
    Closed,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

impl SshError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

/// One remote command channel.
///
/// Methods take `&self`: a session is shared between the thread running the
/// remote command and the thread driving its standard streams, and closing
/// it from a third thread must unblock both.
pub trait Session: Send + Sync {
    /// Requests a pseudo terminal of the given size.
    fn request_pty(&self, term: &str, cols: u32, rows: u32) -> Result<(), SshError>;

    fn set_env(&self, name: &str, value: &str) -> Result<(), SshError>;

    /// Where the remote command's stdout goes. Ignored once
    /// [`stdout_pipe`](Self::stdout_pipe) was taken.
    fn set_stdout(&self, writer: Box<dyn Write + Send>);

    fn set_stderr(&self, writer: Box<dyn Write + Send>);

    /// A writer feeding the remote command's stdin. Dropping it signals EOF.
    fn stdin_pipe(&self) -> Result<Box<dyn Write + Send>, SshError>;

    /// A reader over the remote command's stdout.
    fn stdout_pipe(&self) -> Result<Box<dyn Read + Send>, SshError>;

    /// Runs `command` and blocks until it exits.
    ///
    /// A nonzero exit is reported as [`SshError::Exit`].
    fn run(&self, command: &str) -> Result<(), SshError>;

    fn close(&self) -> Result<(), SshError>;
}

/// An established secure-shell connection.
pub trait Connection: Send + Sync {
    fn new_session(&self) -> Result<Arc<dyn Session>, SshError>;

    /// Display form of the peer address, e.g. `10.0.0.5:22`.
    fn remote_addr(&self) -> String;

    fn close(&self) -> Result<(), SshError>;
}
