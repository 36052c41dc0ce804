//! Remote Copy Client
//!
//! Pushes one file over an open session. Each copy runs two threads:
//!
//! - the driver writes the file header, waits for the first acknowledgement,
//!   streams the contents followed by the end marker and waits for the
//!   second acknowledgement
//! - the runner executes `scp -qt <path>` on the same session, which puts
//!   the far end into receive mode
//!
//! Both report into a bounded queue with one slot per thread. The caller
//! waits for both reports until the timeout; on timeout the session and the
//! connection are closed, which unblocks whichever thread is stuck on I/O.

use std::io::{self, Cursor, Read, Write};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};
use thiserror::Error;

use super::protocol::{base_name, file_header, Response, END_MARKER};
use crate::eval::shell_escape;
use crate::remote::session::{Connection, Session, SshError};

/// Default bound on a whole copy.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default remote receiver binary.
pub const DEFAULT_REMOTE_BINARY: &str = "scp";

#[derive(Debug, Error)]
pub enum ScpError {
    #[error("timeout when uploading files")]
    Timeout,

    #[error("{stage}: {source}")]
    Io {
        stage: &'static str,
        #[source]
        source: io::Error,
    },

    /// The far end answered a control message with a warning or an error.
    #[error("{stage}: {message}")]
    Remote { stage: &'static str, message: String },

    #[error("stream contents: expected {expected} bytes, got {copied}")]
    ShortRead { expected: u64, copied: u64 },

    #[error("{stage}: {source}")]
    Transport {
        stage: &'static str,
        #[source]
        source: SshError,
    },

    #[error("copy task ended without reporting")]
    TaskLost,

    #[error("failed to start copy task: {0}")]
    Spawn(#[source] io::Error),
}

impl ScpError {
    fn io(stage: &'static str, source: io::Error) -> Self {
        Self::Io { stage, source }
    }

    fn transport(stage: &'static str, source: SshError) -> Self {
        Self::Transport { stage, source }
    }
}

/// Copies files over a session of an existing connection.
///
/// The client closes the connection only on timeout or an explicit
/// [`close`](Client::close); otherwise its lifetime stays with the caller.
///
/// # Example
///
/// ```rust,ignore
/// let session = connection.new_session()?;
/// let client = Client::new(Arc::clone(&connection), session)
///     .with_timeout(Duration::from_secs(10));
/// client.copy_file(File::open("app.conf")?, "/etc/app.conf", "0644")?;
/// ```
pub struct Client {
    connection: Arc<dyn Connection>,
    session: Arc<dyn Session>,
    timeout: Duration,
    remote_binary: String,
}

impl Client {
    pub fn new(connection: Arc<dyn Connection>, session: Arc<dyn Session>) -> Self {
        Self {
            connection,
            session,
            timeout: DEFAULT_TIMEOUT,
            remote_binary: DEFAULT_REMOTE_BINARY.to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_remote_binary(mut self, binary: impl Into<String>) -> Self {
        self.remote_binary = binary.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn remote_binary(&self) -> &str {
        &self.remote_binary
    }

    /// Reads `reader` to the end, then copies the bytes.
    pub fn copy_file<R: Read>(
        &self,
        mut reader: R,
        remote_path: &str,
        permissions: &str,
    ) -> Result<(), ScpError> {
        let mut contents = Vec::new();
        reader
            .read_to_end(&mut contents)
            .map_err(|e| ScpError::io("read all", e))?;

        let size = contents.len() as u64;
        self.copy(Cursor::new(contents), remote_path, permissions, size)
    }

    /// Copies exactly `size` bytes of `reader` to `remote_path`.
    pub fn copy<R>(
        &self,
        reader: R,
        remote_path: &str,
        permissions: &str,
        size: u64,
    ) -> Result<(), ScpError>
    where
        R: Read + Send + 'static,
    {
        let stdin = self
            .session
            .stdin_pipe()
            .map_err(|e| ScpError::transport("stdin pipe", e))?;
        let stdout = self
            .session
            .stdout_pipe()
            .map_err(|e| ScpError::transport("stdout pipe", e))?;

        debug!("Copying {} bytes to {}", size, remote_path);

        let (tx, rx) = mpsc::sync_channel::<Result<(), ScpError>>(2);

        let header = file_header(permissions, size, base_name(remote_path));
        let driver_tx = tx.clone();
        thread::Builder::new()
            .name("scp-driver".to_string())
            .spawn(move || {
                let mut stdin = stdin;
                let mut stdout = stdout;
                let result = drive(&mut *stdin, &mut *stdout, &header, reader, size);
                let _ = driver_tx.send(result);
                // stdin drops here; the far end sees EOF after our report
            })
            .map_err(ScpError::Spawn)?;

        let session = Arc::clone(&self.session);
        let command = format!("{} -qt {}", self.remote_binary, shell_escape(remote_path));
        let spawned = thread::Builder::new()
            .name("scp-runner".to_string())
            .spawn(move || {
                let result = session
                    .run(&command)
                    .map_err(|e| ScpError::transport("session run scp", e));
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            self.abort();
            return Err(ScpError::Spawn(e));
        }

        let deadline = Instant::now() + self.timeout;
        let mut first_error = None;

        for _ in 0..2 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(RecvTimeoutError::Timeout) => {
                    warn!("Copy to {} timed out after {:?}", remote_path, self.timeout);
                    self.abort();
                    rx.try_iter().for_each(drop);
                    return Err(ScpError::Timeout);
                }
                Err(RecvTimeoutError::Disconnected) => {
                    first_error.get_or_insert(ScpError::TaskLost);
                    break;
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Closes the session and the connection.
    pub fn close(&self) -> Result<(), ScpError> {
        let session = self.session.close();
        let connection = self.connection.close();
        session
            .and(connection)
            .map_err(|e| ScpError::transport("close", e))
    }

    fn abort(&self) {
        if let Err(e) = self.session.close() {
            debug!("Failed to close session: {}", e);
        }
        if let Err(e) = self.connection.close() {
            debug!("Failed to close connection: {}", e);
        }
    }
}

/// The control side of one copy.
fn drive<R: Read>(
    stdin: &mut dyn Write,
    stdout: &mut dyn Read,
    header: &str,
    reader: R,
    size: u64,
) -> Result<(), ScpError> {
    stdin
        .write_all(header.as_bytes())
        .and_then(|_| stdin.flush())
        .map_err(|e| ScpError::io("write header", e))?;
    check_response(stdout, "acknowledge header")?;

    let copied = io::copy(&mut reader.take(size), &mut *stdin)
        .map_err(|e| ScpError::io("stream contents", e))?;
    if copied < size {
        return Err(ScpError::ShortRead {
            expected: size,
            copied,
        });
    }

    stdin
        .write_all(&[END_MARKER])
        .and_then(|_| stdin.flush())
        .map_err(|e| ScpError::io("write end marker", e))?;
    check_response(stdout, "acknowledge contents")
}

fn check_response(stdout: &mut dyn Read, stage: &'static str) -> Result<(), ScpError> {
    let response = Response::read_from(stdout).map_err(|e| ScpError::io(stage, e))?;
    if response.is_failure() {
        return Err(ScpError::Remote {
            stage,
            message: response.message,
        });
    }
    Ok(())
}
