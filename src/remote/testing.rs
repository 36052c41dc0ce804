//! In-memory secure-shell fakes built on `mpsc` channels.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use super::session::{Connection, Session, SshError};

/// Write half of an in-memory pipe. Each write becomes one chunk.
pub(crate) struct ChannelWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Read half of an in-memory pipe. Reports EOF once every writer is gone.
pub(crate) struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    pos: usize,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.pending.len() {
            match self.rx.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.pos);
        buf[..n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

pub(crate) fn pipe() -> (ChannelWriter, ChannelReader) {
    let (tx, rx) = mpsc::channel();
    (
        ChannelWriter { tx },
        ChannelReader {
            rx,
            pending: Vec::new(),
            pos: 0,
        },
    )
}

/// The remote end of a running command.
pub(crate) struct RemoteIo {
    pub stdin: Box<dyn Read + Send>,
    pub stdout: Box<dyn Write + Send>,
    pub stderr: Box<dyn Write + Send>,
}

/// Simulates the remote command. Without one, `run` blocks until the
/// session is closed.
pub(crate) type Handler = Arc<dyn Fn(&str, &mut RemoteIo) -> Result<(), SshError> + Send + Sync>;

#[derive(Default)]
pub(crate) struct FakeSession {
    handler: Option<Handler>,
    calls: Mutex<Vec<String>>,
    stdout: Mutex<Option<Box<dyn Write + Send>>>,
    stderr: Mutex<Option<Box<dyn Write + Send>>>,
    stdin_rx: Mutex<Option<ChannelReader>>,
    stdout_tx: Mutex<Option<ChannelWriter>>,
    closed: Mutex<bool>,
    closed_signal: Condvar,
    runs_finished: AtomicUsize,
}

impl FakeSession {
    pub fn new(handler: Option<Handler>) -> Self {
        Self {
            handler,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    /// Polls until `run` has returned, or `timeout` elapses.
    pub fn wait_run_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.runs_finished.load(Ordering::SeqCst) > 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn run_handler(&self, handler: &Handler, command: &str) -> Result<(), SshError> {
        let stdin: Box<dyn Read + Send> = match self.stdin_rx.lock().unwrap().take() {
            Some(reader) => Box::new(reader),
            None => Box::new(io::empty()),
        };
        let stdout: Box<dyn Write + Send> = match self.stdout_tx.lock().unwrap().take() {
            Some(writer) => Box::new(writer),
            None => self
                .stdout
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Box::new(io::sink())),
        };
        let stderr = self
            .stderr
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| Box::new(io::sink()));

        let mut io = RemoteIo {
            stdin,
            stdout,
            stderr,
        };
        handler(command, &mut io)
    }
}

impl Session for FakeSession {
    fn request_pty(&self, term: &str, cols: u32, rows: u32) -> Result<(), SshError> {
        self.record(format!("pty {} {}x{}", term, cols, rows));
        Ok(())
    }

    fn set_env(&self, name: &str, value: &str) -> Result<(), SshError> {
        self.record(format!("env {}={}", name, value));
        Ok(())
    }

    fn set_stdout(&self, writer: Box<dyn Write + Send>) {
        *self.stdout.lock().unwrap() = Some(writer);
    }

    fn set_stderr(&self, writer: Box<dyn Write + Send>) {
        *self.stderr.lock().unwrap() = Some(writer);
    }

    fn stdin_pipe(&self) -> Result<Box<dyn Write + Send>, SshError> {
        let (writer, reader) = pipe();
        *self.stdin_rx.lock().unwrap() = Some(reader);
        Ok(Box::new(writer))
    }

    fn stdout_pipe(&self) -> Result<Box<dyn Read + Send>, SshError> {
        let (writer, reader) = pipe();
        *self.stdout_tx.lock().unwrap() = Some(writer);
        Ok(Box::new(reader))
    }

    fn run(&self, command: &str) -> Result<(), SshError> {
        self.record(format!("run {}", command));

        let result = match &self.handler {
            Some(handler) => self.run_handler(handler, command),
            None => {
                let mut closed = self.closed.lock().unwrap();
                while !*closed {
                    closed = self.closed_signal.wait(closed).unwrap();
                }
                Err(SshError::Closed)
            }
        };

        self.runs_finished.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn close(&self) -> Result<(), SshError> {
        self.record("close".to_string());
        // Dropping the pipe ends unblocks readers on the client side
        self.stdout_tx.lock().unwrap().take();
        *self.closed.lock().unwrap() = true;
        self.closed_signal.notify_all();
        Ok(())
    }
}

pub(crate) struct FakeConnection {
    addr: String,
    handler: Option<Handler>,
    refuse_sessions: bool,
    sessions: Mutex<Vec<Arc<FakeSession>>>,
    session_requests: AtomicUsize,
    closed: AtomicBool,
}

impl FakeConnection {
    pub fn new(addr: &str, handler: Option<Handler>) -> Self {
        Self {
            addr: addr.to_string(),
            handler,
            refuse_sessions: false,
            sessions: Mutex::new(Vec::new()),
            session_requests: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// A connection whose every session request fails.
    pub fn refusing(addr: &str) -> Self {
        Self {
            refuse_sessions: true,
            ..Self::new(addr, None)
        }
    }

    pub fn sessions(&self) -> Vec<Arc<FakeSession>> {
        self.sessions.lock().unwrap().clone()
    }

    pub fn session_requests(&self) -> usize {
        self.session_requests.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Connection for FakeConnection {
    fn new_session(&self) -> Result<Arc<dyn Session>, SshError> {
        self.session_requests.fetch_add(1, Ordering::SeqCst);
        if self.refuse_sessions {
            return Err(SshError::other("administratively prohibited"));
        }

        let session = Arc::new(FakeSession::new(self.handler.clone()));
        self.sessions.lock().unwrap().push(Arc::clone(&session));
        Ok(session)
    }

    fn remote_addr(&self) -> String {
        self.addr.clone()
    }

    fn close(&self) -> Result<(), SshError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// A remote `scp -t` sink recording the header line and the bytes it
/// received. Both acknowledgements succeed.
pub(crate) fn scp_sink(received: Arc<Mutex<(String, Vec<u8>)>>) -> Handler {
    Arc::new(move |_command: &str, io: &mut RemoteIo| -> Result<(), SshError> {
        let mut header = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            io.stdin.read_exact(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            header.push(byte[0]);
        }
        let header = String::from_utf8_lossy(&header).into_owned();
        let size: usize = header
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| SshError::other("bad header"))?;
        io.stdout.write_all(&[0])?;

        let mut data = vec![0u8; size];
        io.stdin.read_exact(&mut data)?;
        io.stdin.read_exact(&mut byte)?;
        if byte[0] != 0 {
            return Err(SshError::other("missing end marker"));
        }
        io.stdout.write_all(&[0])?;

        *received.lock().unwrap() = (header, data);
        Ok(())
    })
}
