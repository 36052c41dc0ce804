//! Output Sinks
//!
//! Shared writers used for process output: the engine-wide stdout/stderr
//! sinks, a lock-guarded capture buffer and a fan-out writer that feeds
//! both at once.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A writer shared between the engine, its steps and I/O pump threads.
pub type SharedWriter = Arc<Mutex<dyn Write + Send>>;

/// Wraps any writer into a [`SharedWriter`].
pub fn shared<W: Write + Send + 'static>(writer: W) -> SharedWriter {
    Arc::new(Mutex::new(writer))
}

/// An owned [`Write`] handle onto a [`SharedWriter`].
///
/// Each write takes the sink's lock, so several handles may be written
/// from different threads.
pub struct SinkWriter {
    sink: SharedWriter,
}

impl SinkWriter {
    pub fn new(sink: &SharedWriter) -> Self {
        Self {
            sink: Arc::clone(sink),
        }
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        sink.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush()
    }
}

/// A cloneable in-memory buffer.
///
/// Reads and writes go through a single mutex, so the buffer can be filled
/// by a pump thread while another thread takes snapshots.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the bytes written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Returns the bytes written so far as text, replacing invalid UTF-8.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Writes every chunk to all of its writers, in order.
pub struct CombinedWriter {
    writers: Vec<Box<dyn Write + Send>>,
}

impl CombinedWriter {
    pub fn new(writers: Vec<Box<dyn Write + Send>>) -> Self {
        Self { writers }
    }
}

impl Write for CombinedWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for writer in &mut self.writers {
            writer.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        for writer in &mut self.writers {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Builds the writer a process step sends one of its streams to.
///
/// Without a capture buffer the stream goes straight to the sink;
/// with one, it is duplicated into the buffer as well.
pub fn step_writer(sink: &SharedWriter, capture: Option<&SharedBuffer>) -> Box<dyn Write + Send> {
    match capture {
        None => Box::new(SinkWriter::new(sink)),
        Some(buffer) => Box::new(CombinedWriter::new(vec![
            Box::new(SinkWriter::new(sink)),
            Box::new(buffer.clone()),
        ])),
    }
}
