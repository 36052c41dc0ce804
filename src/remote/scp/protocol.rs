//! Wire format of the remote copy protocol.
//!
//! Every control message the client sends is answered by one status byte:
//! `0` for success, `1` for a warning and `2` for an error. Warnings and
//! errors are followed by a message terminated by `\n`.

use std::io::{self, Read};

/// Written after the file contents.
pub const END_MARKER: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Ok,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub kind: ResponseKind,
    pub message: String,
}

impl Response {
    /// Reads one status response.
    ///
    /// Reads byte by byte so nothing past the response is consumed from
    /// the stream.
    pub fn read_from<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut status = [0u8; 1];
        reader.read_exact(&mut status)?;

        let kind = match status[0] {
            0 => {
                return Ok(Self {
                    kind: ResponseKind::Ok,
                    message: String::new(),
                })
            }
            1 => ResponseKind::Warning,
            2 => ResponseKind::Error,
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("unknown response type {}", other),
                ))
            }
        };

        let mut message = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            reader.read_exact(&mut byte)?;
            if byte[0] == b'\n' {
                break;
            }
            message.push(byte[0]);
        }

        Ok(Self {
            kind,
            message: String::from_utf8_lossy(&message).into_owned(),
        })
    }

    pub fn is_failure(&self) -> bool {
        self.kind != ResponseKind::Ok
    }
}

/// The control line announcing a single file.
pub fn file_header(permissions: &str, size: u64, filename: &str) -> String {
    format!("C{} {} {}\n", permissions, size, filename)
}

/// Last element of a `/`-separated remote path.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return if path.is_empty() { "." } else { "/" };
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
