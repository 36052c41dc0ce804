//! Remote copy protocol client.

pub mod client;
pub mod protocol;

pub use client::{Client, ScpError, DEFAULT_REMOTE_BINARY, DEFAULT_TIMEOUT};
