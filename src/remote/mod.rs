//! Remote Execution
//!
//! Steps and helpers that act on a remote host through an established
//! secure-shell connection.
//!
//! # Architecture
//!
//! - [`session`]: the [`Connection`] / [`Session`] traits the rest of the
//!   module is written against, and [`SshError`]
//! - [`scp`]: the remote copy protocol client
//! - [`exec`]: the `ssh_exec` step
//! - [`writefile`]: the `scp_writefile` step
//!
//! Neither step is part of the built-in registry; register them with the
//! connection they should use:
//!
//! ```rust,ignore
//! let registry = StepRegistry::builtin()
//!     .with("ssh_exec", SshExecStep::factory(Arc::clone(&connection)))
//!     .with("scp_writefile", ScpWriteFileStep::factory(connection));
//! ```

pub mod exec;
pub mod scp;
pub mod session;
pub mod writefile;

#[cfg(test)]
pub(crate) mod testing;

pub use exec::SshExecStep;
pub use session::{Connection, Session, SshError};
pub use writefile::ScpWriteFileStep;
