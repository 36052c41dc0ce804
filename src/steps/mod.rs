//! Built-in Steps
//!
//! The step kinds available to every engine through
//! [`StepRegistry::builtin`](crate::execution::StepRegistry::builtin), plus
//! [`IncludeStep`], which needs a storage and is registered by the caller.
//!
//! # Structure
//!
//! - `message`, `variable`, `sleep`, `password`, `writefile`: simple steps
//! - `exec`: local process execution with retries
//! - `foreach`, `commands`, `include`: control flow over child engines
//! - `retry`: the retry and failure-hook convention shared with remote steps

pub mod exec;
pub mod foreach;
pub mod include;
pub mod message;
pub mod password;
pub mod retry;
pub mod sleep;
pub mod subexecute;
pub mod variable;
pub mod writefile;

pub use exec::ExecStep;
pub use foreach::ForeachStep;
pub use include::IncludeStep;
pub use message::MessageStep;
pub use password::PasswordStep;
pub use retry::RetryPolicy;
pub use sleep::SleepStep;
pub use subexecute::SubExecuteStep;
pub use variable::VariableStep;
pub use writefile::WriteFileStep;
