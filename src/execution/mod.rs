//! Scenario Execution
//!
//! # Architecture
//!
//! - [`engine`]: the engine, its builder and shared configuration
//! - [`step`]: the step contract and common step fields
//! - [`registry`]: step kind to factory mapping
//! - [`context`]: per-step execution context and child-engine spawning

pub mod context;
pub mod engine;
pub mod registry;
pub mod step;

pub use context::{ExecutionContext, Sleeper};
pub use engine::{BeforeStepCallback, Engine, EngineBuilder, EngineConfig, HookFn, HooksAfter};
pub use registry::{factory_for, StepFactory, StepRegistry};
pub use step::{DebugInfo, Step, StepBase};
