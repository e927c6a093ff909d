//! Deterministic simulation harness for Tandem protocol testing.
//!
//! Seeded implementations of the Environment and Presentation traits, a
//! synchronous multi-peer [`scenario::World`] with a virtual clock, and a
//! reference model for model-based tests.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod content;
pub mod model;
pub mod presentation;
pub mod scenario;
pub mod sim_env;

pub use content::{SAMPLE_CATEGORY, SampleContent};
pub use model::{
    ActorId, ModelPhase, ModelPlayer, ModelRoom, Operation, OperationError, OperationResult,
};
pub use presentation::RecordingPresentation;
pub use scenario::{OracleFn, RunnableScenario, Scenario, Step, World};
pub use sim_env::SimEnv;
pub use tandem_app::MemoryNetwork;
