//! Scenario testing with mandatory oracles.
//!
//! A [`Scenario`] lists the peers of one room and the steps they take. It
//! cannot run until an oracle is attached, and the oracle sees the final
//! [`World`] once every step has played out and all timers have fired.

mod builder;
pub mod oracle;
mod world;

pub use builder::{RunnableScenario, Scenario, Step};
pub use world::World;

/// Verification run against the settled world.
pub type OracleFn = Box<dyn Fn(&World) -> Result<(), String>>;
