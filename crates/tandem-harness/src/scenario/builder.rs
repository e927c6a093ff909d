//! Scenario builder API.
//!
//! Provides a declarative API for scenario tests that enforces the oracle
//! pattern: a scenario only becomes runnable once it has a verification.

use std::time::Duration;

use tandem_core::{Command, ProtocolConfig};

use crate::scenario::{OracleFn, World};

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The coordinator starts the session.
    Start,
    /// `actor` ends the current turn.
    Advance(&'static str),
    /// `actor` swaps the current prompt for a forfeit.
    Forfeit(&'static str),
    /// `by` removes `target`.
    Kick {
        /// Issuing actor.
        by: &'static str,
        /// Actor removed.
        target: &'static str,
    },
    /// The host adds a player on its own device.
    AddLocal(&'static str),
    /// `actor` drops off the network.
    Crash(&'static str),
    /// Let virtual time pass.
    Elapse(Duration),
    /// Run until no events or timers remain.
    Settle,
}

/// Scenario builder.
///
/// The first actor hosts the room and the rest join it in order. Must call
/// `.oracle()` to get a [`RunnableScenario`].
pub struct Scenario {
    name: String,
    seed: u64,
    config: ProtocolConfig,
    host: Option<&'static str>,
    followers: Vec<&'static str>,
    steps: Vec<Step>,
}

impl Scenario {
    /// Create a new scenario with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            seed: 0,
            config: ProtocolConfig::default(),
            host: None,
            followers: Vec::new(),
            steps: Vec::new(),
        }
    }

    /// Seed for the world's randomness.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Protocol configuration shared by every peer.
    pub fn config(mut self, config: ProtocolConfig) -> Self {
        self.config = config;
        self
    }

    /// Actor that opens the room.
    pub fn host(mut self, name: &'static str) -> Self {
        self.host = Some(name);
        self
    }

    /// Actor that joins the room once it is open.
    pub fn follower(mut self, name: &'static str) -> Self {
        self.followers.push(name);
        self
    }

    /// Append a step.
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Set the oracle function and return a runnable scenario.
    ///
    /// The oracle is mandatory - you cannot run a scenario without
    /// verification.
    pub fn oracle(self, oracle: OracleFn) -> RunnableScenario {
        RunnableScenario { scenario: self, oracle }
    }
}

/// A scenario with an oracle function that can be executed.
pub struct RunnableScenario {
    scenario: Scenario,
    oracle: OracleFn,
}

impl RunnableScenario {
    /// Execute the scenario.
    ///
    /// Opens the room, lets every follower join and settle, plays the steps,
    /// settles the world once more, then runs the oracle.
    ///
    /// A command the protocol rejects fails the scenario.
    pub fn run(self) -> Result<(), String> {
        let world = self.execute()?;
        (self.oracle)(&world).map_err(|e| format!("Scenario '{}': oracle failed: {e}", self.scenario.name))
    }

    /// Execute the scenario and hand back the settled world without running
    /// the oracle.
    pub fn world(self) -> Result<World, String> {
        self.execute()
    }

    fn execute(&self) -> Result<World, String> {
        let scenario = &self.scenario;
        let fail = |what: String| format!("Scenario '{}': {what}", scenario.name);

        let host = scenario.host.ok_or_else(|| fail("no host".to_owned()))?;
        let mut world = World::with_config(scenario.seed, scenario.config.clone());
        let room = world.host(host).map_err(|e| fail(format!("host {host} failed: {e}")))?;
        for &name in &scenario.followers {
            world.join(name, &room).map_err(|e| fail(format!("{name} failed to join: {e}")))?;
            world.run_until_idle();
        }

        for step in &scenario.steps {
            let result = match step {
                Step::Start => world.command(host, Command::StartSession),
                Step::Advance(actor) => world.command(actor, Command::AdvanceTurn),
                Step::Forfeit(actor) => world.command(actor, Command::ChooseForfeit),
                Step::Kick { by, target } => {
                    let id = world.id(target).ok_or_else(|| fail(format!("no actor {target}")))?;
                    world.command(by, Command::Kick(id))
                },
                Step::AddLocal(name) => world.command(host, Command::AddLocalPlayer((*name).to_owned())),
                Step::Crash(actor) => {
                    world.crash(actor);
                    Ok(())
                },
                Step::Elapse(by) => {
                    world.advance(*by);
                    Ok(())
                },
                Step::Settle => {
                    world.settle();
                    Ok(())
                },
            };
            result.map_err(|e| fail(format!("{step:?} rejected: {e}")))?;
            world.run_until_idle();
        }

        world.settle();
        Ok(world)
    }
}
