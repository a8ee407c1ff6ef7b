//! Worker-side logic
//!
//! A [`WorkerAgent`] is the same regardless of transport: it reads
//! [`Request`](crate::protocol::Request)s from an inbox and answers through
//! an [`Outbox`](crate::transport::Outbox). What it does with the work is
//! decided by the [`AgentKit`] it is built with.

pub mod schedule;
pub mod strategy;
mod worker;

pub use strategy::{Attempt, ItemSource, Outcome};
pub use worker::{AgentStats, WorkerAgent};

use crate::engine::slot::Role;
use crate::error::Result;
use crate::sink::{LogSink, SqliteSink, WriteSink};
use crate::transport::SpawnSpec;
use std::path::PathBuf;
use std::time::Duration;
use strategy::{seeded_rng, FixedSource, RandomAttempt, RandomSource};
use tracing::debug;

/// Strategies and sink for one agent
pub struct AgentKit {
    /// Decides per-unit latency and outcome
    pub attempt: Box<dyn Attempt>,

    /// Produces items on `processDiscovery`
    pub source: Box<dyn ItemSource>,

    /// Present on the writer only
    pub sink: Option<Box<dyn WriteSink>>,
}

/// Settings every agent of a run shares
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    /// Upper bound (exclusive) of the simulated per-item latency
    pub max_delay: Duration,

    /// Probability that an attempt succeeds
    pub success_rate: f64,

    /// Upper bound on items discovered per processor
    pub discovery_max: usize,

    /// Base seed; `None` seeds from the OS
    pub seed: Option<u64>,

    /// SQLite output for the writer; `None` logs instead
    pub output_path: Option<PathBuf>,

    /// Rows per SQLite transaction
    pub batch_size: usize,

    /// Identifier recorded with every row
    pub run_id: String,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_millis(3000),
            success_rate: 0.8,
            discovery_max: 100,
            seed: None,
            output_path: None,
            batch_size: 1000,
            run_id: String::new(),
        }
    }
}

impl AgentSettings {
    /// Build the kit for one slot.
    ///
    /// Each slot draws from two RNG streams derived from the base seed, one
    /// for attempts and one for discovery, so seeded runs are reproducible
    /// per slot.
    pub fn build_kit(&self, spec: SpawnSpec) -> Result<AgentKit> {
        let stream = spec.slot as u64 * 2;
        let attempt = RandomAttempt::new(
            seeded_rng(self.seed, stream),
            self.max_delay,
            self.success_rate,
        );

        let (source, sink): (Box<dyn ItemSource>, Option<Box<dyn WriteSink>>) = match spec.role {
            Role::Processor => (
                Box::new(RandomSource::new(seeded_rng(self.seed, stream + 1), self.discovery_max)),
                None,
            ),
            Role::Writer => {
                let sink: Box<dyn WriteSink> = match &self.output_path {
                    Some(path) => {
                        debug!(path = %path.display(), "Writer using SQLite sink");
                        Box::new(SqliteSink::create(path, &self.run_id, self.batch_size)?)
                    }
                    None => Box::new(LogSink::default()),
                };
                (Box::new(FixedSource::default()), Some(sink))
            }
        };

        Ok(AgentKit {
            attempt: Box::new(attempt),
            source,
            sink,
        })
    }
}
