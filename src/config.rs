//! Configuration types for jobherd
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - The hidden `worker` subcommand used by the process transport
//! - Runtime configuration with validation

use crate::agent::AgentSettings;
use crate::engine::slot::Role;
use crate::error::ConfigError;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

/// Smallest pool: one writer plus one processor
const MIN_CLUSTER_SIZE: usize = 2;

/// Maximum reasonable pool size
const MAX_CLUSTER_SIZE: usize = 512;

/// How long `stop` waits for each worker before giving up on it
const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Coordinator and worker-pool job distribution engine
#[derive(Parser, Debug, Clone)]
#[command(
    name = "jobherd",
    version,
    about = "Coordinator and worker-pool job distribution engine",
    long_about = "Spawns a pool of workers, discovers a batch of items, partitions them across \
                  the processors and routes every outcome to a dedicated writer.\n\n\
                  The run ends when the halt budget expires (or on Ctrl-C); items that were \
                  not processed by then are recorded as failure data.",
    after_help = "EXAMPLES:\n    \
        jobherd -n 8 --halt-after 60\n    \
        jobherd --max-delay-ms 200 --finish-when-drained -o run.db\n    \
        jobherd --transport process --seed 42 -v",
    args_conflicts_with_subcommands = true
)]
pub struct CliArgs {
    /// Subcommand (internal)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Number of workers, including the writer in slot 0
    #[arg(short = 'n', long, default_value = "5", value_name = "NUM")]
    pub cluster_size: usize,

    /// Seconds until the coordinator broadcasts halt
    #[arg(long, default_value = "300", value_name = "SECS")]
    pub halt_after: u64,

    /// Extra divisor applied to the per-processor partition size
    #[arg(long, default_value = "3", value_name = "NUM")]
    pub partition_divisor: usize,

    /// Items sent to a worker after it reports a success
    #[arg(long, value_enum, default_value_t = RefillPolicy::Partition)]
    pub refill: RefillPolicy,

    /// Give up on an item after this many failures (unlimited if not set)
    #[arg(long, value_name = "NUM")]
    pub max_attempts: Option<u32>,

    /// Halt as soon as every item has an outcome
    #[arg(long)]
    pub finish_when_drained: bool,

    /// Seconds to wait for workers to drain after halt
    #[arg(long, default_value = "10", value_name = "SECS")]
    pub drain_grace: u64,

    /// Upper bound of the simulated per-item latency
    #[arg(long, default_value = "3000", value_name = "MS")]
    pub max_delay_ms: u64,

    /// Probability that a simulated attempt succeeds
    #[arg(long, default_value = "0.8", value_name = "RATE")]
    pub success_rate: f64,

    /// Upper bound on items discovered per processor
    #[arg(long, default_value = "100", value_name = "NUM")]
    pub discovery_max: usize,

    /// Seed for reproducible runs
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Worker transport
    #[arg(long, value_enum, default_value_t = Transport::Thread)]
    pub transport: Transport,

    /// SQLite database for the writer's records (log only if not set)
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// SQLite batch insert size
    #[arg(short = 'b', long, default_value = "1000", value_name = "NUM")]
    pub batch_size: usize,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run a single worker over stdin/stdout (spawned by the process transport)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Arguments of the hidden `worker` subcommand
#[derive(Args, Debug, Clone, PartialEq)]
pub struct WorkerArgs {
    /// Slot index in the pool
    #[arg(long)]
    pub slot: usize,

    /// writer or processor
    #[arg(long)]
    pub role: Role,

    #[arg(long, default_value = "3000")]
    pub max_delay_ms: u64,

    #[arg(long, default_value = "0.8")]
    pub success_rate: f64,

    #[arg(long, default_value = "100")]
    pub discovery_max: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    #[arg(long, default_value = "")]
    pub run_id: String,
}

impl WorkerArgs {
    /// Arguments that reproduce `settings` for one slot
    pub fn for_slot(slot: usize, role: Role, settings: &AgentSettings) -> Self {
        Self {
            slot,
            role,
            max_delay_ms: settings.max_delay.as_millis() as u64,
            success_rate: settings.success_rate,
            discovery_max: settings.discovery_max,
            seed: settings.seed,
            output: settings.output_path.clone(),
            batch_size: settings.batch_size,
            run_id: settings.run_id.clone(),
        }
    }

    /// Command-line form, starting with the subcommand name
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec![
            "worker".to_string(),
            "--slot".to_string(),
            self.slot.to_string(),
            "--role".to_string(),
            self.role.to_string(),
            "--max-delay-ms".to_string(),
            self.max_delay_ms.to_string(),
            "--success-rate".to_string(),
            self.success_rate.to_string(),
            "--discovery-max".to_string(),
            self.discovery_max.to_string(),
            "--batch-size".to_string(),
            self.batch_size.to_string(),
            "--run-id".to_string(),
            self.run_id.clone(),
        ];
        if let Some(seed) = self.seed {
            argv.push("--seed".to_string());
            argv.push(seed.to_string());
        }
        if let Some(output) = &self.output {
            argv.push("--output".to_string());
            argv.push(output.display().to_string());
        }
        argv
    }

    /// Settings the worker builds its kit from
    pub fn settings(&self) -> AgentSettings {
        AgentSettings {
            max_delay: Duration::from_millis(self.max_delay_ms),
            success_rate: self.success_rate,
            discovery_max: self.discovery_max,
            seed: self.seed,
            output_path: self.output.clone(),
            batch_size: self.batch_size,
            run_id: self.run_id.clone(),
        }
    }
}

/// How many items a worker gets after reporting a success
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefillPolicy {
    /// A full partition
    #[default]
    Partition,
    /// One item
    Single,
}

/// Where workers run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    /// Threads of this process
    #[default]
    Thread,
    /// Child processes speaking JSON lines
    Process,
}

/// Validated runtime configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Pool size including the writer
    pub cluster_size: usize,

    /// Time until halt is broadcast
    pub halt_after: Duration,

    /// Extra divisor for the partition size
    pub partition_divisor: usize,

    /// Refill size after a success
    pub refill: RefillPolicy,

    /// Failures before an item is abandoned
    pub max_attempts: Option<u32>,

    /// Halt once every item has an outcome
    pub finish_when_drained: bool,

    /// How long to wait for drained workers after halt
    pub drain_grace: Duration,

    /// How long to wait for each worker to exit
    pub stop_timeout: Duration,

    /// Worker transport
    pub transport: Transport,

    /// Settings handed to every agent
    pub agent: AgentSettings,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            cluster_size: 5,
            halt_after: Duration::from_secs(300),
            partition_divisor: 3,
            refill: RefillPolicy::Partition,
            max_attempts: None,
            finish_when_drained: false,
            drain_grace: Duration::from_secs(10),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            transport: Transport::Thread,
            agent: AgentSettings::default(),
            show_progress: false,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        if args.cluster_size < MIN_CLUSTER_SIZE || args.cluster_size > MAX_CLUSTER_SIZE {
            return Err(ConfigError::InvalidClusterSize {
                count: args.cluster_size,
                min: MIN_CLUSTER_SIZE,
                max: MAX_CLUSTER_SIZE,
            });
        }

        if args.partition_divisor == 0 {
            return Err(ConfigError::ZeroPartitionDivisor);
        }

        if !(0.0..=1.0).contains(&args.success_rate) {
            return Err(ConfigError::InvalidSuccessRate {
                rate: args.success_rate,
            });
        }

        if args.halt_after == 0 {
            return Err(ConfigError::ZeroHaltBudget);
        }

        if args.max_attempts == Some(0) {
            return Err(ConfigError::ZeroRetryLimit);
        }

        if let Some(output) = &args.output {
            validate_output_path(output)?;
        }

        Ok(Self {
            cluster_size: args.cluster_size,
            halt_after: Duration::from_secs(args.halt_after),
            partition_divisor: args.partition_divisor,
            refill: args.refill,
            max_attempts: args.max_attempts,
            finish_when_drained: args.finish_when_drained,
            drain_grace: Duration::from_secs(args.drain_grace),
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            transport: args.transport,
            agent: AgentSettings {
                max_delay: Duration::from_millis(args.max_delay_ms),
                success_rate: args.success_rate,
                discovery_max: args.discovery_max,
                seed: args.seed,
                output_path: args.output,
                batch_size: args.batch_size.max(1),
                run_id: Uuid::new_v4().to_string(),
            },
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Number of processor slots
    pub fn processor_count(&self) -> usize {
        self.cluster_size.saturating_sub(1)
    }
}

fn validate_output_path(path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            return Err(ConfigError::InvalidOutputPath {
                path: path.to_path_buf(),
                reason: format!("Parent directory '{}' does not exist", parent.display()),
            });
        }
    }
    Ok(())
}
