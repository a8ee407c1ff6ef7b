//! jobherd - Coordinator and Worker-Pool Job Distribution
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use jobherd::config::{CliArgs, Command, RunConfig, Transport};
use jobherd::engine::Coordinator;
use jobherd::progress::{print_header, print_summary, ProgressReporter};
use jobherd::transport::worker_main::run_worker_main;
use jobherd::transport::{ProcessSpawner, Spawner, ThreadSpawner};
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code after a second Ctrl-C
const INTERRUPTED_EXIT: i32 = 130;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    if let Some(Command::Worker(worker)) = &args.command {
        return run_worker_main(worker.clone()).context("Worker failed");
    }

    // Validate and create config
    let config = RunConfig::from_args(args).context("Invalid configuration")?;

    let output = config
        .agent
        .output_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "log".to_string());

    if config.show_progress {
        print_header(&config, &output);
    }

    let spawner: Box<dyn Spawner> = match config.transport {
        Transport::Thread => Box::new(ThreadSpawner::from_settings(config.agent.clone())),
        Transport::Process => Box::new(
            ProcessSpawner::new(config.agent.clone()).context("Failed to locate own executable")?,
        ),
    };

    let mut coordinator =
        Coordinator::spawn(config.clone(), spawner.as_ref()).context("Failed to start workers")?;

    // Setup signal handler: the first Ctrl-C halts, the second exits
    let halt_switch = coordinator.halt_switch();
    let interrupted = Arc::new(AtomicBool::new(false));
    ctrlc::set_handler(move || {
        if interrupted.swap(true, Ordering::SeqCst) {
            eprintln!("\nSecond interrupt, exiting");
            std::process::exit(INTERRUPTED_EXIT);
        }
        eprintln!("\nInterrupt received, halting (press Ctrl-C again to exit)...");
        halt_switch.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    // Create progress reporter
    let progress = if config.show_progress {
        Some(Rc::new(ProgressReporter::new()))
    } else {
        None
    };

    if let Some(p) = &progress {
        p.set_status("Waiting for workers...");
        let reporter = Rc::clone(p);
        coordinator = coordinator.with_progress(move |snapshot| reporter.update(snapshot));
    }

    // Run
    let report = coordinator.run().context("Run failed")?;

    // Finish progress
    if let Some(p) = &progress {
        p.finish("Run completed");
    }

    if config.show_progress {
        print_summary(&report, &output);
    }

    if !report.is_balanced() {
        info!(
            discovered = report.discovered,
            succeeded = report.succeeded,
            failure_data = report.failure_data(),
            "Recorded counts do not match discovery"
        );
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("jobherd=debug,warn")
    } else {
        EnvFilter::new("jobherd=info,warn")
    };

    // stdout is the message channel of worker processes
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
