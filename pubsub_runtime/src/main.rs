//! # PubSub RT Binary
//!
//! Loads a PubSub configuration, builds the cache and runs one thread per
//! publisher and subscriber connection until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Run with the sample configuration
//! pubsub_rt --config pubsub_runtime/config/pubsub.toml
//!
//! # Verbose logging, JSON output
//! pubsub_rt --config pubsub.toml -v --json
//!
//! # Run for ten seconds, then print the cache
//! pubsub_rt --config pubsub.toml --run-for-secs 10 --dump-cache
//! ```

use clap::Parser;
use pubsub_common::config::{ConfigLoader, LogLevel};
use pubsub_common::pubsub::config::PubSubConfig;
use pubsub_runtime::{PubSubRuntime, RuntimeReport};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Supervisor poll period of the main thread.
const SUPERVISE_INTERVAL: Duration = Duration::from_millis(100);

/// PubSub RT - OPC UA PubSub publisher and subscriber loops
#[derive(Parser, Debug)]
#[command(name = "pubsub_rt")]
#[command(version)]
#[command(about = "Real-time OPC UA PubSub publisher and subscriber loops")]
#[command(long_about = None)]
struct Args {
    /// Path to the PubSub configuration file.
    #[arg(short, long, default_value = "/etc/pubsub/pubsub.toml")]
    config: PathBuf,

    /// Enable verbose logging (overrides `log_level` from the config)
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Stop after this many seconds instead of waiting for a signal
    #[arg(long, value_name = "SECS")]
    run_for_secs: Option<u64>,

    /// Print the cache contents after the loops stopped
    #[arg(long)]
    dump_cache: bool,

    /// Print the cache as JSON instead of the line listing
    #[arg(long, requires = "dump_cache")]
    dump_json: bool,
}

fn main() {
    if let Err(e) = run() {
        // Tracing may not be up yet when the config fails to load.
        eprintln!("pubsub_rt failed: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = PubSubConfig::load(&args.config)?;
    setup_tracing(&args, config.shared.log_level);

    info!("PubSub RT v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", args.config.display());

    let mut runtime = PubSubRuntime::initialize(config)?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(false, Ordering::SeqCst);
    })?;

    runtime.start()?;

    let stop_at = args
        .run_for_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    while running.load(Ordering::SeqCst) {
        if stop_at.is_some_and(|at| Instant::now() >= at) {
            info!("Run time elapsed");
            break;
        }
        let finished = runtime.finished_loops();
        if !finished.is_empty() {
            error!("Loops ended unexpectedly: {}", finished.join(", "));
            break;
        }
        std::thread::sleep(SUPERVISE_INTERVAL);
    }

    let report = runtime.stop();
    log_report(&report);

    if args.dump_cache {
        if args.dump_json {
            println!("{}", runtime.cache().snapshot_json()?);
        } else {
            print!("{}", runtime.cache().dump());
        }
    }

    runtime.shutdown();

    info!("PubSub RT shutdown complete");
    if !report.is_clean() {
        return Err("one or more loops failed".into());
    }
    Ok(())
}

fn log_report(report: &RuntimeReport) {
    for p in &report.publishers {
        match &p.result {
            Ok(stats) => info!(
                publisher = %p.name,
                cycles = stats.cycles.cycle_count,
                avg_cycle_us = stats.cycles.avg_cycle_us(),
                max_cycle_us = stats.cycles.max_cycle_us,
                overruns = stats.overruns,
                sent = stats.sent,
                send_failures = stats.send_failures,
                "Publisher summary"
            ),
            Err(e) => warn!(publisher = %p.name, "Publisher failed: {e}"),
        }
    }
    for s in &report.subscribers {
        match &s.result {
            Ok(stats) => info!(
                subscriber = %s.name,
                frames = stats.frames,
                discarded = stats.discarded,
                values_written = stats.values_written,
                values_refused = stats.values_refused,
                receive_errors = stats.receive_errors,
                "Subscriber summary"
            ),
            Err(e) => warn!(subscriber = %s.name, "Subscriber failed: {e}"),
        }
    }
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, log_level: LogLevel) {
    let filter = if args.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_filter()))
    };

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
