//! tailstatd - Real-time log statistics daemon.
//!
//! Watches a directory for `.log` / `.txt` changes, tails appended bytes,
//! and prints rolling statistics (line rates, level counts, top message
//! keys, latency percentiles, queue health) to the console every interval.

use tikv_jemallocator::Jemalloc;
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod alloc;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use tailstat_core::config::CoreConfig;
use tailstat_core::engine::Engine;
use tailstat_core::reporter::sink::{ConsoleSink, TracingDiagnostics};
use tailstat_core::watch::DirectoryWatcher;

use alloc::JemallocProbe;

/// Real-time log statistics daemon.
#[derive(Parser)]
#[command(name = "tailstatd", about = "Real-time log statistics daemon", version)]
struct Args {
    /// Directory to watch for .log / .txt files.
    path: PathBuf,

    /// Report interval in seconds.
    #[arg(short, long, default_value = "2")]
    interval: u64,

    /// Number of worker threads. Defaults to the CPU count.
    #[arg(short, long)]
    workers: Option<usize>,

    /// Event queue capacity; overflow drops the newest events.
    #[arg(long, default_value = "10000")]
    queue_capacity: usize,

    /// Number of top message keys shown per report.
    #[arg(long, default_value = "10")]
    top_k: usize,

    /// Worker dequeue timeout in milliseconds.
    #[arg(long, default_value = "200")]
    dequeue_timeout_ms: u64,

    /// Swap acknowledgement timeout in seconds.
    /// Defaults to max(1, 1.5 x interval).
    #[arg(long)]
    ack_timeout: Option<u64>,

    /// Announce files already in the directory at startup.
    #[arg(long)]
    seed_existing: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

/// Initializes the tracing subscriber with the appropriate log level.
/// Default level is INFO. Use -q for quiet mode (errors only).
fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("tailstatd={}", level).parse().unwrap())
        .add_directive(format!("tailstat_core={}", level).parse().unwrap());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = CoreConfig {
        watch_path: args.path.clone(),
        workers: args.workers.unwrap_or_else(|| {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
        }),
        queue_capacity: args.queue_capacity,
        report_interval_seconds: args.interval,
        top_k: args.top_k,
        dequeue_timeout_ms: args.dequeue_timeout_ms,
        ack_timeout: args.ack_timeout.map(Duration::from_secs),
    };

    info!("tailstatd {} starting", env!("CARGO_PKG_VERSION"));
    info!(
        "Config: watch={}, workers={}, interval={}s, queue={}, top_k={}",
        config.watch_path.display(),
        config.workers,
        config.report_interval_seconds,
        config.queue_capacity,
        config.top_k,
    );

    let mut producer = DirectoryWatcher::new(config.watch_path.clone());
    if args.seed_existing {
        producer = producer.with_seed_existing();
    }
    let mut engine = match Engine::with_sinks(
        config,
        Box::new(producer),
        Box::new(ConsoleSink),
        Box::new(TracingDiagnostics),
        Arc::new(JemallocProbe),
    ) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = engine.start() {
        error!("Failed to start: {}", e);
        return ExitCode::FAILURE;
    }

    // Graceful shutdown on Ctrl-C.
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to set Ctrl-C handler: {}", e);
    }

    info!("Watching; press Ctrl-C to stop");
    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(100));
    }

    info!("Shutting down...");
    engine.stop();
    info!("Shutdown complete");
    ExitCode::SUCCESS
}
