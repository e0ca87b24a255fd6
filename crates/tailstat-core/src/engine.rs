//! Host facade.
//!
//! Wires the bus, registry, processor, worker pool, and reporter together
//! and exposes `start` / `stop` to the process host. The engine owns every
//! component for the lifetime of the process; nothing in the core is a
//! global.
//!
//! Startup order: workers, then the reporter, then the event producer, so
//! the first event ever delivered already has consumers. Shutdown reverses
//! the flow: the producer goes quiet, the bus stops accepting and drains,
//! the workers exit, and the reporter emits its final report. `stop` is
//! idempotent.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::bus::EventBus;
use crate::config::{ConfigError, CoreConfig};
use crate::coordinator::Coordinator;
use crate::event::FsEvent;
use crate::mem::{MemoryProbe, NoopMemoryProbe};
use crate::pipeline::FileProcessor;
use crate::registry::FileRegistry;
use crate::reporter::sink::{ConsoleSink, DiagnosticSink, ReportSink, TracingDiagnostics};
use crate::reporter::Reporter;
use crate::stats::swap::WorkerStats;

/// Callback through which a producer delivers events into the engine.
pub type PublishFn = Arc<dyn Fn(FsEvent) + Send + Sync>;

/// Source of filesystem events. After `start`, the producer delivers
/// events through the callback until `stop`; it must never block on the
/// callback (publishing is non-blocking by construction) and must swallow
/// and count its own internal errors rather than raising from delivery.
pub trait EventProducer: Send {
    fn start(&mut self, publish: PublishFn) -> Result<(), String>;
    fn stop(&mut self);
}

/// Errors surfaced by the facade. Everything below this boundary reports
/// through status codes and counters instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to spawn a core thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to start event producer: {0}")]
    Producer(String),
    #[error("engine already started")]
    AlreadyStarted,
}

/// The assembled processing core.
pub struct Engine {
    bus: Arc<EventBus>,
    registry: Arc<FileRegistry>,
    coordinator: Coordinator,
    reporter: Reporter,
    producer: Box<dyn EventProducer>,
    started: bool,
    stopped: bool,
}

impl Engine {
    /// Builds an engine with console output, tracing diagnostics, and no
    /// allocator telemetry.
    pub fn new(config: CoreConfig, producer: Box<dyn EventProducer>) -> Result<Self, EngineError> {
        Self::with_sinks(
            config,
            producer,
            Box::new(ConsoleSink),
            Box::new(TracingDiagnostics),
            Arc::new(NoopMemoryProbe),
        )
    }

    /// Builds an engine with explicit output sinks and memory probe.
    /// Validates the configuration; nothing is spawned yet.
    pub fn with_sinks(
        config: CoreConfig,
        producer: Box<dyn EventProducer>,
        report_sink: Box<dyn ReportSink>,
        diagnostics: Box<dyn DiagnosticSink>,
        probe: Arc<dyn MemoryProbe>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let bus = Arc::new(EventBus::new(config.queue_capacity));
        let registry = Arc::new(FileRegistry::new());
        let processor = Arc::new(FileProcessor::new(0));
        let worker_stats: Vec<Arc<WorkerStats>> = (0..config.workers)
            .map(|_| Arc::new(WorkerStats::new()))
            .collect();

        let coordinator = Coordinator::new(
            Arc::clone(&bus),
            Arc::clone(&registry),
            processor,
            worker_stats.clone(),
            config.dequeue_timeout(),
        );
        let reporter = Reporter::new(
            Arc::clone(&bus),
            worker_stats,
            config.report_interval(),
            config.effective_ack_timeout(),
            config.top_k,
            report_sink,
            diagnostics,
            probe,
        );

        Ok(Self {
            bus,
            registry,
            coordinator,
            reporter,
            producer,
            started: false,
            stopped: false,
        })
    }

    /// Starts workers, reporter, and finally the producer.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.started {
            return Err(EngineError::AlreadyStarted);
        }
        self.started = true;

        self.coordinator.start()?;
        self.reporter.start()?;

        let bus = Arc::clone(&self.bus);
        let publish: PublishFn = Arc::new(move |event| {
            // Outcomes are tracked by the bus's own counters; the producer
            // has nothing useful to do with a drop.
            let _ = bus.publish(event);
        });
        if let Err(message) = self.producer.start(publish) {
            // Unwind the partial start so the caller holds a quiet engine.
            self.bus.stop();
            self.coordinator.stop();
            self.reporter.stop();
            self.stopped = true;
            return Err(EngineError::Producer(message));
        }

        info!(workers = self.coordinator.worker_count(), "engine started");
        Ok(())
    }

    /// Stops everything in reverse order. Safe to call more than once and
    /// before `start`; only the first call after a start does any work.
    pub fn stop(&mut self) {
        if !self.started || self.stopped {
            return;
        }
        self.stopped = true;

        self.producer.stop();
        self.bus.stop();
        self.coordinator.stop();
        self.reporter.stop();
        info!("engine stopped");
    }

    /// The engine's bus, for hosts that want the raw counters.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The engine's registry, for hosts and tests inspecting path state.
    pub fn registry(&self) -> &Arc<FileRegistry> {
        &self.registry
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Producer driven by hand from the test body.
    #[derive(Clone, Default)]
    struct ManualProducer {
        publish: Arc<Mutex<Option<PublishFn>>>,
        stops: Arc<Mutex<u32>>,
    }

    impl ManualProducer {
        fn emit(&self, event: FsEvent) {
            let guard = self.publish.lock().unwrap();
            let publish = guard.as_ref().expect("producer not started");
            publish(event);
        }

        fn stop_count(&self) -> u32 {
            *self.stops.lock().unwrap()
        }
    }

    impl EventProducer for ManualProducer {
        fn start(&mut self, publish: PublishFn) -> Result<(), String> {
            *self.publish.lock().unwrap() = Some(publish);
            Ok(())
        }

        fn stop(&mut self) {
            *self.stops.lock().unwrap() += 1;
            *self.publish.lock().unwrap() = None;
        }
    }

    struct FailingProducer;

    impl EventProducer for FailingProducer {
        fn start(&mut self, _publish: PublishFn) -> Result<(), String> {
            Err("no watch backend".to_string())
        }

        fn stop(&mut self) {}
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<String>>>);

    impl Capture {
        fn lines(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    impl ReportSink for Capture {
        fn emit(&mut self, line: &str) {
            self.0.lock().unwrap().push(line.to_string());
        }
    }

    impl DiagnosticSink for Capture {
        fn warn(&mut self, message: &str) {
            self.0.lock().unwrap().push(message.to_string());
        }
    }

    fn engine_fixture(
        dir: &Path,
        interval_seconds: u64,
    ) -> (Engine, ManualProducer, Capture, Capture) {
        let config = CoreConfig {
            watch_path: dir.to_path_buf(),
            workers: 2,
            report_interval_seconds: interval_seconds,
            dequeue_timeout_ms: 20,
            ..CoreConfig::default()
        };
        let producer = ManualProducer::default();
        let sink = Capture::default();
        let diag = Capture::default();
        let engine = Engine::with_sinks(
            config,
            Box::new(producer.clone()),
            Box::new(sink.clone()),
            Box::new(diag.clone()),
            Arc::new(NoopMemoryProbe),
        )
        .unwrap();
        (engine, producer, sink, diag)
    }

    fn append(path: &Path, data: &str) {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .unwrap();
        f.write_all(data.as_bytes()).unwrap();
    }

    fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let end = Instant::now() + deadline;
        while Instant::now() < end {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn test_invalid_config_is_refused() {
        let config = CoreConfig {
            watch_path: PathBuf::from("/definitely/not/here"),
            ..CoreConfig::default()
        };
        let result = Engine::new(config, Box::new(ManualProducer::default()));
        assert!(matches!(result, Err(EngineError::Config(_))));
    }

    #[test]
    fn test_producer_failure_unwinds_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = CoreConfig {
            watch_path: dir.path().to_path_buf(),
            ..CoreConfig::default()
        };
        let mut engine = Engine::new(config, Box::new(FailingProducer)).unwrap();
        match engine.start() {
            Err(EngineError::Producer(message)) => assert!(message.contains("no watch backend")),
            other => panic!("unexpected {:?}", other),
        }
        // Already unwound; stop stays a no-op.
        engine.stop();
    }

    #[test]
    fn test_double_start_is_refused_and_stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, producer, _sink, _diag) = engine_fixture(dir.path(), 2);

        engine.start().unwrap();
        assert!(matches!(engine.start(), Err(EngineError::AlreadyStarted)));

        engine.stop();
        engine.stop();
        assert_eq!(producer.stop_count(), 1);
    }

    #[test]
    fn test_simple_tail_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, producer, sink, _diag) = engine_fixture(dir.path(), 1);
        let path = dir.path().join("a.log");

        engine.start().unwrap();
        for _ in 0..5 {
            append(&path, "2024-01-01T00:00:00Z INFO hello latency_ms=5\n");
            producer.emit(FsEvent::modified(path.clone()));
        }

        assert!(wait_until(Duration::from_secs(4), || {
            sink.lines().iter().any(|report| {
                report.contains("lines=5")
                    && report.contains("malformed=0")
                    && report.contains("p50=5ms p95=5ms p99=5ms")
                    && report.contains("hello: 5")
            })
        }));
        engine.stop();
    }

    #[test]
    fn test_delete_and_recreate_bumps_generation() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, producer, _sink, _diag) = engine_fixture(dir.path(), 1);
        let path = dir.path().join("b.log");

        engine.start().unwrap();
        append(&path, "2024-01-01T00:00:00Z INFO once\n");
        producer.emit(FsEvent::modified(path.clone()));
        assert!(wait_until(Duration::from_secs(2), || {
            engine.registry().try_get(&path).is_some()
        }));

        std::fs::remove_file(&path).unwrap();
        producer.emit(FsEvent::deleted(path.clone()));
        assert!(wait_until(Duration::from_secs(2), || {
            engine.registry().try_get(&path).is_none()
        }));

        append(&path, "2024-01-01T00:00:01Z INFO again\n");
        producer.emit(FsEvent::created(path.clone()));
        assert!(wait_until(Duration::from_secs(2), || {
            engine
                .registry()
                .try_get(&path)
                .is_some_and(|state| state.generation() == 2)
        }));
        engine.stop();
    }

    #[test]
    fn test_final_report_follows_stop() {
        let dir = tempfile::tempdir().unwrap();
        let (mut engine, producer, sink, _diag) = engine_fixture(dir.path(), 60);
        let path = dir.path().join("c.log");

        engine.start().unwrap();
        append(&path, "2024-01-01T00:00:00Z WARN tail-end\n");
        producer.emit(FsEvent::modified(path.clone()));
        assert!(wait_until(Duration::from_secs(2), || {
            engine.registry().try_get(&path).is_some()
        }));
        engine.stop();

        // The 60s interval never fired; the data only appears in the
        // final report.
        let lines = sink.lines();
        let last = lines.last().expect("final report missing");
        assert!(last.starts_with("elapsed=0.00"));
        assert!(last.contains("lines=1"));
        assert!(last.contains("tail-end: 1"));
    }
}
