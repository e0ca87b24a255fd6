//! Output sinks for the reporter.
//!
//! The report itself goes to a line writer; warnings (swap timeouts, join
//! problems) go to a separate diagnostic sink so they never interleave
//! with the report stream.

use tracing::warn;

/// Destination for formatted report blocks.
pub trait ReportSink: Send {
    fn emit(&mut self, line: &str);
}

/// Writes reports to stdout.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&mut self, line: &str) {
        println!("{}", line);
    }
}

/// Destination for warnings.
pub trait DiagnosticSink: Send {
    fn warn(&mut self, message: &str);
}

/// Routes warnings through the tracing subscriber.
#[derive(Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticSink for TracingDiagnostics {
    fn warn(&mut self, message: &str) {
        warn!("{}", message);
    }
}
