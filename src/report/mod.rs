//! Check reports and the sinks that carry them upstream.

pub mod check;

pub use check::{AGENT_NAME, CheckOutcome, CheckReport, CollectingSink, JsonLineSink, ReportSink, run_check};
