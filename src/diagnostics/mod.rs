//! # Diagnostics
//!
//! Self-test suite for the connection layer.
//!
//! - [`collaborators`]: The services under test and their reports
//! - [`host`]: Implementations backed by the local machine
//! - [`report`]: Test results and their text form
//! - [`runner`]: Runs the suite and the stress test in the background

pub mod collaborators;
pub mod host;
pub mod report;
pub mod runner;

pub use collaborators::{
    BatteryOptimization, BatteryStatus, ConnectionManager, ConnectionProbe, DiagnosticReport,
    DiagnosticTool, HealthMetrics, HealthMonitor, HealthReport, LifecycleMonitor, LifecycleReport,
    OverallHealth, RiskLevel, Stability,
};
pub use report::{StressReport, TestCase, TestResult, TestResults};
pub use runner::{Collaborators, DiagnosticRunner, RunStatus};
