//! # Diagnostic Runner
//!
//! Runs the fixed suite of test groups off the interactive side and posts
//! the aggregate as [`Event::DiagnosticsFinished`].
//!
//! | # | Group | Collaborator |
//! |---|-------|--------------|
//! | 1 | Service Availability | connection manager |
//! | 2 | Connection Manager | connection manager |
//! | 3 | Health Monitoring | health monitor |
//! | 4 | Battery Optimization | battery optimization |
//! | 5 | Service Lifecycle | lifecycle monitor |
//! | 6 | Diagnostic Tools | diagnostic tool |
//!
//! Groups run one at a time with a pause between them. A group that errors
//! or panics is recorded as one failed assertion and the run continues.
//! Only one run (suite or stress test) is active at a time.

use chrono::Local;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::config::DiagnosticSettings;
use crate::error::ScrapPosError;
use crate::event::{Event, EventSender, Outcome, spawn_worker};
use crate::printer::Printer;

use super::collaborators::{
    BatteryOptimization, ConnectionManager, ConnectionProbe, DiagnosticTool, HealthMonitor,
    LifecycleMonitor,
};
use super::host::{
    CompositeDiagnosticTool, FileHealthMonitor, HostBatteryStatus, ProcessLifecycleMonitor,
    RandomConnectionProbe, RfcommConnectionManager,
};
use super::report::{StressReport, TestCase, TestResults};

pub const ALREADY_RUNNING: &str = "Tests already running";
pub const NOT_READY_FOR_STRESS: &str = "Service not ready for stress test";

/// Everything the suite inspects.
#[derive(Clone)]
pub struct Collaborators {
    /// `None` when the connection service could not be created
    pub manager: Option<Arc<dyn ConnectionManager>>,
    pub health: Arc<dyn HealthMonitor>,
    pub battery: Arc<dyn BatteryOptimization>,
    pub lifecycle: Arc<dyn LifecycleMonitor>,
    pub tool: Arc<dyn DiagnosticTool>,
    pub probe: Arc<dyn ConnectionProbe>,
}

impl Collaborators {
    /// Host-backed collaborators around `printer`.
    pub fn host(
        printer: Arc<dyn Printer>,
        device: &str,
        health_path: &Path,
        settings: &DiagnosticSettings,
    ) -> Result<Self, ScrapPosError> {
        let manager: Arc<dyn ConnectionManager> =
            Arc::new(RfcommConnectionManager::new(printer, device));
        let health: Arc<dyn HealthMonitor> = Arc::new(FileHealthMonitor::open(health_path)?);
        let battery: Arc<dyn BatteryOptimization> = Arc::new(HostBatteryStatus);
        let lifecycle: Arc<dyn LifecycleMonitor> = Arc::new(ProcessLifecycleMonitor::new());
        let tool = Arc::new(CompositeDiagnosticTool::new(
            manager.clone(),
            health.clone(),
            battery.clone(),
            lifecycle.clone(),
        ));
        Ok(Self {
            manager: Some(manager),
            health,
            battery,
            lifecycle,
            tool,
            probe: Arc::new(RandomConnectionProbe::new(
                settings.simulated_connection_success_rate,
            )),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Started,
    /// The failure has already been posted
    Rejected,
}

/// Clears the running flag when the worker finishes, panics included.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct DiagnosticRunner {
    collaborators: Arc<Collaborators>,
    settings: DiagnosticSettings,
    sender: EventSender,
    running: Arc<AtomicBool>,
}

impl DiagnosticRunner {
    pub fn new(collaborators: Collaborators, settings: DiagnosticSettings, sender: EventSender) -> Self {
        Self {
            collaborators: Arc::new(collaborators),
            settings,
            sender,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the full suite in the background.
    pub fn run_comprehensive(&self) -> RunStatus {
        let Some(guard) = self.acquire() else {
            tracing::warn!("Diagnostics requested while a run is active");
            self.sender
                .post(Event::DiagnosticsFinished(Outcome::Failure(ALREADY_RUNNING.into())));
            return RunStatus::Rejected;
        };

        let collaborators = self.collaborators.clone();
        let pause = self.settings.group_pause();
        spawn_worker(
            "diagnostics",
            self.sender.clone(),
            move || {
                let _guard = guard;
                Outcome::Success(run_suite(&collaborators, pause))
            },
            Event::DiagnosticsFinished,
        );
        RunStatus::Started
    }

    /// Repeat a connection attempt `iterations` times in the background.
    pub fn run_stress_test(&self, iterations: u32) -> RunStatus {
        let ready = self
            .collaborators
            .manager
            .as_ref()
            .is_some_and(|m| m.is_service_ready());
        if !ready {
            self.sender
                .post(Event::StressTestFinished(Outcome::Failure(NOT_READY_FOR_STRESS.into())));
            return RunStatus::Rejected;
        }
        let Some(guard) = self.acquire() else {
            self.sender
                .post(Event::StressTestFinished(Outcome::Failure(ALREADY_RUNNING.into())));
            return RunStatus::Rejected;
        };

        tracing::info!("Starting connection stress test with {} iterations", iterations);
        let collaborators = self.collaborators.clone();
        let delay = self.settings.stress_iteration_delay();
        spawn_worker(
            "stress test",
            self.sender.clone(),
            move || {
                let _guard = guard;
                Outcome::Success(stress(&collaborators, iterations, delay))
            },
            Event::StressTestFinished,
        );
        RunStatus::Started
    }

    fn acquire(&self) -> Option<RunningGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunningGuard(self.running.clone()))
    }
}

// ============================================================================
// SUITE
// ============================================================================

type Group = fn(&Collaborators, &mut TestCase) -> Result<(), ScrapPosError>;

const GROUPS: [(&str, &str, Group); 6] = [
    ("Service Availability", "Service availability test", service_availability),
    ("Connection Manager", "Connection manager test", connection_manager),
    ("Health Monitoring", "Health monitoring test", health_monitoring),
    ("Battery Optimization", "Battery optimization test", battery_optimization),
    ("Service Lifecycle", "Lifecycle test", service_lifecycle),
    ("Diagnostic Tools", "Diagnostic test", diagnostic_tools),
];

/// Run every group in order and collect the results.
pub fn run_suite(collaborators: &Collaborators, pause: Duration) -> TestResults {
    let mut results = TestResults::new(Local::now().naive_local());

    for (i, (name, label, group)) in GROUPS.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            std::thread::sleep(pause);
        }
        tracing::debug!("Running {} group", name);
        results.cases.push(run_group(collaborators, name, label, *group));
    }

    tracing::info!(
        "Diagnostics complete: {}/{} passed",
        results.passed_tests(),
        results.total_tests()
    );
    results
}

fn run_group(collaborators: &Collaborators, name: &str, label: &str, group: Group) -> TestCase {
    let mut case = TestCase::new(name);
    let error = match panic::catch_unwind(AssertUnwindSafe(|| group(collaborators, &mut case))) {
        Ok(Ok(())) => return case,
        Ok(Err(e)) => e.to_string(),
        Err(payload) => panic_message(payload.as_ref()),
    };

    tracing::warn!("{} group failed: {}", name, error);
    let mut failed = TestCase::new(name);
    failed.add(label, false, format!("Exception: {}", error));
    failed
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn service_availability(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let Some(manager) = &c.manager else {
        case.add("Connection manager exists", false, "Manager is null");
        case.add("Service ready", false, "Service not ready");
        case.add("Service status check", false, "Cannot get status");
        return Ok(());
    };

    case.add("Connection manager exists", true, "Manager instance available");
    let ready = manager.is_service_ready();
    case.add(
        "Service ready",
        ready,
        if ready { "Service is ready" } else { "Service not ready" },
    );
    case.add(
        "Service status check",
        true,
        format!("Status: {}", manager.connection_status()),
    );
    Ok(())
}

fn connection_manager(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let Some(manager) = &c.manager else {
        case.add("Connection manager test", false, "Manager is null");
        return Ok(());
    };

    let healthy = manager.is_healthy();
    case.add(
        "Manager health",
        healthy,
        if healthy { "Manager is healthy" } else { "Manager has issues" },
    );
    case.add(
        "Connection status",
        true,
        format!("Status: {}", manager.connection_status()),
    );
    let info = manager.diagnostic_info();
    case.add(
        "Diagnostic info",
        !info.is_empty(),
        format!("Diagnostics available: {} chars", info.chars().count()),
    );
    Ok(())
}

fn health_monitoring(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let report = c.health.health_report()?;
    case.add("Health report generation", true, "Report generated successfully");
    case.add(
        "Health assessment",
        true,
        format!("Health score: {:.1}%", report.health_score),
    );
    case.add(
        "Service health status",
        report.is_healthy,
        if report.is_healthy { "Service is healthy" } else { "Service has health issues" },
    );
    Ok(())
}

fn battery_optimization(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let status = c.battery.battery_status()?;
    case.add("Battery status check", true, "Status retrieved");
    case.add(
        "Battery optimization status",
        status.is_whitelisted,
        if status.is_whitelisted { "App is whitelisted" } else { "App may be optimized" },
    );
    case.add("Battery risk level", true, format!("Risk: {}", status.risk_level));
    Ok(())
}

fn service_lifecycle(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let running = c.lifecycle.is_service_running();
    case.add(
        "Service running",
        running,
        if running { "Service is running" } else { "Service is not running" },
    );
    let report = c.lifecycle.lifecycle_report()?;
    case.add("Lifecycle report", true, "Report generated");
    case.add("Service stability", true, format!("Stability: {}", report.stability));
    Ok(())
}

fn diagnostic_tools(c: &Collaborators, case: &mut TestCase) -> Result<(), ScrapPosError> {
    let report = c.tool.comprehensive_report()?;
    case.add("Diagnostic report generation", true, "Report generated");
    case.add(
        "Overall health assessment",
        true,
        format!("Health: {}", report.overall_health),
    );
    case.add(
        "Recommendations available",
        !report.recommendations.is_empty(),
        format!("{} recommendations", report.recommendations.len()),
    );
    Ok(())
}

// ============================================================================
// STRESS TEST
// ============================================================================

fn stress(c: &Collaborators, iterations: u32, delay: Duration) -> StressReport {
    let mut successes = 0;
    for i in 0..iterations {
        tracing::debug!("Stress test iteration {}/{}", i + 1, iterations);

        let success = c.probe.attempt();
        if success {
            successes += 1;
        }
        if let Err(e) = c.health.record_connection(success) {
            tracing::warn!("Failed to record connection attempt: {}", e);
        }

        if i + 1 < iterations && !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    let report = StressReport {
        timestamp: Local::now().naive_local(),
        iterations,
        successes,
    };
    tracing::info!("Stress test complete: {} success rate", report.success_rate_text());
    report
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::collaborators::{
        BatteryStatus, DiagnosticReport, HealthMetrics, HealthReport, LifecycleReport,
    };
    use crate::event::{self, EventLoop};
    use crate::receipt::golden_datetime;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use std::sync::mpsc;

    struct FakeManager {
        ready: bool,
    }

    impl ConnectionManager for FakeManager {
        fn is_service_ready(&self) -> bool {
            self.ready
        }
        fn is_healthy(&self) -> bool {
            self.ready
        }
        fn is_connected(&self) -> bool {
            false
        }
        fn connection_status(&self) -> String {
            "Not connected".into()
        }
        fn diagnostic_info(&self) -> String {
            "fake".into()
        }
    }

    #[derive(Default)]
    struct FakeHealth {
        fail: bool,
        recorded: Mutex<Vec<bool>>,
    }

    impl HealthMonitor for FakeHealth {
        fn health_report(&self) -> Result<HealthReport, ScrapPosError> {
            if self.fail {
                return Err(ScrapPosError::Diagnostic("metrics unavailable".into()));
            }
            let metrics = HealthMetrics {
                connection_attempts: 1,
                successful_connections: 1,
                last_weight_reading_millis: Some(0),
                ..Default::default()
            };
            Ok(HealthReport::assess(metrics, 0))
        }

        fn record_connection(&self, success: bool) -> Result<(), ScrapPosError> {
            self.recorded.lock().unwrap().push(success);
            Ok(())
        }
    }

    struct FakeLifecycle;

    impl LifecycleMonitor for FakeLifecycle {
        fn is_service_running(&self) -> bool {
            true
        }
        fn lifecycle_report(&self) -> Result<LifecycleReport, ScrapPosError> {
            Ok(LifecycleReport::assess(true, Duration::from_secs(60), 0, None))
        }
    }

    struct PanickingBattery;

    impl BatteryOptimization for PanickingBattery {
        fn battery_status(&self) -> Result<BatteryStatus, ScrapPosError> {
            panic!("battery service crashed");
        }
    }

    /// Blocks until released, so a run can be held open.
    struct GatedTool {
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl DiagnosticTool for GatedTool {
        fn comprehensive_report(&self) -> Result<DiagnosticReport, ScrapPosError> {
            self.release.lock().unwrap().recv().unwrap();
            Ok(instant_report())
        }
    }

    struct InstantTool;

    impl DiagnosticTool for InstantTool {
        fn comprehensive_report(&self) -> Result<DiagnosticReport, ScrapPosError> {
            Ok(instant_report())
        }
    }

    fn instant_report() -> DiagnosticReport {
        DiagnosticReport::assess(
            golden_datetime(),
            true,
            true,
            false,
            "Not connected".into(),
            HealthReport::assess(HealthMetrics::default(), 0),
            BatteryStatus::assess(true, false, None, false),
            LifecycleReport::assess(true, Duration::from_secs(60), 0, None),
        )
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            manager: Some(Arc::new(FakeManager { ready: true })),
            health: Arc::new(FakeHealth::default()),
            battery: Arc::new(HostBatteryStatus),
            lifecycle: Arc::new(FakeLifecycle),
            tool: Arc::new(InstantTool),
            probe: Arc::new(|| true),
        }
    }

    fn instant() -> DiagnosticSettings {
        DiagnosticSettings {
            group_pause_ms: 0,
            stress_iteration_delay_ms: 0,
            simulated_connection_success_rate: 0.5,
        }
    }

    fn runner(c: Collaborators) -> (DiagnosticRunner, EventLoop) {
        let (sender, events) = event::channel();
        (DiagnosticRunner::new(c, instant(), sender), events)
    }

    async fn next_results(events: &mut EventLoop) -> Outcome<TestResults> {
        match events.next().await {
            Some(Event::DiagnosticsFinished(outcome)) => outcome,
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_suite_runs_groups_in_order() {
        let results = run_suite(&collaborators(), Duration::ZERO);
        let names: Vec<_> = results.cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            names,
            [
                "Service Availability",
                "Connection Manager",
                "Health Monitoring",
                "Battery Optimization",
                "Service Lifecycle",
                "Diagnostic Tools",
            ]
        );
        assert!(results.all_passed());
        assert_eq!(results.total_tests(), 18);
    }

    #[test]
    fn test_missing_manager() {
        let mut c = collaborators();
        c.manager = None;
        let results = run_suite(&c, Duration::ZERO);

        let availability = results.case("Service Availability").unwrap();
        assert!(!availability.passed());
        assert_eq!(availability.results[0].details, "Manager is null");

        let manager = results.case("Connection Manager").unwrap();
        assert_eq!(manager.results.len(), 1);
        assert_eq!(manager.results[0].name, "Connection manager test");
    }

    #[test]
    fn test_group_error_is_one_failed_assertion() {
        let mut c = collaborators();
        c.health = Arc::new(FakeHealth {
            fail: true,
            ..Default::default()
        });
        let results = run_suite(&c, Duration::ZERO);

        let health = results.case("Health Monitoring").unwrap();
        assert_eq!(health.results.len(), 1);
        assert_eq!(health.results[0].name, "Health monitoring test");
        assert_eq!(
            health.results[0].details,
            "Exception: Diagnostic error: metrics unavailable"
        );
        // later groups still ran
        assert!(results.case("Diagnostic Tools").unwrap().passed());
    }

    #[test]
    fn test_group_panic_is_caught() {
        let mut c = collaborators();
        c.battery = Arc::new(PanickingBattery);
        let results = run_suite(&c, Duration::ZERO);

        let battery = results.case("Battery Optimization").unwrap();
        assert_eq!(battery.results.len(), 1);
        assert_eq!(battery.results[0].details, "Exception: battery service crashed");
        assert_eq!(results.cases.len(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_run_rejected() {
        let (release, gate) = mpsc::channel();
        let mut c = collaborators();
        c.tool = Arc::new(GatedTool {
            release: Mutex::new(gate),
        });
        let (runner, mut events) = runner(c);

        assert_eq!(runner.run_comprehensive(), RunStatus::Started);
        assert!(runner.is_running());
        assert_eq!(runner.run_comprehensive(), RunStatus::Rejected);
        assert_eq!(runner.run_stress_test(3), RunStatus::Rejected);

        assert_eq!(
            next_results(&mut events).await,
            Outcome::Failure(ALREADY_RUNNING.into())
        );
        match events.next().await {
            Some(Event::StressTestFinished(outcome)) => {
                assert_eq!(outcome, Outcome::Failure(ALREADY_RUNNING.into()))
            }
            other => panic!("unexpected event {:?}", other),
        }

        release.send(()).unwrap();
        let outcome = next_results(&mut events).await;
        assert!(outcome.is_success());
        assert!(!runner.is_running());

        // the flag is free again
        release.send(()).unwrap();
        assert_eq!(runner.run_comprehensive(), RunStatus::Started);
        assert!(next_results(&mut events).await.is_success());
    }

    #[tokio::test]
    async fn test_stress_test_tallies() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let health = Arc::new(FakeHealth::default());
        let mut c = collaborators();
        c.health = health.clone();
        // succeed on every other attempt
        c.probe = Arc::new(move || counter.fetch_add(1, Ordering::SeqCst) % 2 == 0);
        let (runner, mut events) = runner(c);

        assert_eq!(runner.run_stress_test(5), RunStatus::Started);
        let report = match events.next().await {
            Some(Event::StressTestFinished(Outcome::Success(report))) => report,
            other => panic!("unexpected event {:?}", other),
        };
        assert_eq!(report.iterations, 5);
        assert_eq!(report.successes, 3);
        assert_eq!(report.success_rate_text(), "60.0%");
        assert_eq!(
            *health.recorded.lock().unwrap(),
            vec![true, false, true, false, true]
        );
    }

    #[tokio::test]
    async fn test_stress_test_needs_ready_service() {
        let mut c = collaborators();
        c.manager = Some(Arc::new(FakeManager { ready: false }));
        let (runner, mut events) = runner(c);

        assert_eq!(runner.run_stress_test(3), RunStatus::Rejected);
        match events.next().await {
            Some(Event::StressTestFinished(outcome)) => {
                assert_eq!(outcome, Outcome::Failure(NOT_READY_FOR_STRESS.into()))
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_zero_iterations() {
        let (runner, mut events) = runner(collaborators());
        runner.run_stress_test(0);
        match events.next().await {
            Some(Event::StressTestFinished(Outcome::Success(report))) => {
                assert_eq!(report.success_rate_text(), "0.0%")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
