//! Diagnostic collaborators backed by the host machine.

use chrono::Local;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::error::ScrapPosError;
use crate::printer::Printer;
use crate::storage;

use super::collaborators::{
    BatteryOptimization, BatteryStatus, ConnectionManager, ConnectionProbe, DiagnosticReport,
    DiagnosticTool, HealthMetrics, HealthMonitor, HealthReport, LifecycleMonitor, LifecycleReport,
};

/// Where the kernel lists Bluetooth adapters
pub const BLUETOOTH_CLASS_DIR: &str = "/sys/class/bluetooth";

// ============================================================================
// CONNECTION MANAGER
// ============================================================================

/// Connection state derived from the printer link and the local adapter.
///
/// The service counts as ready when an adapter is present or the printer
/// is already reachable (e.g. in simulated mode).
pub struct RfcommConnectionManager {
    printer: Arc<dyn Printer>,
    device: String,
    adapter_dir: PathBuf,
}

impl RfcommConnectionManager {
    pub fn new(printer: Arc<dyn Printer>, device: impl Into<String>) -> Self {
        Self {
            printer,
            device: device.into(),
            adapter_dir: PathBuf::from(BLUETOOTH_CLASS_DIR),
        }
    }

    /// Look for adapters under `dir` instead of sysfs.
    pub fn with_adapter_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.adapter_dir = dir.into();
        self
    }

    /// Names of the adapters found, e.g. `["hci0"]`.
    pub fn adapters(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.adapter_dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

impl ConnectionManager for RfcommConnectionManager {
    fn is_service_ready(&self) -> bool {
        !self.adapters().is_empty() || self.printer.is_connected()
    }

    fn is_healthy(&self) -> bool {
        self.is_service_ready()
    }

    fn is_connected(&self) -> bool {
        self.printer.is_connected()
    }

    fn connection_status(&self) -> String {
        if !self.is_service_ready() {
            "Service not available".to_string()
        } else if self.is_connected() {
            format!("Connected to {}", self.device)
        } else {
            "Not connected".to_string()
        }
    }

    fn diagnostic_info(&self) -> String {
        let adapters = self.adapters();
        format!(
            "Device: {}\nAdapters: {}\nConnected: {}",
            self.device,
            if adapters.is_empty() {
                "none".to_string()
            } else {
                adapters.join(", ")
            },
            self.is_connected()
        )
    }
}

// ============================================================================
// HEALTH MONITOR
// ============================================================================

/// Connection and reading counters persisted as JSON.
pub struct FileHealthMonitor {
    path: PathBuf,
    metrics: Mutex<HealthMetrics>,
}

impl FileHealthMonitor {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ScrapPosError> {
        let path = path.as_ref().to_path_buf();
        let metrics = storage::load_or_default(&path)
            .map_err(|e| ScrapPosError::Diagnostic(format!("Failed to load health metrics: {}", e)))?;
        Ok(Self {
            path,
            metrics: Mutex::new(metrics),
        })
    }

    pub fn metrics(&self) -> Result<HealthMetrics, ScrapPosError> {
        Ok(self.lock()?.clone())
    }

    /// Apply `f` to a copy, persist it, then make it current. A failed
    /// write leaves the live counters as they were.
    fn update(&self, f: impl FnOnce(&mut HealthMetrics)) -> Result<(), ScrapPosError> {
        let mut metrics = self.lock()?;
        let mut next = metrics.clone();
        f(&mut next);
        storage::save_atomic(&self.path, &next)?;
        *metrics = next;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HealthMetrics>, ScrapPosError> {
        self.metrics
            .lock()
            .map_err(|_| ScrapPosError::Diagnostic("Health metrics lock poisoned".into()))
    }
}

impl HealthMonitor for FileHealthMonitor {
    fn health_report(&self) -> Result<HealthReport, ScrapPosError> {
        Ok(HealthReport::assess(self.metrics()?, now_millis()))
    }

    fn record_connection(&self, success: bool) -> Result<(), ScrapPosError> {
        self.update(|m| {
            m.connection_attempts += 1;
            if success {
                m.successful_connections += 1;
                m.consecutive_errors = 0;
                m.last_successful_connection_millis = Some(now_millis());
            } else {
                m.connection_failures += 1;
            }
        })
    }

    fn record_weight_reading(&self) -> Result<(), ScrapPosError> {
        self.update(|m| {
            m.weight_readings += 1;
            m.consecutive_errors = 0;
            m.last_weight_reading_millis = Some(now_millis());
        })
    }

    fn record_disconnection(&self) -> Result<(), ScrapPosError> {
        self.update(|m| m.disconnections += 1)
    }

    fn record_error(&self) -> Result<(), ScrapPosError> {
        self.update(|m| {
            m.errors += 1;
            m.consecutive_errors += 1;
        })
    }

    fn reset(&self) -> Result<(), ScrapPosError> {
        tracing::info!("Resetting health metrics");
        self.update(|m| *m = HealthMetrics::default())
    }
}

fn now_millis() -> i64 {
    Local::now().timestamp_millis()
}

// ============================================================================
// BATTERY, LIFECYCLE
// ============================================================================

/// Hosts do not kill background services for battery, so the app is
/// always treated as whitelisted.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostBatteryStatus;

impl BatteryOptimization for HostBatteryStatus {
    fn battery_status(&self) -> Result<BatteryStatus, ScrapPosError> {
        Ok(BatteryStatus::assess(true, false, None, false))
    }
}

/// Uptime of the current process.
///
/// The service lives and dies with the process, so there are never
/// restarts to report.
pub struct ProcessLifecycleMonitor {
    started: Instant,
}

impl ProcessLifecycleMonitor {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for ProcessLifecycleMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMonitor for ProcessLifecycleMonitor {
    fn is_service_running(&self) -> bool {
        true
    }

    fn lifecycle_report(&self) -> Result<LifecycleReport, ScrapPosError> {
        Ok(LifecycleReport::assess(
            self.is_service_running(),
            self.uptime(),
            0,
            None,
        ))
    }
}

// ============================================================================
// DIAGNOSTIC TOOL
// ============================================================================

/// Builds the comprehensive report from the other collaborators.
pub struct CompositeDiagnosticTool {
    manager: Arc<dyn ConnectionManager>,
    health: Arc<dyn HealthMonitor>,
    battery: Arc<dyn BatteryOptimization>,
    lifecycle: Arc<dyn LifecycleMonitor>,
}

impl CompositeDiagnosticTool {
    pub fn new(
        manager: Arc<dyn ConnectionManager>,
        health: Arc<dyn HealthMonitor>,
        battery: Arc<dyn BatteryOptimization>,
        lifecycle: Arc<dyn LifecycleMonitor>,
    ) -> Self {
        Self {
            manager,
            health,
            battery,
            lifecycle,
        }
    }
}

impl DiagnosticTool for CompositeDiagnosticTool {
    fn comprehensive_report(&self) -> Result<DiagnosticReport, ScrapPosError> {
        let report = DiagnosticReport::assess(
            Local::now().naive_local(),
            self.lifecycle.is_service_running(),
            self.manager.is_service_ready(),
            self.manager.is_connected(),
            self.manager.connection_status(),
            self.health.health_report()?,
            self.battery.battery_status()?,
            self.lifecycle.lifecycle_report()?,
        );
        tracing::info!("Diagnostic report: overall health {}", report.overall_health);
        Ok(report)
    }
}

// ============================================================================
// PROBE
// ============================================================================

/// Simulated connection attempt that succeeds with a fixed probability.
#[derive(Debug, Clone, Copy)]
pub struct RandomConnectionProbe {
    success_rate: f64,
}

impl RandomConnectionProbe {
    pub fn new(success_rate: f64) -> Self {
        Self {
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }
}

impl ConnectionProbe for RandomConnectionProbe {
    fn attempt(&self) -> bool {
        rand::rng().random_bool(self.success_rate)
    }
}
