//! # Diagnostic Collaborators
//!
//! The services the diagnostic suite inspects, and the reports they
//! produce. Assessment rules live on the report types so every
//! implementation scores the same way.
//!
//! | Report | Rule |
//! |--------|------|
//! | [`HealthReport`] | Score = mean(connection, data, error); healthy needs < 5 consecutive errors, a reading in the last 2 min and > 50% connection success |
//! | [`BatteryStatus`] | Not whitelisted + power save = High, not whitelisted = Medium, else Low |
//! | [`LifecycleReport`] | No restarts = Excellent, then < 0.1/h Good, < 1.0/h Fair, else Poor |
//! | [`DiagnosticReport`] | 25 points each for running, ready, healthy, battery (Medium = 15) |

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::ScrapPosError;

/// Longest gap between weight readings for the service to count as healthy
pub const MAX_DATA_GAP_MS: i64 = 120_000;

/// Consecutive errors at which the service is unhealthy
pub const MAX_CONSECUTIVE_ERRORS: u64 = 5;

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// The scale/printer connection service.
pub trait ConnectionManager: Send + Sync {
    fn is_service_ready(&self) -> bool;
    fn is_healthy(&self) -> bool;
    fn is_connected(&self) -> bool;
    fn connection_status(&self) -> String;
    fn diagnostic_info(&self) -> String;
}

/// Counts connection and data events and scores them.
///
/// The recorders default to doing nothing so read-only monitors only
/// implement [`health_report`](Self::health_report).
pub trait HealthMonitor: Send + Sync {
    fn health_report(&self) -> Result<HealthReport, ScrapPosError>;

    /// Record the outcome of one connection attempt.
    fn record_connection(&self, _success: bool) -> Result<(), ScrapPosError> {
        Ok(())
    }

    /// Record one weight taken from the scale.
    fn record_weight_reading(&self) -> Result<(), ScrapPosError> {
        Ok(())
    }

    fn record_disconnection(&self) -> Result<(), ScrapPosError> {
        Ok(())
    }

    fn record_error(&self) -> Result<(), ScrapPosError> {
        Ok(())
    }

    /// Zero every counter.
    fn reset(&self) -> Result<(), ScrapPosError> {
        Ok(())
    }
}

pub trait BatteryOptimization: Send + Sync {
    fn battery_status(&self) -> Result<BatteryStatus, ScrapPosError>;
}

pub trait LifecycleMonitor: Send + Sync {
    fn is_service_running(&self) -> bool;
    fn lifecycle_report(&self) -> Result<LifecycleReport, ScrapPosError>;
}

pub trait DiagnosticTool: Send + Sync {
    fn comprehensive_report(&self) -> Result<DiagnosticReport, ScrapPosError>;
}

/// One simulated or real connection attempt, used by the stress test.
pub trait ConnectionProbe: Send + Sync {
    fn attempt(&self) -> bool;
}

impl<F> ConnectionProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn attempt(&self) -> bool {
        self()
    }
}

// ============================================================================
// HEALTH
// ============================================================================

/// Raw counters kept by a health monitor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMetrics {
    pub connection_attempts: u64,
    pub successful_connections: u64,
    pub connection_failures: u64,
    pub disconnections: u64,
    pub weight_readings: u64,
    pub errors: u64,
    pub consecutive_errors: u64,
    pub last_successful_connection_millis: Option<i64>,
    pub last_weight_reading_millis: Option<i64>,
}

impl HealthMetrics {
    pub fn connection_success_rate(&self) -> f64 {
        if self.connection_attempts == 0 {
            0.0
        } else {
            self.successful_connections as f64 / self.connection_attempts as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthReport {
    pub metrics: HealthMetrics,
    pub connection_success_rate: f64,
    /// `None` when no reading was ever recorded
    pub time_since_last_reading_ms: Option<i64>,
    pub time_since_last_connection_ms: Option<i64>,
    pub health_score: f64,
    pub is_healthy: bool,
}

impl HealthReport {
    /// Assess `metrics` as of `now_millis`.
    pub fn assess(metrics: HealthMetrics, now_millis: i64) -> Self {
        let rate = metrics.connection_success_rate();
        let since_reading = metrics.last_weight_reading_millis.map(|t| now_millis - t);
        let since_connection = metrics
            .last_successful_connection_millis
            .map(|t| now_millis - t);
        let recent_data = since_reading.is_some_and(|gap| gap < MAX_DATA_GAP_MS);

        let connection_score = (rate * 100.0).min(100.0);
        let data_score = if recent_data { 100.0 } else { 0.0 };
        let error_score = (100.0 - metrics.consecutive_errors as f64 * 20.0).max(0.0);

        let is_healthy = metrics.consecutive_errors < MAX_CONSECUTIVE_ERRORS
            && recent_data
            && rate > 0.5;

        Self {
            connection_success_rate: rate,
            time_since_last_reading_ms: since_reading,
            time_since_last_connection_ms: since_connection,
            health_score: (connection_score + data_score + error_score) / 3.0,
            is_healthy,
            metrics,
        }
    }
}

impl fmt::Display for HealthReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.metrics;
        writeln!(f, "BLE Service Health Report:")?;
        writeln!(f, "Health Score: {:.1}%", self.health_score)?;
        writeln!(
            f,
            "Status: {}",
            if self.is_healthy { "Healthy" } else { "Unhealthy" }
        )?;
        writeln!(f, "Connection Stats:")?;
        writeln!(f, "- Attempts: {}", m.connection_attempts)?;
        writeln!(f, "- Successes: {}", m.successful_connections)?;
        writeln!(f, "- Failures: {}", m.connection_failures)?;
        writeln!(f, "- Success Rate: {:.1}%", self.connection_success_rate * 100.0)?;
        writeln!(f, "Data Stats:")?;
        writeln!(f, "- Weight Readings: {}", m.weight_readings)?;
        match self.time_since_last_reading_ms {
            Some(ms) => writeln!(f, "- Time Since Last Reading: {} ms", ms)?,
            None => writeln!(f, "- Time Since Last Reading: never")?,
        }
        writeln!(f, "- Consecutive Errors: {}", m.consecutive_errors)?;
        writeln!(f, "Performance:")?;
        writeln!(f, "- Disconnections: {}", m.disconnections)?;
        write!(f, "- Total Errors: {}", m.errors)
    }
}

// ============================================================================
// BATTERY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "LOW"),
            RiskLevel::Medium => write!(f, "MEDIUM"),
            RiskLevel::High => write!(f, "HIGH"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatteryStatus {
    pub is_whitelisted: bool,
    pub power_save_mode: bool,
    /// Percent, if a battery is present
    pub battery_level: Option<u8>,
    pub is_charging: bool,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

impl BatteryStatus {
    pub fn assess(
        is_whitelisted: bool,
        power_save_mode: bool,
        battery_level: Option<u8>,
        is_charging: bool,
    ) -> Self {
        let (risk_level, recommendation) = match (is_whitelisted, power_save_mode) {
            (false, true) => (
                RiskLevel::High,
                "App may be killed by system. Please whitelist from battery optimization.",
            ),
            (false, false) => (
                RiskLevel::Medium,
                "Consider whitelisting from battery optimization for best performance.",
            ),
            (true, _) => (RiskLevel::Low, "Battery optimization properly configured."),
        };
        Self {
            is_whitelisted,
            power_save_mode,
            battery_level,
            is_charging,
            risk_level,
            recommendation: recommendation.to_string(),
        }
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        writeln!(f, "Battery Optimization Status:")?;
        writeln!(f, "Whitelisted: {}", yes_no(self.is_whitelisted))?;
        match self.battery_level {
            Some(level) => writeln!(f, "Battery Level: {}%", level)?,
            None => writeln!(f, "Battery Level: N/A")?,
        }
        writeln!(f, "Charging: {}", yes_no(self.is_charging))?;
        writeln!(f, "Power Save Mode: {}", yes_no(self.power_save_mode))?;
        writeln!(f, "Risk Level: {}", self.risk_level)?;
        write!(f, "Recommendation: {}", self.recommendation)
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stability::Excellent => write!(f, "EXCELLENT"),
            Stability::Good => write!(f, "GOOD"),
            Stability::Fair => write!(f, "FAIR"),
            Stability::Poor => write!(f, "POOR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleReport {
    pub is_running: bool,
    pub uptime: Duration,
    pub total_restarts: u32,
    pub time_since_last_restart: Option<Duration>,
    pub restarts_per_hour: f64,
    pub stability: Stability,
}

impl LifecycleReport {
    pub fn assess(
        is_running: bool,
        uptime: Duration,
        total_restarts: u32,
        time_since_last_restart: Option<Duration>,
    ) -> Self {
        let hours = uptime.as_secs_f64() / 3600.0;
        let restarts_per_hour = if hours > 0.0 {
            f64::from(total_restarts) / hours
        } else {
            0.0
        };

        let stability = if total_restarts == 0 {
            Stability::Excellent
        } else if restarts_per_hour < 0.1 {
            Stability::Good
        } else if restarts_per_hour < 1.0 {
            Stability::Fair
        } else {
            Stability::Poor
        };

        Self {
            is_running,
            uptime,
            total_restarts,
            time_since_last_restart,
            restarts_per_hour,
            stability,
        }
    }
}

impl fmt::Display for LifecycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Service Lifecycle Report:")?;
        writeln!(f, "Running: {}", if self.is_running { "Yes" } else { "No" })?;
        writeln!(f, "Uptime: {:.1} hours", self.uptime.as_secs_f64() / 3600.0)?;
        writeln!(f, "Total Restarts: {}", self.total_restarts)?;
        writeln!(f, "Restarts/Hour: {:.2}", self.restarts_per_hour)?;
        writeln!(f, "Stability: {}", self.stability)?;
        match self.time_since_last_restart {
            Some(since) => write!(
                f,
                "Time Since Last Restart: {:.1} minutes",
                since.as_secs_f64() / 60.0
            ),
            None => write!(f, "Time Since Last Restart: N/A"),
        }
    }
}

// ============================================================================
// COMPREHENSIVE REPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverallHealth {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl OverallHealth {
    /// Band a 0-100 percentage.
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            OverallHealth::Excellent
        } else if percentage >= 75.0 {
            OverallHealth::Good
        } else if percentage >= 50.0 {
            OverallHealth::Fair
        } else {
            OverallHealth::Poor
        }
    }
}

impl fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverallHealth::Excellent => write!(f, "EXCELLENT"),
            OverallHealth::Good => write!(f, "GOOD"),
            OverallHealth::Fair => write!(f, "FAIR"),
            OverallHealth::Poor => write!(f, "POOR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiagnosticReport {
    pub timestamp: NaiveDateTime,
    pub service_running: bool,
    pub manager_ready: bool,
    pub connected: bool,
    pub connection_status: String,
    pub health: HealthReport,
    pub battery: BatteryStatus,
    pub lifecycle: LifecycleReport,
    pub overall_health: OverallHealth,
    pub recommendations: Vec<String>,
}

impl DiagnosticReport {
    /// Score the collected reports and derive recommendations.
    pub fn assess(
        timestamp: NaiveDateTime,
        service_running: bool,
        manager_ready: bool,
        connected: bool,
        connection_status: String,
        health: HealthReport,
        battery: BatteryStatus,
        lifecycle: LifecycleReport,
    ) -> Self {
        let mut score = 0u32;
        if service_running {
            score += 25;
        }
        if manager_ready {
            score += 25;
        }
        if health.is_healthy {
            score += 25;
        }
        score += match battery.risk_level {
            RiskLevel::Low => 25,
            RiskLevel::Medium => 15,
            RiskLevel::High => 0,
        };
        let overall_health = OverallHealth::from_percentage(f64::from(score));

        let mut recommendations = Vec::new();
        if !service_running {
            recommendations.push(
                "Critical: BLE service is not running. Restart the app or check permissions."
                    .to_string(),
            );
        }
        if !manager_ready {
            recommendations.push(
                "Warning: Connection manager is not ready. Check Bluetooth permissions."
                    .to_string(),
            );
        }
        if !health.is_healthy {
            recommendations.push(format!(
                "Health issue detected: health score {:.1}%",
                health.health_score
            ));
        }
        if battery.risk_level != RiskLevel::Low {
            recommendations.push(format!("Battery optimization: {}", battery.recommendation));
        }
        if lifecycle.stability == Stability::Poor {
            recommendations
                .push("Service stability: Consider investigating frequent restarts.".to_string());
        }
        if recommendations.is_empty() {
            recommendations.push("All systems operating normally.".to_string());
        }

        Self {
            timestamp,
            service_running,
            manager_ready,
            connected,
            connection_status,
            health,
            battery,
            lifecycle,
            overall_health,
            recommendations,
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        writeln!(f, "=== COMPREHENSIVE BLE SERVICE DIAGNOSTIC REPORT ===")?;
        writeln!(f, "Generated: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Overall Health: {}", self.overall_health)?;
        writeln!(f)?;
        writeln!(f, "SERVICE STATUS:")?;
        writeln!(f, "- Service Running: {}", yes_no(self.service_running))?;
        writeln!(f, "- Manager Ready: {}", yes_no(self.manager_ready))?;
        writeln!(f, "- Connected: {}", yes_no(self.connected))?;
        writeln!(f, "- Status: {}", self.connection_status)?;
        writeln!(f)?;
        writeln!(f, "{}", self.health)?;
        writeln!(f)?;
        writeln!(f, "{}", self.battery)?;
        writeln!(f)?;
        writeln!(f, "{}", self.lifecycle)?;
        writeln!(f)?;
        writeln!(f, "RECOMMENDATIONS:")?;
        for (i, recommendation) in self.recommendations.iter().enumerate() {
            writeln!(f, "{}. {}", i + 1, recommendation)?;
        }
        Ok(())
    }
}
