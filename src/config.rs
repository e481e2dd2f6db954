//! # Configuration
//!
//! `PosConfig` gathers everything the point-of-sale needs at startup: the
//! shop identity printed on receipts, where data lives, how to reach the
//! printer, and the timing knobs of the print and diagnostic pipelines.
//!
//! The file format is JSON. Every field has a default, so an empty object
//! (or a missing file) yields a working configuration.
//!
//! ```
//! use scrap_pos::config::PosConfig;
//!
//! let config: PosConfig = serde_json::from_str(r#"{ "data_dir": "/tmp/pos" }"#).unwrap();
//! assert_eq!(config.shop.currency, "KSH");
//! assert_eq!(config.print.max_attempts, 2);
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ScrapPosError;
use crate::printer::PrinterSettings;

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = ".scrap-pos";

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PosConfig {
    pub shop: ShopProfile,
    pub data_dir: PathBuf,
    pub printer: PrinterSettings,
    pub print: PrintSettings,
    pub diagnostics: DiagnosticSettings,
}

impl Default for PosConfig {
    fn default() -> Self {
        Self {
            shop: ShopProfile::default(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            printer: PrinterSettings::default(),
            print: PrintSettings::default(),
            diagnostics: DiagnosticSettings::default(),
        }
    }
}

impl PosConfig {
    /// Load configuration from a JSON file.
    ///
    /// A missing file is not an error: defaults are returned.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ScrapPosError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ScrapPosError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = serde_json::from_str(&contents).map_err(|e| {
            ScrapPosError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn transactions_path(&self) -> PathBuf {
        self.data_dir.join("transactions.json")
    }

    pub fn pending_receipts_path(&self) -> PathBuf {
        self.data_dir.join("pending_receipts.json")
    }

    pub fn health_metrics_path(&self) -> PathBuf {
        self.data_dir.join("ble_health.json")
    }
}

/// Business identity printed in the receipt header and footer.
///
/// Header and footer lines are printed verbatim, including any leading
/// spaces used for centering on the 32-column paper.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShopProfile {
    pub header_lines: Vec<String>,
    pub footer_lines: Vec<String>,
    /// Currency prefix for amounts, e.g. `"KSH"`
    pub currency: String,
}

impl Default for ShopProfile {
    fn default() -> Self {
        Self {
            header_lines: vec![
                "    MERU SCRAP METAL MARKET".to_string(),
                "      Meru County, Kenya".to_string(),
            ],
            footer_lines: vec![
                "Thank you for your business!".to_string(),
                "Come back soon!".to_string(),
            ],
            currency: "KSH".to_string(),
        }
    }
}

/// Print cycle bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintSettings {
    /// Attempts allowed per receipt before retry is no longer offered
    pub max_attempts: u32,
    /// Delay before reporting "Printer not connected"
    pub not_connected_delay_ms: u64,
    /// Simulated job duration on the first attempt
    pub simulated_base_delay_ms: u64,
    /// Extra simulated duration added per attempt
    pub simulated_attempt_step_ms: u64,
    pub simulated_first_success_rate: f64,
    pub simulated_retry_success_rate: f64,
}

impl Default for PrintSettings {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            not_connected_delay_ms: 500,
            simulated_base_delay_ms: 2000,
            simulated_attempt_step_ms: 1000,
            simulated_first_success_rate: 0.9,
            simulated_retry_success_rate: 0.7,
        }
    }
}

impl PrintSettings {
    pub fn not_connected_delay(&self) -> Duration {
        Duration::from_millis(self.not_connected_delay_ms)
    }
}

/// Diagnostic runner pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticSettings {
    /// Pause between test groups
    pub group_pause_ms: u64,
    /// Pause between stress-test iterations
    pub stress_iteration_delay_ms: u64,
    /// Success probability of a simulated connection attempt
    pub simulated_connection_success_rate: f64,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            group_pause_ms: 1000,
            stress_iteration_delay_ms: 2000,
            simulated_connection_success_rate: 0.5,
        }
    }
}

impl DiagnosticSettings {
    pub fn group_pause(&self) -> Duration {
        Duration::from_millis(self.group_pause_ms)
    }

    pub fn stress_iteration_delay(&self) -> Duration {
        Duration::from_millis(self.stress_iteration_delay_ms)
    }
}
