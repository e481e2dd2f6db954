//! # Printer Settings
//!
//! How to reach the receipt printer.
//!
//! | Field | Default | Meaning |
//! |-------|---------|---------|
//! | `device` | `/dev/rfcomm0` | RFCOMM node to write to |
//! | `mac` | none | If set, the node bound to this address is preferred |
//! | `mode` | `bluetooth` | `bluetooth` or `simulated` |
//! | `chunk_size` | 512 | Bytes per write |
//!
//! ```
//! use scrap_pos::printer::{PrinterMode, PrinterSettings};
//!
//! let settings: PrinterSettings = serde_json::from_str(r#"{ "mode": "simulated" }"#).unwrap();
//! assert_eq!(settings.mode, PrinterMode::Simulated);
//! assert_eq!(settings.chunk_size, 512);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::transport::bluetooth::{DEFAULT_CHUNK_SIZE, DEFAULT_DEVICE};

/// Which printer backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrinterMode {
    /// Real printer over RFCOMM
    #[default]
    Bluetooth,
    /// No hardware; jobs are logged and outcomes drawn at random
    Simulated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrinterSettings {
    pub device: PathBuf,
    pub mac: Option<String>,
    pub mode: PrinterMode,
    pub chunk_size: usize,
}

impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            mac: None,
            mode: PrinterMode::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
