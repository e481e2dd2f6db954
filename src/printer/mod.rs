//! # Printer Module
//!
//! Everything between a formatted receipt and paper.
//!
//! ## Modules
//!
//! - [`config`]: Printer connection settings
//! - [`device`]: Bluetooth and simulated printers
//! - [`strategy`]: How one print attempt is executed
//! - [`orchestrator`]: Attempt counting and the print dialog state machine

pub mod config;
pub mod device;
pub mod orchestrator;
pub mod strategy;

use std::sync::Arc;

use crate::config::PrintSettings;
use crate::error::ScrapPosError;

pub use config::{PrinterMode, PrinterSettings};
pub use device::{BluetoothPrinter, SimulatedPrinter};
pub use orchestrator::{PrintOrchestrator, PrintState, PrintUpdate};
pub use strategy::{
    CancelToken, DirectPrint, OutcomeSource, PrintStrategy, RandomOutcomes, ScriptedOutcomes,
    SimulatedPrint,
};

/// Failure reason when no printer is reachable
pub const PRINTER_NOT_CONNECTED: &str = "Printer not connected";

/// A receipt printer.
///
/// Both calls may block. Neither should panic when the printer is missing:
/// `is_connected` returns false and `print` returns an error.
pub trait Printer: Send + Sync {
    fn is_connected(&self) -> bool;

    fn print(&self, content: &str) -> Result<(), ScrapPosError>;
}

/// Build the printer and strategy for the configured mode.
///
/// Bluetooth mode prints directly. Simulated mode uses a connected
/// [`SimulatedPrinter`] with the random [`SimulatedPrint`] strategy.
pub fn from_settings(
    printer: &PrinterSettings,
    print: &PrintSettings,
) -> (Arc<dyn Printer>, Arc<dyn PrintStrategy>) {
    match printer.mode {
        PrinterMode::Bluetooth => (
            Arc::new(BluetoothPrinter::new(printer)),
            Arc::new(DirectPrint),
        ),
        PrinterMode::Simulated => (
            Arc::new(SimulatedPrinter::default()),
            Arc::new(SimulatedPrint::random(print)),
        ),
    }
}
