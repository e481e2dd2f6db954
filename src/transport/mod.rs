//! # Printer Transport Layer
//!
//! Byte-level links to printers.
//!
//! - [`bluetooth`]: Bluetooth RFCOMM (Linux)

pub mod bluetooth;

pub use bluetooth::BluetoothTransport;
