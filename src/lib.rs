//! # scrap-pos - Scrap-Metal Point of Sale
//!
//! The core of a point-of-sale for a scrap-metal buyer: weighed materials
//! are accumulated into a transaction, confirmed, saved, turned into a
//! fixed-width receipt and printed on a Bluetooth thermal printer. A
//! diagnostic suite checks the connection layer.
//!
//! - **Receipts**: deterministic 32-column text receipts
//! - **Persistence**: background saves with structured failures
//! - **Printing**: attempt counting, retries and print-later
//! - **Diagnostics**: staged self-tests and a connection stress test
//!
//! ## Quick Start
//!
//! ```
//! use scrap_pos::config::ShopProfile;
//! use scrap_pos::receipt::{ReceiptData, format_receipt, golden_datetime};
//! use std::collections::HashMap;
//!
//! let weights = vec![("Steel".to_string(), 10.0)];
//! let prices = HashMap::from([("Steel".to_string(), 50.0)]);
//! let data = ReceiptData::from_weights(&weights, &prices, 10.0, 500.0, golden_datetime(), "1");
//!
//! let text = format_receipt(&ShopProfile::default(), &data);
//! assert!(text.contains("TOTAL WEIGHT:      10.00 kg"));
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transaction`] | Draft, weighing batches and confirmed transactions |
//! | [`receipt`] | Receipt formatting |
//! | [`persistence`] | Transaction repository and background saves |
//! | [`checkout`] | Confirm, save, and build the completion result |
//! | [`printer`] | Printers, print strategies and the print orchestrator |
//! | [`pending`] | Receipts saved for later printing |
//! | [`diagnostics`] | Connection self-tests |
//! | [`session`] | Owns the collaborators and routes background results |
//! | [`event`] | Worker → interactive hand-off |
//! | [`protocol`] | ESC/POS command builders |
//! | [`transport`] | Bluetooth RFCOMM serial transport |
//! | [`config`] | JSON configuration |
//! | [`error`] | Error types |

pub mod checkout;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod event;
pub mod format;
pub mod pending;
pub mod persistence;
pub mod printer;
pub mod protocol;
pub mod receipt;
pub mod session;
pub mod storage;
pub mod transaction;
pub mod transport;

// Re-exports for convenience
pub use config::PosConfig;
pub use error::ScrapPosError;
pub use session::PosSession;
pub use transport::BluetoothTransport;
