//! Printer implementations.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::error::ScrapPosError;
use crate::protocol;
use crate::transport::BluetoothTransport;
use crate::transport::bluetooth::{find_rfcomm_for_mac, is_valid_mac};

use super::{PRINTER_NOT_CONNECTED, Printer, PrinterSettings};

/// How long a MAC-to-device lookup is reused. One print cycle checks the
/// connection more than once.
pub const MAC_LOOKUP_TTL: Duration = Duration::from_secs(5);

/// A thermal printer bound to an RFCOMM device.
pub struct BluetoothPrinter {
    device: PathBuf,
    mac: Option<String>,
    chunk_size: usize,
    mac_lookup: Mutex<Option<(Instant, Option<PathBuf>)>>,
}

impl BluetoothPrinter {
    pub fn new(settings: &PrinterSettings) -> Self {
        let mac = settings.mac.clone().filter(|mac| {
            let valid = is_valid_mac(mac);
            if !valid {
                tracing::warn!("Ignoring invalid printer MAC address {:?}", mac);
            }
            valid
        });
        Self {
            device: settings.device.clone(),
            mac,
            chunk_size: settings.chunk_size,
            mac_lookup: Mutex::new(None),
        }
    }

    /// The device node to print to, if one is present.
    ///
    /// A node bound to the configured MAC wins over the configured path.
    pub fn resolve_device(&self) -> Option<PathBuf> {
        if let Some(mac) = &self.mac {
            let bound = self.cached_lookup(|| match find_rfcomm_for_mac(mac) {
                Ok(found) => found.map(PathBuf::from),
                Err(e) => {
                    tracing::debug!("RFCOMM lookup for {} failed: {}", mac, e);
                    None
                }
            });
            match bound {
                Some(path) => return Some(path),
                None => tracing::debug!("No RFCOMM device bound to {}", mac),
            }
        }
        Path::new(&self.device)
            .exists()
            .then(|| self.device.clone())
    }

    /// Run `lookup` unless a result younger than [`MAC_LOOKUP_TTL`] exists.
    fn cached_lookup(&self, lookup: impl FnOnce() -> Option<PathBuf>) -> Option<PathBuf> {
        let Ok(mut cache) = self.mac_lookup.lock() else {
            return lookup();
        };
        if let Some((at, found)) = cache.as_ref() {
            if at.elapsed() < MAC_LOOKUP_TTL {
                return found.clone();
            }
        }
        let found = lookup();
        *cache = Some((Instant::now(), found.clone()));
        found
    }

    /// Print the ESC/POS test page. Returns the number of bytes sent.
    pub fn print_test_page(&self) -> Result<usize, ScrapPosError> {
        let device = self
            .resolve_device()
            .ok_or_else(|| ScrapPosError::Transport(PRINTER_NOT_CONNECTED.to_string()))?;
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let job = protocol::encode_test_page(&stamp, &device.display().to_string());
        self.send(&device, &job)?;
        Ok(job.len())
    }

    fn send(&self, device: &Path, job: &[u8]) -> Result<(), ScrapPosError> {
        let mut transport = BluetoothTransport::open(device)?;
        transport.set_chunk_size(self.chunk_size);
        transport.write_all(job)?;
        tracing::info!("Sent {} bytes to {}", job.len(), device.display());
        Ok(())
    }
}

impl Printer for BluetoothPrinter {
    fn is_connected(&self) -> bool {
        self.resolve_device().is_some()
    }

    fn print(&self, content: &str) -> Result<(), ScrapPosError> {
        let device = self
            .resolve_device()
            .ok_or_else(|| ScrapPosError::Transport(PRINTER_NOT_CONNECTED.to_string()))?;

        self.send(&device, &protocol::encode_receipt(content))
    }
}

/// A printer with no hardware behind it.
///
/// Jobs are recorded in memory and logged. The connected flag can be
/// toggled to exercise the not-connected path.
#[derive(Debug)]
pub struct SimulatedPrinter {
    connected: AtomicBool,
    printed: Mutex<Vec<String>>,
}

impl SimulatedPrinter {
    pub fn new(connected: bool) -> Self {
        Self {
            connected: AtomicBool::new(connected),
            printed: Mutex::new(Vec::new()),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Receipts printed so far, oldest first.
    pub fn printed(&self) -> Vec<String> {
        self.printed
            .lock()
            .map(|jobs| jobs.clone())
            .unwrap_or_default()
    }
}

impl Default for SimulatedPrinter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Printer for SimulatedPrinter {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn print(&self, content: &str) -> Result<(), ScrapPosError> {
        if !self.is_connected() {
            return Err(ScrapPosError::Transport(PRINTER_NOT_CONNECTED.to_string()));
        }
        tracing::info!(
            "Simulated print of {} lines",
            content.lines().count()
        );
        self.printed
            .lock()
            .map_err(|_| ScrapPosError::Transport("Simulated printer lock poisoned".into()))?
            .push(content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_device_is_not_connected() {
        let printer = BluetoothPrinter::new(&PrinterSettings {
            device: PathBuf::from("/dev/no-such-rfcomm"),
            ..Default::default()
        });
        assert!(!printer.is_connected());
        let err = printer.print("x").unwrap_err();
        assert_eq!(err.to_string(), "Transport error: Printer not connected");
    }

    #[test]
    fn test_invalid_mac_dropped() {
        let printer = BluetoothPrinter::new(&PrinterSettings {
            mac: Some("nonsense".into()),
            ..Default::default()
        });
        assert!(printer.mac.is_none());
    }

    #[test]
    fn test_mac_lookup_reused_within_ttl() {
        use std::sync::atomic::AtomicU32;

        let printer = BluetoothPrinter::new(&PrinterSettings::default());
        let lookups = AtomicU32::new(0);
        let lookup = || {
            lookups.fetch_add(1, Ordering::SeqCst);
            Some(PathBuf::from("/dev/rfcomm1"))
        };

        assert_eq!(printer.cached_lookup(lookup), Some(PathBuf::from("/dev/rfcomm1")));
        assert_eq!(printer.cached_lookup(lookup), Some(PathBuf::from("/dev/rfcomm1")));
        assert_eq!(lookups.load(Ordering::SeqCst), 1);

        // An expired entry is looked up again
        *printer.mac_lookup.lock().unwrap() =
            Some((Instant::now() - MAC_LOOKUP_TTL * 2, None));
        assert_eq!(printer.cached_lookup(lookup), Some(PathBuf::from("/dev/rfcomm1")));
        assert_eq!(lookups.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_simulated_printer_records_jobs() {
        let printer = SimulatedPrinter::default();
        printer.print("first").unwrap();
        printer.set_connected(false);
        assert!(printer.print("second").is_err());
        assert_eq!(printer.printed(), vec!["first".to_string()]);
    }
}
