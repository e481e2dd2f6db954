//! # Bluetooth RFCOMM Transport
//!
//! Sends bytes to a thermal printer over Bluetooth Serial Port Profile
//! (SPP) via an RFCOMM TTY.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired and bound to an RFCOMM device first:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# pair 66:22:XX:XX:XX:XX
//! $ sudo rfcomm bind 0 66:22:XX:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! ## TTY Configuration
//!
//! The device is opened in raw mode so command bytes are transmitted
//! unmodified: no input or output processing, 8-bit characters, no echo,
//! non-canonical mode, no XON/XOFF flow control.
//!
//! ## Chunked Writes
//!
//! Cheap printers have small receive buffers. Jobs are written in chunks
//! (default 512 bytes) with a short pause between them.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::process::Command;
use std::thread;
use std::time::Duration;

use crate::error::ScrapPosError;

/// Default RFCOMM device path
pub const DEFAULT_DEVICE: &str = "/dev/rfcomm0";

/// Default chunk size for writes (bytes)
pub const DEFAULT_CHUNK_SIZE: usize = 512;

/// Delay between chunks (milliseconds)
const CHUNK_DELAY_MS: u64 = 10;

/// # Bluetooth Printer Transport
///
/// An open, raw-mode RFCOMM device.
///
/// ```no_run
/// use scrap_pos::transport::BluetoothTransport;
/// use scrap_pos::protocol::encode_receipt;
///
/// let mut transport = BluetoothTransport::open("/dev/rfcomm0")?;
/// transport.write_all(&encode_receipt("Hello\n"))?;
/// # Ok::<(), scrap_pos::error::ScrapPosError>(())
/// ```
pub struct BluetoothTransport {
    file: File,
    chunk_size: usize,
    chunk_delay: Duration,
}

impl BluetoothTransport {
    /// Open the RFCOMM device and switch it to raw mode.
    ///
    /// ## Errors
    ///
    /// Fails when the device does not exist, permission is denied (the user
    /// may need the `dialout` group) or the TTY cannot be configured.
    pub fn open<P: AsRef<Path>>(device: P) -> Result<Self, ScrapPosError> {
        let path = device.as_ref();

        let file = OpenOptions::new().write(true).open(path).map_err(|e| {
            ScrapPosError::Transport(format!("Failed to open {}: {}", path.display(), e))
        })?;

        configure_tty_raw(file.as_raw_fd())?;
        tracing::debug!("Opened {} in raw mode", path.display());

        Ok(Self {
            file,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_delay: Duration::from_millis(CHUNK_DELAY_MS),
        })
    }

    /// Set the chunk size for large writes. Zero is treated as one byte.
    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Write a whole job to the printer and flush.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), ScrapPosError> {
        write_chunked(&mut self.file, data, self.chunk_size, self.chunk_delay)?;
        tracing::debug!("Wrote {} bytes", data.len());
        Ok(())
    }
}

/// Write `data` to `sink` in chunks of at most `chunk_size`, then flush.
pub fn write_chunked<W: Write>(
    sink: &mut W,
    data: &[u8],
    chunk_size: usize,
    delay: Duration,
) -> Result<(), ScrapPosError> {
    let chunk_size = chunk_size.max(1);
    let chunks = data.len().div_ceil(chunk_size);

    for (i, chunk) in data.chunks(chunk_size).enumerate() {
        sink.write_all(chunk)
            .map_err(|e| ScrapPosError::Transport(format!("Write failed: {}", e)))?;
        if i + 1 < chunks && !delay.is_zero() {
            thread::sleep(delay);
        }
    }

    sink.flush()
        .map_err(|e| ScrapPosError::Transport(format!("Flush failed: {}", e)))
}

/// Configure a file descriptor for raw TTY mode.
///
/// IXON/IXOFF/IXANY must be off: 0x11 and 0x13 would otherwise be eaten as
/// flow-control bytes.
#[cfg(unix)]
fn configure_tty_raw(fd: i32) -> Result<(), ScrapPosError> {
    use std::mem::MaybeUninit;

    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(ScrapPosError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(ScrapPosError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_fd: i32) -> Result<(), ScrapPosError> {
    Ok(())
}

// ============================================================================
// RFCOMM DISCOVERY
// ============================================================================

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find the RFCOMM device bound to `mac`, if any.
///
/// Reads `/proc/net/rfcomm`, falling back to `rfcomm -a`. Only devices whose
/// node exists under `/dev` are returned.
pub fn find_rfcomm_for_mac(mac: &str) -> Result<Option<String>, ScrapPosError> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = existing_device(&contents, mac) {
            return Ok(Some(path));
        }
    }

    let output = Command::new("rfcomm")
        .arg("-a")
        .output()
        .map_err(|e| ScrapPosError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(existing_device(&stdout, mac))
}

fn existing_device(listing: &str, mac: &str) -> Option<String> {
    rfcomm_devices_for(listing, mac)
        .into_iter()
        .map(|name| format!("/dev/{}", name))
        .find(|path| Path::new(path).exists())
}

/// Device names in an RFCOMM listing whose line mentions `mac`.
///
/// Lines look like `rfcomm0: 66:22:AA:BB:CC:DD channel 1 clean`.
pub fn rfcomm_devices_for(listing: &str, mac: &str) -> Vec<String> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
