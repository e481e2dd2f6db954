//! # ESC/POS Encoding
//!
//! Wraps a formatted text receipt in the commands a thermal printer needs.
//!
//! ## Modules
//!
//! - [`commands`]: Basic printer commands (init, style, feed, cut)
//!
//! ## Job Layout
//!
//! ```text
//! ESC @            initialize
//! <receipt text>   ASCII, LF line endings
//! ESC d 3          feed past the tear bar
//! GS V 1           partial cut
//! ```
//!
//! The printer test page also exercises emphasis, justification and the
//! full cut.

pub mod commands;

/// Replacement for characters the printer's code page cannot show
pub const SUBSTITUTE: u8 = b'?';

/// Lines fed after the receipt before cutting
pub const TRAILING_FEED_LINES: u8 = 3;

/// Encode receipt text as a complete ESC/POS print job.
///
/// ```
/// use scrap_pos::protocol::encode_receipt;
///
/// let job = encode_receipt("TOTAL\n");
/// assert_eq!(&job[..2], &[0x1B, 0x40]);
/// assert!(job.ends_with(&[0x1D, 0x56, 0x01]));
/// ```
pub fn encode_receipt(text: &str) -> Vec<u8> {
    let mut job = Vec::with_capacity(text.len() + 8);
    job.extend(commands::init());
    job.extend(encode_text(text));
    job.extend(commands::feed_lines(TRAILING_FEED_LINES));
    job.extend(commands::cut_partial());
    job
}

/// Encode the printer test page.
///
/// Shows emphasis and every justification, then identifies the device and
/// ends with a full cut.
pub fn encode_test_page(timestamp: &str, device: &str) -> Vec<u8> {
    use commands::Alignment;

    let mut job = commands::init();
    job.extend(commands::align(Alignment::Center));
    job.extend(commands::bold_on());
    job.extend(encode_text("PRINTER TEST PAGE\n"));
    job.extend(commands::bold_off());
    job.extend(encode_text("================\n\n"));

    job.extend(commands::align(Alignment::Left));
    job.extend(encode_text("Normal Text\n"));
    job.extend(commands::bold_on());
    job.extend(encode_text("Bold Text\n"));
    job.extend(commands::bold_off());
    job.extend(encode_text("123456789 !@#$%^&*()\n\n"));

    for (alignment, label) in [
        (Alignment::Left, "Left Aligned\n"),
        (Alignment::Center, "Center Aligned\n"),
        (Alignment::Right, "Right Aligned\n"),
    ] {
        job.extend(commands::align(alignment));
        job.extend(encode_text(label));
    }
    job.extend(commands::align(Alignment::Left));

    job.extend(encode_text(&format!(
        "\nDate: {}\nDevice: {}\n\nTest completed successfully!\n",
        timestamp, device
    )));
    job.extend(commands::feed_lines(TRAILING_FEED_LINES));
    job.extend(commands::cut_full());
    job
}

/// Encode text as printable ASCII.
///
/// Characters outside ASCII print as `?`. Line feeds pass through; other
/// control characters are dropped so they cannot be mistaken for commands.
pub fn encode_text(text: &str) -> Vec<u8> {
    let mut substituted = 0usize;
    let bytes = text
        .chars()
        .filter_map(|c| match c {
            '\n' => Some(commands::LF),
            '\r' | '\t' => Some(c as u8),
            c if c.is_ascii_control() => None,
            c if c.is_ascii() => Some(c as u8),
            _ => {
                substituted += 1;
                Some(SUBSTITUTE)
            }
        })
        .collect();

    if substituted > 0 {
        tracing::warn!("Replaced {} non-ASCII characters with '?'", substituted);
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_receipt_wraps_text() {
        let job = encode_receipt("A\n");
        assert_eq!(job, vec![0x1B, 0x40, b'A', 0x0A, 0x1B, 0x64, 0x03, 0x1D, 0x56, 0x01]);
    }

    #[test]
    fn test_test_page_layout() {
        let job = encode_test_page("2026-01-20 12:00:00", "/dev/rfcomm0");
        assert!(job.starts_with(&[0x1B, 0x40, 0x1B, b'a', 0x01, 0x1B, b'E', 0x01]));
        assert!(job.ends_with(&[0x1B, 0x64, 0x03, 0x1D, 0x56, 0x00]));

        let right = [0x1B, b'a', 0x02];
        assert!(job.windows(3).any(|w| w == right));
        let text = String::from_utf8_lossy(&job);
        assert!(text.contains("Device: /dev/rfcomm0\n"));
        assert!(text.contains("Date: 2026-01-20 12:00:00\n"));
    }

    #[test]
    fn test_non_ascii_substituted() {
        assert_eq!(encode_text("Kühler"), b"K?hler".to_vec());
        assert_eq!(encode_text("•"), b"?".to_vec());
    }

    #[test]
    fn test_control_characters_dropped() {
        assert_eq!(encode_text("a\x1Bb\nc"), b"ab\nc".to_vec());
    }
}
