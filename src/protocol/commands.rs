//! # ESC/POS Commands
//!
//! Byte-sequence builders for the subset of ESC/POS used to print text
//! receipts on 58mm Bluetooth thermal printers.
//!
//! ## Escape Sequence Structure
//!
//! - Single byte: `LF`
//! - Fixed: `ESC @`
//! - With parameter: `ESC E n`, `ESC a n`, `ESC d n`, `GS V m`

// ============================================================================
// ESCAPE SEQUENCE CONSTANTS
// ============================================================================

/// ESC (Escape) - Command prefix byte
pub const ESC: u8 = 0x1B;

/// GS (Group Separator) - Extended command prefix
pub const GS: u8 = 0x1D;

/// LF (Line Feed) - Print buffer and advance one line
pub const LF: u8 = 0x0A;

// ============================================================================
// INITIALIZATION
// ============================================================================

/// # Initialize Printer (ESC @)
///
/// Clears the print buffer and resets text formatting, alignment and line
/// spacing to power-on defaults. Sent at the start of every job.
///
/// | Format | Bytes |
/// |--------|-------|
/// | ASCII  | ESC @ |
/// | Hex    | 1B 40 |
///
/// ```
/// use scrap_pos::protocol::commands;
///
/// assert_eq!(commands::init(), vec![0x1B, 0x40]);
/// ```
#[inline]
pub fn init() -> Vec<u8> {
    vec![ESC, b'@']
}

// ============================================================================
// TEXT STYLE
// ============================================================================

/// # Emphasis On (ESC E 1)
#[inline]
pub fn bold_on() -> Vec<u8> {
    vec![ESC, b'E', 0x01]
}

/// # Emphasis Off (ESC E 0)
#[inline]
pub fn bold_off() -> Vec<u8> {
    vec![ESC, b'E', 0x00]
}

/// Horizontal alignment for `ESC a n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left = 0,
    Center = 1,
    Right = 2,
}

/// # Select Justification (ESC a n)
///
/// | n | Alignment |
/// |---|-----------|
/// | 0 | Left      |
/// | 1 | Center    |
/// | 2 | Right     |
#[inline]
pub fn align(alignment: Alignment) -> Vec<u8> {
    vec![ESC, b'a', alignment as u8]
}

// ============================================================================
// PAPER CONTROL
// ============================================================================

/// # Print and Feed n Lines (ESC d n)
#[inline]
pub fn feed_lines(n: u8) -> Vec<u8> {
    vec![ESC, b'd', n]
}

/// # Full Cut (GS V 0)
#[inline]
pub fn cut_full() -> Vec<u8> {
    vec![GS, b'V', 0x00]
}

/// # Partial Cut (GS V 1)
///
/// Leaves a small tab so the receipt does not drop off the printer.
#[inline]
pub fn cut_partial() -> Vec<u8> {
    vec![GS, b'V', 0x01]
}

// ============================================================================
// TESTS
// ============================================================================
