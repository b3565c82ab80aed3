//! Hex dump formatting for transfer payloads
//!
//! Output has no parsing contract; it exists for human inspection of what
//! went over the wire.

use std::fmt::Write;

const BYTES_PER_LINE: usize = 16;

/// Render `data` as an address + hex + ASCII dump, 16 bytes per line.
///
/// Non-printable bytes show as `.` in the ASCII gutter:
///
/// ```text
/// 00000000 | 40 00 00 00 00 95 FF FF 46 4F 4F               | @.......FOO
/// ```
pub fn hex_dump(data: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in data.chunks(BYTES_PER_LINE).enumerate() {
        let mut hex = String::new();
        let mut ascii = String::new();
        for &byte in chunk {
            let _ = write!(hex, "{:02X} ", byte);
            if byte.is_ascii_graphic() || byte == b' ' {
                ascii.push(byte as char);
            } else {
                ascii.push('.');
            }
        }
        let _ = writeln!(
            out,
            "{:08X} | {:<width$}| {}",
            line * BYTES_PER_LINE,
            hex,
            ascii,
            width = BYTES_PER_LINE * 3
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_nothing() {
        assert!(hex_dump(&[]).is_empty());
    }

    #[test]
    fn printable_and_unprintable_bytes() {
        let dump = hex_dump(b"SPI\x00");
        assert!(dump.contains("53 50 49 00"));
        assert!(dump.contains("SPI."));
    }

    #[test]
    fn sixteen_bytes_per_line_with_addresses() {
        let dump = hex_dump(&[0xAAu8; 17]);
        let mut lines = dump.lines();
        assert!(lines.next().unwrap().starts_with("00000000"));
        assert!(lines.next().unwrap().starts_with("00000010"));
        assert!(lines.next().is_none());
    }

    #[test]
    fn short_line_is_padded_before_gutter() {
        let dump = hex_dump(&[0x41]);
        // one byte of hex, padded to the full 48-column field
        assert!(dump.contains("41 "));
        assert!(dump.trim_end().ends_with("| A"));
    }
}
