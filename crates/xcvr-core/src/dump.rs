//! Hex formatting for frames and pages.

use std::fmt::Write;

/// Bytes per `hex_dump` line.
const DUMP_WIDTH: usize = 16;

/// `"23 00 01 A0"` style rendering.
pub fn hex_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classic offset / hex / ASCII dump, 16 bytes per line.
pub fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (line, chunk) in bytes.chunks(DUMP_WIDTH).enumerate() {
        let ascii: String = chunk
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
            .collect();
        let _ = writeln!(
            out,
            "{:04X}: {:<width$}  {}",
            line * DUMP_WIDTH,
            hex_string(chunk),
            ascii,
            width = DUMP_WIDTH * 3 - 1
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0x23, 0x00, 0x01, 0xA0]), "23 00 01 A0");
        assert_eq!(hex_string(&[]), "");
    }

    #[test]
    fn test_hex_dump_lines() {
        let mut data = b"OEM".to_vec();
        data.resize(20, 0);
        let dump = hex_dump(&data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000: 4F 45 4D 00"));
        assert!(lines[0].ends_with("  OEM............."));
        assert!(lines[1].starts_with("0010: 00 00 00 00 "));
        // Short last line keeps the ASCII column aligned.
        assert_eq!(lines[0].find("  OEM"), lines[1].find("  ...."));
    }
}
