//! Shared test fixtures.

use crate::checksum;

/// First 96 bytes of A0 captured from a real 1310nm SFP
/// (vendor "OEM", part "NX-SF-3G1-20", date code 230518).
pub(crate) const CAPTURED_SFP_A0: [u8; 96] = [
    0x03, 0x04, 0x07, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01, 0x00, 0x01, 0x0D, 0x00, 0x14, 0xC8,
    0x00, 0x00, 0x00, 0x00, 0x4F, 0x45, 0x4D, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20, 0x20,
    0x20, 0x20, 0x20, 0x20, 0x00, 0x00, 0x00, 0x00, 0x4E, 0x58, 0x2D, 0x53, 0x46, 0x2D, 0x33, 0x47,
    0x31, 0x2D, 0x32, 0x30, 0x20, 0x20, 0x20, 0x20, 0x41, 0x30, 0x20, 0x20, 0x05, 0x1E, 0x00, 0xA3,
    0x00, 0x1A, 0x00, 0x00, 0x4C, 0x32, 0x36, 0x38, 0x41, 0x32, 0x33, 0x30, 0x35, 0x31, 0x38, 0x30,
    0x30, 0x39, 0x35, 0x20, 0x32, 0x33, 0x30, 0x35, 0x31, 0x38, 0x20, 0x20, 0x68, 0xF0, 0x01, 0x34,
];

/// The captured dump padded to a full 128-byte lower page.
pub(crate) fn captured_sfp_page() -> Vec<u8> {
    let mut page = CAPTURED_SFP_A0.to_vec();
    page.resize(128, 0);
    page
}

/// The captured page with its check bytes at 63 and 95 rewritten so
/// `buffer[0..=63]` and `buffer[0..=95]` each sum to zero.
pub(crate) fn zero_sum_sfp_page() -> Vec<u8> {
    let mut page = captured_sfp_page();
    page[63] = checksum::compute(&page[..63]);
    page[95] = checksum::compute(&page[..95]);
    page
}

/// Write `text` space-padded into `buf[offset..offset + len]`.
pub(crate) fn put_ascii(buf: &mut [u8], offset: usize, len: usize, text: &str) {
    let field = &mut buf[offset..offset + len];
    field.fill(b' ');
    field[..text.len()].copy_from_slice(text.as_bytes());
}
