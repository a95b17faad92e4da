//! Protocol constants for the coding box and transceiver memory maps.
//!
//! Identifier values follow SFF-8024. Memory map offsets follow
//! SFF-8472 (SFP), INF-8077i (XFP), SFF-8636 (QSFP) and CMIS (QSFP-DD).

// ============================================================================
// Device Identification
// ============================================================================

/// STMicroelectronics Vendor ID (the coding box uses an STM32 HID bridge)
pub const CODING_BOX_VENDOR_ID: u16 = 0x0483;

/// Coding box Product ID
pub const CODING_BOX_PRODUCT_ID: u16 = 0x5750;

// ============================================================================
// Size Constants
// ============================================================================

/// HID report size; every command frame is padded to this length.
pub const REPORT_LEN: usize = 64;

/// Lower half of a two-wire memory page.
pub const LOWER_PAGE_LEN: u16 = 128;

/// Lower + upper half of a two-wire memory page.
pub const FULL_PAGE_LEN: u16 = 256;

/// Smallest buffer kept for a page read, regardless of response length.
pub const MIN_PAGE_BUFFER_LEN: usize = 128;

// ============================================================================
// Two-Wire Device Addresses
// ============================================================================

/// Serial ID / base information page
pub const ADDR_A0: u8 = 0xA0;

/// Diagnostic monitoring page (SFP family only)
pub const ADDR_A2: u8 = 0xA2;

// ============================================================================
// Identifier Byte Values (byte 0 of page A0)
// ============================================================================

pub const ID_SFP: u8 = 0x03;
/// Value the coding box reports for SFP+ modules.
pub const ID_SFP_PLUS: u8 = 0x04;
pub const ID_XFP: u8 = 0x06;
pub const ID_QSFP: u8 = 0x0C;
pub const ID_QSFP_PLUS: u8 = 0x0D;
pub const ID_QSFP28: u8 = 0x11;
pub const ID_QSFP_DD: u8 = 0x18;

// ============================================================================
// Timing
// ============================================================================

/// Default bound on a single receive.
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Time the module firmware needs after a reboot command.
pub const REBOOT_SETTLE_MS: u64 = 1000;

// ============================================================================
// Command Templates
// ============================================================================

/// Page read recovered from a bus capture of the coding box.
///
/// `23 00 01 A0 14 00 10` reads 16 bytes of A0 starting at 0x14.
pub const CAPTURED_READ_TEMPLATE: &str = "23 00 01 %a %o %2c";

// ============================================================================
// SFF-8472 Offsets
// ============================================================================

/// Diagnostic monitoring type byte in A0.
pub const SFP_DIAG_MONITORING_TYPE: usize = 92;

/// Bit 6 of the diagnostic monitoring type: DDM implemented.
pub const DIAG_DDM_IMPLEMENTED: u8 = 0x40;

/// A2 real-time diagnostic values (big-endian words).
pub const A2_TEMPERATURE: usize = 96;
pub const A2_VCC: usize = 98;
pub const A2_TX_BIAS: usize = 100;
pub const A2_TX_POWER: usize = 102;
pub const A2_RX_POWER: usize = 104;
