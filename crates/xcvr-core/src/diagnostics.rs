//! A2 real-time diagnostics (SFF-8472 internally calibrated values).

use std::fmt;

use byteorder::{BigEndian, ByteOrder};

use crate::protocol::constants::{A2_RX_POWER, A2_TEMPERATURE, A2_TX_BIAS, A2_TX_POWER, A2_VCC};

/// Diagnostic readings. A reading is `None` when the buffer does not cover it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Diagnostics {
    pub temperature_c: Option<f32>,
    pub vcc_v: Option<f32>,
    pub tx_bias_ma: Option<f32>,
    pub tx_power_mw: Option<f32>,
    pub rx_power_mw: Option<f32>,
}

impl Diagnostics {
    pub fn tx_power_dbm(&self) -> Option<f32> {
        self.tx_power_mw.and_then(to_dbm)
    }

    pub fn rx_power_dbm(&self) -> Option<f32> {
        self.rx_power_mw.and_then(to_dbm)
    }
}

/// mW to dBm. `None` for zero or negative power.
pub fn to_dbm(mw: f32) -> Option<f32> {
    (mw > 0.0).then(|| 10.0 * mw.log10())
}

fn word(buffer: &[u8], offset: usize) -> Option<u16> {
    buffer.get(offset..offset + 2).map(BigEndian::read_u16)
}

fn signed_word(buffer: &[u8], offset: usize) -> Option<i16> {
    buffer.get(offset..offset + 2).map(BigEndian::read_i16)
}

/// Decode the diagnostic block of an A2 buffer.
pub fn decode(a2: &[u8]) -> Diagnostics {
    Diagnostics {
        // Signed, 1/256 degC
        temperature_c: signed_word(a2, A2_TEMPERATURE).map(|t| t as f32 / 256.0),
        // 100 uV
        vcc_v: word(a2, A2_VCC).map(|v| v as f32 / 10_000.0),
        // 2 uA
        tx_bias_ma: word(a2, A2_TX_BIAS).map(|b| b as f32 * 0.002),
        // 0.1 uW
        tx_power_mw: word(a2, A2_TX_POWER).map(|p| p as f32 / 10_000.0),
        rx_power_mw: word(a2, A2_RX_POWER).map(|p| p as f32 / 10_000.0),
    }
}

fn reading(f: &mut fmt::Formatter<'_>, label: &str, value: Option<f32>, unit: &str) -> fmt::Result {
    match value {
        Some(v) => writeln!(f, "{label:<12}{v:.2} {unit}"),
        None => writeln!(f, "{label:<12}N/A"),
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        reading(f, "Temperature", self.temperature_c, "C")?;
        reading(f, "Vcc", self.vcc_v, "V")?;
        reading(f, "TX bias", self.tx_bias_ma, "mA")?;
        reading(f, "TX power", self.tx_power_dbm(), "dBm")?;
        reading(f, "RX power", self.rx_power_dbm(), "dBm")
    }
}
