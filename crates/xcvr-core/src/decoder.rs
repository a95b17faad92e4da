//! A0 decoder.
//!
//! Pure and total: every field is read best-effort from whatever part of
//! the buffer exists, so corrupted or short dumps still decode.

use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use chrono::NaiveDate;

use crate::module_type::{Field, LengthUnit, ModuleType};
use crate::protocol::constants::DIAG_DDM_IMPLEMENTED;

/// Optical reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLength {
    Kilometers(u32),
    Meters(u32),
    NotAvailable,
}

impl fmt::Display for LinkLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkLength::Kilometers(km) => write!(f, "{km} km"),
            LinkLength::Meters(m) => write!(f, "{m} m"),
            LinkLength::NotAvailable => write!(f, "N/A"),
        }
    }
}

/// Decoded module information. Re-decode to refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub module: ModuleType,
    pub identifier: Option<u8>,
    pub connector: Option<u8>,
    pub vendor: String,
    /// Six lowercase hex digits.
    pub oui: String,
    pub part_number: String,
    pub revision: String,
    pub serial_number: String,
    pub date_code: String,
    /// Parsed from the YYMMDD prefix of the date code.
    pub manufactured: Option<NaiveDate>,
    pub data_rate_mbps: Option<u32>,
    pub wavelength_nm: Option<f32>,
    pub length: LinkLength,
    pub supports_ddm: bool,
    pub raw: Vec<u8>,
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Type:       {}", self.module)?;
        if let Some(id) = self.identifier {
            writeln!(f, "Identifier: 0x{id:02X}")?;
        }
        writeln!(f, "Vendor:     {}", self.vendor)?;
        writeln!(f, "OUI:        {}", self.oui)?;
        writeln!(f, "Part:       {}", self.part_number)?;
        writeln!(f, "Revision:   {}", self.revision)?;
        writeln!(f, "Serial:     {}", self.serial_number)?;
        match self.manufactured {
            Some(date) => writeln!(f, "Date code:  {} ({date})", self.date_code)?,
            None => writeln!(f, "Date code:  {}", self.date_code)?,
        }
        match self.data_rate_mbps {
            Some(rate) => writeln!(f, "Data rate:  {rate} Mb/s")?,
            None => writeln!(f, "Data rate:  N/A")?,
        }
        match self.wavelength_nm {
            Some(nm) => writeln!(f, "Wavelength: {nm} nm")?,
            None => writeln!(f, "Wavelength: N/A")?,
        }
        writeln!(f, "Length:     {}", self.length)?;
        write!(f, "DDM:        {}", if self.supports_ddm { "yes" } else { "no" })
    }
}

/// Decode an A0 buffer with `module`'s field layout.
pub fn decode(module: ModuleType, buffer: &[u8]) -> ModuleInfo {
    let descriptor = module.descriptor();
    let fields = &descriptor.fields;
    let byte = |offset: usize| buffer.get(offset).copied();

    let date_code = text(buffer, fields.date_code);
    let manufactured = parse_date_code(&date_code);

    let data_rate_mbps = fields.bit_rate.and_then(|nominal| {
        // 0xFF: rate too high for the nominal byte, look in the extended one
        let rate = match (byte(nominal.offset)?, fields.extended_bit_rate) {
            (0xFF, Some(ext)) => byte(ext.offset)? as u32 * ext.scale_mbps,
            (raw, _) => raw as u32 * nominal.scale_mbps,
        };
        (rate != 0).then_some(rate)
    });

    let wavelength_nm = fields.wavelength.and_then(|w| {
        let raw = buffer.get(w.offset..w.offset + 2).map(BigEndian::read_u16)?;
        (raw != 0).then(|| raw as f32 / w.divisor.max(1) as f32)
    });

    let length = fields
        .lengths
        .iter()
        .find_map(|l| {
            let raw = byte(l.offset).filter(|&b| b != 0)? as u32 * l.scale;
            Some(match l.unit {
                LengthUnit::Kilometers => LinkLength::Kilometers(raw),
                LengthUnit::Meters => LinkLength::Meters(raw),
            })
        })
        .unwrap_or(LinkLength::NotAvailable);

    let ddm_flag = fields
        .diag_type
        .and_then(byte)
        .is_some_and(|b| b & DIAG_DDM_IMPLEMENTED != 0);

    ModuleInfo {
        module,
        identifier: byte(0),
        connector: fields.connector.and_then(byte),
        vendor: text(buffer, fields.vendor),
        oui: slice(buffer, fields.oui)
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect(),
        part_number: text(buffer, fields.part_number),
        revision: text(buffer, fields.revision),
        serial_number: text(buffer, fields.serial_number),
        date_code,
        manufactured,
        data_rate_mbps,
        wavelength_nm,
        length,
        supports_ddm: descriptor.supports_ddm && ddm_flag,
        raw: buffer.to_vec(),
    }
}

/// The part of `field` that lies inside `buffer`.
fn slice(buffer: &[u8], field: Field) -> &[u8] {
    let end = (field.offset + field.len).min(buffer.len());
    buffer.get(field.offset..end).unwrap_or(&[])
}

/// Right-trim spaces and NULs, then replace non-printable bytes with '.'.
fn text(buffer: &[u8], field: Field) -> String {
    let bytes = slice(buffer, field);
    let len = bytes
        .iter()
        .rposition(|&b| b != b' ' && b != 0)
        .map_or(0, |i| i + 1);
    bytes[..len]
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '.' })
        .collect()
}

fn parse_date_code(code: &str) -> Option<NaiveDate> {
    let digits = code.get(..6)?;
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = digits[0..2].parse().ok()?;
    let mm: u32 = digits[2..4].parse().ok()?;
    let dd: u32 = digits[4..6].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + yy, mm, dd)
}
