//! Module type registry.
//!
//! Each supported form factor has one immutable `ModuleDescriptor`
//! holding everything the protocol steps need: identifier bytes, page
//! addressing, checksum regions and the decoder field layout. Steps look
//! the descriptor up once instead of branching on the type.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checksum::ChecksumRule;
use crate::memory::PageId;
use crate::protocol::constants::*;

/// Supported transceiver form factors.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleType {
    #[default]
    Sfp,
    SfpPlus,
    Xfp,
    Qsfp,
    QsfpDd,
}

impl ModuleType {
    pub const ALL: [ModuleType; 5] = [
        ModuleType::Sfp,
        ModuleType::SfpPlus,
        ModuleType::Xfp,
        ModuleType::Qsfp,
        ModuleType::QsfpDd,
    ];

    pub fn descriptor(self) -> &'static ModuleDescriptor {
        match self {
            ModuleType::Sfp => &SFP,
            ModuleType::SfpPlus => &SFP_PLUS,
            ModuleType::Xfp => &XFP,
            ModuleType::Qsfp => &QSFP,
            ModuleType::QsfpDd => &QSFP_DD,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModuleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "sfp" => Ok(ModuleType::Sfp),
            "sfp+" | "sfp-plus" | "sfpplus" | "sfp28" | "sfp56" => Ok(ModuleType::SfpPlus),
            "xfp" => Ok(ModuleType::Xfp),
            "qsfp" | "qsfp+" | "qsfp-plus" | "qsfp28" => Ok(ModuleType::Qsfp),
            "qsfp-dd" | "qsfpdd" => Ok(ModuleType::QsfpDd),
            other => Err(format!("unknown module type '{other}'")),
        }
    }
}

/// Map an identifier byte to a module type.
///
/// Pure table lookup. `None` means the identifier is not in the registry;
/// callers keep their current selection in that case.
pub fn classify(identifier: u8) -> Option<ModuleType> {
    ModuleType::ALL
        .into_iter()
        .find(|m| m.descriptor().identifiers.contains(&identifier))
}

/// One checksum position. `end` holds the check byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChecksumRegion {
    pub end: usize,
    /// First byte of the check-code range under the SFF rule.
    pub sff_start: usize,
}

const fn region(sff_start: usize, end: usize) -> ChecksumRegion {
    ChecksumRegion { end, sff_start }
}

impl ChecksumRegion {
    /// First byte covered under `rule`. Zero-sum ranges always start at 0.
    pub fn start(&self, rule: ChecksumRule) -> usize {
        match rule {
            ChecksumRule::ZeroSum => 0,
            ChecksumRule::Sff => self.sff_start,
        }
    }
}

/// How to address one logical page on the two-wire bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub page: PageId,
    /// Two-wire device address.
    pub address: u8,
    pub offset: u8,
    /// Bytes to read.
    pub length: u16,
    /// Upper page select value.
    pub page_select: u8,
    pub checksums: &'static [ChecksumRegion],
}

/// Fixed-width field in the A0 buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub len: usize,
}

const fn field(offset: usize, len: usize) -> Field {
    Field { offset, len }
}

/// Unit of a link-length byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthUnit {
    Kilometers,
    Meters,
}

/// One link-length byte, tried in descriptor order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    pub offset: usize,
    pub unit: LengthUnit,
    /// Multiplier applied to the raw byte.
    pub scale: u32,
}

const fn km(offset: usize) -> LengthField {
    LengthField {
        offset,
        unit: LengthUnit::Kilometers,
        scale: 1,
    }
}

const fn meters(offset: usize, scale: u32) -> LengthField {
    LengthField {
        offset,
        unit: LengthUnit::Meters,
        scale,
    }
}

/// Bit rate byte and its unit in Mb/s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitRateField {
    pub offset: usize,
    pub scale_mbps: u32,
}

const fn bit_rate(offset: usize, scale_mbps: u32) -> BitRateField {
    BitRateField { offset, scale_mbps }
}

/// Wavelength word and its divisor (nm = raw / divisor).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavelengthField {
    pub offset: usize,
    pub divisor: u16,
}

/// Decoder offsets for one standard layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub connector: Option<usize>,
    pub vendor: Field,
    pub oui: Field,
    pub part_number: Field,
    pub revision: Field,
    pub serial_number: Field,
    pub date_code: Field,
    /// Nominal bit rate byte.
    pub bit_rate: Option<BitRateField>,
    /// Used instead of `bit_rate` when that byte reads 0xFF.
    pub extended_bit_rate: Option<BitRateField>,
    pub wavelength: Option<WavelengthField>,
    pub lengths: &'static [LengthField],
    /// Diagnostic monitoring type byte (DDM implemented flag).
    pub diag_type: Option<usize>,
}

/// Immutable description of a module type.
#[derive(Debug, PartialEq, Eq)]
pub struct ModuleDescriptor {
    pub module: ModuleType,
    pub name: &'static str,
    pub identifiers: &'static [u8],
    pub pages: &'static [PageLayout],
    /// Page A2 (diagnostic monitoring) is present.
    pub supports_ddm: bool,
    pub fields: FieldLayout,
}

impl ModuleDescriptor {
    pub fn page(&self, page: PageId) -> Option<&PageLayout> {
        self.pages.iter().find(|p| p.page == page)
    }

    /// Smallest buffer that covers every decoder field.
    pub fn min_decode_len(&self) -> usize {
        let f = &self.fields;
        [
            f.vendor,
            f.oui,
            f.part_number,
            f.revision,
            f.serial_number,
            f.date_code,
        ]
        .iter()
        .map(|fld| fld.offset + fld.len)
        .max()
        .unwrap_or(0)
    }
}

// ============================================================================
// SFP / SFP+ (SFF-8472)
// ============================================================================

// CC_BASE, CC_EXT
const SFF8472_A0_CHECKSUMS: &[ChecksumRegion] = &[region(0, 63), region(64, 95)];

// CC_DMI
const SFF8472_A2_CHECKSUMS: &[ChecksumRegion] = &[region(0, 95)];

const SFF8472_PAGES: &[PageLayout] = &[
    PageLayout {
        page: PageId::A0,
        address: ADDR_A0,
        offset: 0,
        length: LOWER_PAGE_LEN,
        page_select: 0,
        checksums: SFF8472_A0_CHECKSUMS,
    },
    PageLayout {
        page: PageId::A2,
        address: ADDR_A2,
        offset: 0,
        length: LOWER_PAGE_LEN,
        page_select: 0,
        checksums: SFF8472_A2_CHECKSUMS,
    },
];

const SFF8472_FIELDS: FieldLayout = FieldLayout {
    connector: Some(0x02),
    vendor: field(0x14, 16),
    oui: field(0x25, 3),
    part_number: field(0x28, 16),
    revision: field(0x38, 4),
    serial_number: field(0x44, 16),
    date_code: field(0x54, 8),
    bit_rate: Some(bit_rate(0x0C, 100)),
    extended_bit_rate: Some(bit_rate(0x42, 250)),
    wavelength: Some(WavelengthField {
        offset: 0x3C,
        divisor: 1,
    }),
    lengths: &[km(0x12), meters(0x11, 100), meters(0x10, 10)],
    diag_type: Some(SFP_DIAG_MONITORING_TYPE),
};

static SFP: ModuleDescriptor = ModuleDescriptor {
    module: ModuleType::Sfp,
    name: "SFP",
    identifiers: &[ID_SFP],
    pages: SFF8472_PAGES,
    supports_ddm: true,
    fields: SFF8472_FIELDS,
};

static SFP_PLUS: ModuleDescriptor = ModuleDescriptor {
    module: ModuleType::SfpPlus,
    name: "SFP+",
    identifiers: &[ID_SFP_PLUS],
    pages: SFF8472_PAGES,
    supports_ddm: true,
    fields: SFF8472_FIELDS,
};

// ============================================================================
// XFP (INF-8077i) and QSFP (SFF-8636): upper page layouts line up
// ============================================================================

// CC_BASE, CC_EXT
const UPPER_PAGE_CHECKSUMS: &[ChecksumRegion] = &[region(128, 191), region(192, 223)];

const UPPER_PAGE_A0: &[PageLayout] = &[PageLayout {
    page: PageId::A0,
    address: ADDR_A0,
    offset: 0,
    length: FULL_PAGE_LEN,
    page_select: 0,
    checksums: UPPER_PAGE_CHECKSUMS,
}];

const XFP_PAGES: &[PageLayout] = &[PageLayout {
    page: PageId::A0,
    address: ADDR_A0,
    offset: 0,
    length: FULL_PAGE_LEN,
    // Serial ID lives in upper page 01 on XFP.
    page_select: 1,
    checksums: UPPER_PAGE_CHECKSUMS,
}];

const UPPER_PAGE_FIELDS: FieldLayout = FieldLayout {
    connector: Some(130),
    vendor: field(148, 16),
    oui: field(165, 3),
    part_number: field(168, 16),
    revision: field(184, 2),
    serial_number: field(196, 16),
    date_code: field(212, 8),
    bit_rate: Some(bit_rate(140, 100)),
    extended_bit_rate: Some(bit_rate(222, 250)),
    wavelength: Some(WavelengthField {
        offset: 186,
        divisor: 20,
    }),
    lengths: &[km(142), meters(143, 2), meters(144, 1), meters(145, 1), meters(146, 1)],
    diag_type: None,
};

static XFP: ModuleDescriptor = ModuleDescriptor {
    module: ModuleType::Xfp,
    name: "XFP",
    identifiers: &[ID_XFP],
    pages: XFP_PAGES,
    supports_ddm: false,
    // No 0xFF escape to an extended rate byte on XFP.
    fields: FieldLayout {
        extended_bit_rate: None,
        ..UPPER_PAGE_FIELDS
    },
};

static QSFP: ModuleDescriptor = ModuleDescriptor {
    module: ModuleType::Qsfp,
    name: "QSFP",
    identifiers: &[ID_QSFP, ID_QSFP_PLUS, ID_QSFP28],
    pages: UPPER_PAGE_A0,
    supports_ddm: false,
    fields: UPPER_PAGE_FIELDS,
};

// ============================================================================
// QSFP-DD (CMIS)
// ============================================================================

const CMIS_PAGES: &[PageLayout] = &[PageLayout {
    page: PageId::A0,
    address: ADDR_A0,
    offset: 0,
    length: FULL_PAGE_LEN,
    page_select: 0,
    checksums: &[region(128, 222)],
}];

static QSFP_DD: ModuleDescriptor = ModuleDescriptor {
    module: ModuleType::QsfpDd,
    name: "QSFP-DD",
    identifiers: &[ID_QSFP_DD],
    pages: CMIS_PAGES,
    supports_ddm: false,
    fields: FieldLayout {
        connector: Some(203),
        vendor: field(129, 16),
        oui: field(145, 3),
        part_number: field(148, 16),
        revision: field(164, 2),
        serial_number: field(166, 16),
        date_code: field(182, 8),
        bit_rate: None,
        extended_bit_rate: None,
        wavelength: None,
        lengths: &[],
        diag_type: None,
    },
};
