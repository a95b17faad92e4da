//! Command frames and the pluggable command builder.
//!
//! The coding box wire format is only partly known, so frames are built
//! from per-module-type template tables instead of hardcoded literals.
//!
//! Template tokens are whitespace separated:
//! - `23`  : literal byte (hex)
//! - `%a`  : two-wire device address (A0/A2)
//! - `%o`  : byte offset within the page
//! - `%p`  : upper page select
//! - `%c`  : 8-bit length
//! - `%2c` : 16-bit length (big-endian)
//! - `%v`  : value to write
//!
//! Frames are zero-padded to the table's report length.

use std::collections::BTreeMap;
use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};

use super::constants::{ADDR_A0, CAPTURED_READ_TEMPLATE, REPORT_LEN};
use super::error::ProtocolError;
use crate::module_type::ModuleType;

/// Operation kind a frame is tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Identify,
    ReadPage,
    WriteByte,
    Reboot,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Identify => write!(f, "identify"),
            CommandKind::ReadPage => write!(f, "read-page"),
            CommandKind::WriteByte => write!(f, "write-byte"),
            CommandKind::Reboot => write!(f, "reboot"),
        }
    }
}

/// A protocol command with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Type-agnostic identifier read.
    Identify,
    ReadPage {
        address: u8,
        offset: u8,
        length: u16,
        page_select: u8,
    },
    WriteByte {
        address: u8,
        offset: u8,
        page_select: u8,
        value: u8,
    },
    Reboot,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Identify => CommandKind::Identify,
            Command::ReadPage { .. } => CommandKind::ReadPage,
            Command::WriteByte { .. } => CommandKind::WriteByte,
            Command::Reboot => CommandKind::Reboot,
        }
    }

    /// Placeholder values this command substitutes into a template.
    fn params(&self) -> Params {
        match *self {
            // The identifier is byte 0 of A0 on every module family.
            Command::Identify => Params {
                address: ADDR_A0,
                length: 1,
                ..Params::default()
            },
            Command::ReadPage {
                address,
                offset,
                length,
                page_select,
            } => Params {
                address,
                offset,
                length,
                page_select,
                value: 0,
            },
            Command::WriteByte {
                address,
                offset,
                page_select,
                value,
            } => Params {
                address,
                offset,
                length: 1,
                page_select,
                value,
            },
            Command::Reboot => Params::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Params {
    address: u8,
    offset: u8,
    length: u16,
    page_select: u8,
    value: u8,
}

/// Opaque byte sequence sent to the transport, tagged with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFrame {
    pub kind: CommandKind,
    pub bytes: Vec<u8>,
}

impl CommandFrame {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Strategy mapping a command to a frame for a given module type.
///
/// `module == None` requests the type-agnostic encoding used before the
/// module type is known (identify).
pub trait CommandBuilder: Send + Sync {
    fn build(
        &self,
        module: Option<ModuleType>,
        command: &Command,
    ) -> Result<CommandFrame, ProtocolError>;

    /// Bytes of framing to strip from each response before the payload.
    fn response_header_len(&self, _module: Option<ModuleType>) -> usize {
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Address,
    Offset,
    PageSelect,
    Length8,
    Length16,
    Value,
}

fn parse_template(template: &str) -> Result<Vec<Token>, ProtocolError> {
    template
        .split_whitespace()
        .map(|tok| match tok {
            "%a" => Ok(Token::Address),
            "%o" => Ok(Token::Offset),
            "%p" => Ok(Token::PageSelect),
            "%c" => Ok(Token::Length8),
            "%2c" => Ok(Token::Length16),
            "%v" => Ok(Token::Value),
            hex => u8::from_str_radix(hex.trim_start_matches("0x"), 16)
                .map(Token::Literal)
                .map_err(|_| ProtocolError::InvalidTemplate {
                    template: template.to_string(),
                    token: tok.to_string(),
                }),
        })
        .collect()
}

/// Template table for one module type (or the generic fallback).
///
/// Every field is optional so a per-type table only needs to name what
/// differs from the generic one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTable {
    /// Report length frames are padded to (0 disables padding).
    pub report_len: Option<usize>,
    /// Framing bytes preceding the payload in each response.
    pub response_header_len: Option<usize>,
    /// Identify template. Falls back to `read` addressed at A0/0/1.
    pub identify: Option<String>,
    pub read: Option<String>,
    pub write: Option<String>,
    pub reboot: Option<String>,
}

impl CommandTable {
    /// Generic table with the only frame layout known from a bus capture.
    pub fn captured() -> Self {
        Self {
            report_len: Some(REPORT_LEN),
            response_header_len: Some(0),
            read: Some(CAPTURED_READ_TEMPLATE.to_string()),
            ..Self::default()
        }
    }

    /// Fields set in `self` win; missing ones come from `base`.
    pub fn overlay(&self, base: &CommandTable) -> CommandTable {
        CommandTable {
            report_len: self.report_len.or(base.report_len),
            response_header_len: self.response_header_len.or(base.response_header_len),
            identify: self.identify.clone().or_else(|| base.identify.clone()),
            read: self.read.clone().or_else(|| base.read.clone()),
            write: self.write.clone().or_else(|| base.write.clone()),
            reboot: self.reboot.clone().or_else(|| base.reboot.clone()),
        }
    }

    fn template(&self, kind: CommandKind) -> Option<&str> {
        match kind {
            CommandKind::Identify => self.identify.as_deref().or(self.read.as_deref()),
            CommandKind::ReadPage => self.read.as_deref(),
            CommandKind::WriteByte => self.write.as_deref(),
            CommandKind::Reboot => self.reboot.as_deref(),
        }
    }

    /// Check every template present in the table parses.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        [&self.identify, &self.read, &self.write, &self.reboot]
            .into_iter()
            .flatten()
            .try_for_each(|t| parse_template(t).map(|_| ()))
    }

    /// Encode `command` with this table. `label` names the table in errors.
    pub fn encode(&self, label: &str, command: &Command) -> Result<CommandFrame, ProtocolError> {
        let kind = command.kind();
        let template = self
            .template(kind)
            .ok_or_else(|| ProtocolError::CommandUnavailable {
                kind,
                module: label.to_string(),
            })?;

        let params = command.params();
        let mut bytes = Vec::with_capacity(REPORT_LEN);
        for token in parse_template(template)? {
            match token {
                Token::Literal(b) => bytes.push(b),
                Token::Address => bytes.push(params.address),
                Token::Offset => bytes.push(params.offset),
                Token::PageSelect => bytes.push(params.page_select),
                Token::Length8 => bytes.push(params.length.min(u8::MAX as u16) as u8),
                Token::Length16 => {
                    let mut buf = [0u8; 2];
                    BigEndian::write_u16(&mut buf, params.length);
                    bytes.extend_from_slice(&buf);
                }
                Token::Value => bytes.push(params.value),
            }
        }

        let report_len = self.report_len.unwrap_or(REPORT_LEN);
        if report_len > 0 {
            if bytes.len() > report_len {
                return Err(ProtocolError::FrameTooLong {
                    kind,
                    len: bytes.len(),
                    report_len,
                });
            }
            bytes.resize(report_len, 0);
        }

        Ok(CommandFrame { kind, bytes })
    }
}

/// Generic table plus per-module-type overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandSet {
    pub generic: CommandTable,
    pub modules: BTreeMap<ModuleType, CommandTable>,
}

impl Default for CommandSet {
    fn default() -> Self {
        Self {
            generic: CommandTable::captured(),
            modules: BTreeMap::new(),
        }
    }
}

impl CommandSet {
    /// Effective table for `module` (generic when `None`).
    ///
    /// Per-type entries win over generic ones, which win over the
    /// captured defaults.
    pub fn table_for(&self, module: Option<ModuleType>) -> CommandTable {
        let generic = self.generic.overlay(&CommandTable::captured());
        match module.and_then(|m| self.modules.get(&m)) {
            Some(table) => table.overlay(&generic),
            None => generic,
        }
    }

    pub fn validate(&self) -> Result<(), ProtocolError> {
        self.generic.validate()?;
        self.modules.values().try_for_each(CommandTable::validate)
    }
}

impl CommandBuilder for CommandSet {
    fn build(
        &self,
        module: Option<ModuleType>,
        command: &Command,
    ) -> Result<CommandFrame, ProtocolError> {
        let label = module.map_or_else(|| "generic table".to_string(), |m| m.to_string());
        self.table_for(module).encode(&label, command)
    }

    fn response_header_len(&self, module: Option<ModuleType>) -> usize {
        self.table_for(module).response_header_len.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> CommandSet {
        let mut set = CommandSet::default();
        set.generic.write = Some("23 00 02 %a %o %v".into());
        set.generic.reboot = Some("23 00 05".into());
        set.modules.insert(
            ModuleType::Qsfp,
            CommandTable {
                reboot: Some("23 00 06 %a".into()),
                ..CommandTable::default()
            },
        );
        set
    }

    #[test]
    fn test_captured_read_layout() {
        let set = CommandSet::default();
        let frame = set
            .build(
                Some(ModuleType::Sfp),
                &Command::ReadPage {
                    address: 0xA0,
                    offset: 0x14,
                    length: 0x10,
                    page_select: 0,
                },
            )
            .unwrap();
        assert_eq!(frame.kind, CommandKind::ReadPage);
        assert_eq!(frame.len(), REPORT_LEN);
        assert_eq!(&frame.bytes[..7], &[0x23, 0x00, 0x01, 0xA0, 0x14, 0x00, 0x10]);
        assert!(frame.bytes[7..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_identify_falls_back_to_read_template() {
        let frame = CommandSet::default().build(None, &Command::Identify).unwrap();
        assert_eq!(frame.kind, CommandKind::Identify);
        assert_eq!(&frame.bytes[..7], &[0x23, 0x00, 0x01, 0xA0, 0x00, 0x00, 0x01]);
    }

    #[test]
    fn test_write_without_template_is_unavailable() {
        let err = CommandSet::default()
            .build(
                Some(ModuleType::Sfp),
                &Command::WriteByte {
                    address: 0xA0,
                    offset: 0,
                    page_select: 0,
                    value: 1,
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::CommandUnavailable {
                kind: CommandKind::WriteByte,
                ..
            }
        ));
    }

    #[test]
    fn test_per_type_override() {
        let set = configured();
        let sfp = set.build(Some(ModuleType::Sfp), &Command::Reboot).unwrap();
        assert_eq!(&sfp.bytes[..4], &[0x23, 0x00, 0x05, 0x00]);

        let qsfp = set.build(Some(ModuleType::Qsfp), &Command::Reboot).unwrap();
        assert_eq!(&qsfp.bytes[..4], &[0x23, 0x00, 0x06, 0x00]);

        // Write is not overridden for QSFP, so the generic template applies.
        let write = set
            .build(
                Some(ModuleType::Qsfp),
                &Command::WriteByte {
                    address: 0xA0,
                    offset: 0x94,
                    page_select: 0,
                    value: 0x41,
                },
            )
            .unwrap();
        assert_eq!(&write.bytes[..6], &[0x23, 0x00, 0x02, 0xA0, 0x94, 0x41]);
    }

    #[test]
    fn test_invalid_template_rejected() {
        let mut set = CommandSet::default();
        set.generic.reboot = Some("23 zz".into());
        assert!(matches!(
            set.validate(),
            Err(ProtocolError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_frame_too_long() {
        let mut set = CommandSet::default();
        set.generic.report_len = Some(2);
        let err = set.build(None, &Command::Identify).unwrap_err();
        assert!(matches!(err, ProtocolError::FrameTooLong { len: 7, .. }));
    }

    #[test]
    fn test_unpadded_frames() {
        let mut set = configured();
        set.generic.report_len = Some(0);
        let frame = set.build(Some(ModuleType::Sfp), &Command::Reboot).unwrap();
        assert_eq!(frame.bytes, vec![0x23, 0x00, 0x05]);
    }
}
