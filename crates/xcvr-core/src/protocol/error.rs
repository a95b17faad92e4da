//! Protocol errors.

use thiserror::Error;

use super::command::CommandKind;
use crate::memory::PageId;
use crate::module_type::ModuleType;
use crate::transport::TransportError;

/// Errors that abort a protocol step.
///
/// Checksum mismatches and read-back mismatches are not errors: they are
/// reported as data on `MemoryPage` and `WriteResult`.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Not connected to coding box")]
    NotConnected,

    #[error("Timeout after {timeout_ms}ms waiting for {kind} response")]
    Timeout { kind: CommandKind, timeout_ms: u64 },

    #[error("No response to {kind} command")]
    NoResponse { kind: CommandKind },

    #[error("Invalid response to {kind} command: {reason}")]
    InvalidResponse { kind: CommandKind, reason: String },

    #[error("{module} has no page {page}")]
    PageUnavailable { module: ModuleType, page: PageId },

    #[error("Unknown module identifier 0x{0:02X}")]
    UnknownModuleType(u8),

    #[error("No {kind} command defined for {module}")]
    CommandUnavailable { kind: CommandKind, module: String },

    #[error("Invalid token '{token}' in command template '{template}'")]
    InvalidTemplate { template: String, token: String },

    #[error("{kind} frame is {len} bytes but a report holds {report_len}")]
    FrameTooLong {
        kind: CommandKind,
        len: usize,
        report_len: usize,
    },

    #[error("Transport error: {0}")]
    Transport(#[source] TransportError),
}

impl ProtocolError {
    /// Classify a transport failure that happened while handling `kind`.
    pub fn from_transport(err: TransportError, kind: CommandKind) -> Self {
        match err {
            TransportError::NotConnected => ProtocolError::NotConnected,
            TransportError::Timeout { timeout_ms } => ProtocolError::Timeout { kind, timeout_ms },
            other => ProtocolError::Transport(other),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Timeout { .. })
    }
}
