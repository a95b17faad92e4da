//! Module type detection.
//!
//! The detector only proposes a type. Committing a selection change is
//! left to the session controller.

use std::fmt;

use tracing::{debug, info, instrument};

use crate::events::{XcvrEvent, XcvrObserver};
use crate::module_type::{ModuleType, classify};
use crate::protocol::{Command, CommandKind, ProtocolContext, ProtocolError};
use crate::transport::Transport;

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorState {
    #[default]
    Idle,
    Detecting,
    Identified(ModuleType),
    Unidentified,
}

impl fmt::Display for DetectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorState::Idle => write!(f, "IDLE"),
            DetectorState::Detecting => write!(f, "DETECTING"),
            DetectorState::Identified(m) => write!(f, "IDENTIFIED({m})"),
            DetectorState::Unidentified => write!(f, "UNIDENTIFIED"),
        }
    }
}

/// Why detection gave no verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnidentifiedReason {
    /// Identifier byte not in the registry.
    UnknownIdentifier,
    Timeout,
    NoResponse,
    NotConnected,
    /// Any other transport or command failure.
    Failed(String),
}

impl fmt::Display for UnidentifiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnidentifiedReason::UnknownIdentifier => write!(f, "unknown identifier"),
            UnidentifiedReason::Timeout => write!(f, "timeout"),
            UnidentifiedReason::NoResponse => write!(f, "no response"),
            UnidentifiedReason::NotConnected => write!(f, "not connected"),
            UnidentifiedReason::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

impl From<&ProtocolError> for UnidentifiedReason {
    fn from(err: &ProtocolError) -> Self {
        match err {
            ProtocolError::Timeout { .. } => UnidentifiedReason::Timeout,
            ProtocolError::NoResponse { .. } => UnidentifiedReason::NoResponse,
            ProtocolError::NotConnected => UnidentifiedReason::NotConnected,
            ProtocolError::UnknownModuleType(_) => UnidentifiedReason::UnknownIdentifier,
            other => UnidentifiedReason::Failed(other.to_string()),
        }
    }
}

/// Outcome of one detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    Identified { module: ModuleType, identifier: u8 },
    Unidentified {
        /// Raw identifier byte, when one was received.
        identifier: Option<u8>,
        reason: UnidentifiedReason,
    },
}

impl Detection {
    /// Proposed module type, if any.
    pub fn module(&self) -> Option<ModuleType> {
        match self {
            Detection::Identified { module, .. } => Some(*module),
            Detection::Unidentified { .. } => None,
        }
    }

    pub fn identifier(&self) -> Option<u8> {
        match self {
            Detection::Identified { identifier, .. } => Some(*identifier),
            Detection::Unidentified { identifier, .. } => *identifier,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Detection::Unidentified {
                reason: UnidentifiedReason::Timeout,
                ..
            }
        )
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detection::Identified { module, identifier } => {
                write!(f, "{module} (identifier 0x{identifier:02X})")
            }
            Detection::Unidentified {
                identifier: Some(id),
                reason,
            } => write!(f, "unidentified (identifier 0x{id:02X}, {reason})"),
            Detection::Unidentified {
                identifier: None,
                reason,
            } => write!(f, "unidentified ({reason})"),
        }
    }
}

/// Identify -> classify state machine. One instance per detection run.
#[derive(Debug, Default)]
pub struct Detector {
    state: DetectorState,
}

impl Detector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    fn goto_state(&mut self, new_state: DetectorState) {
        debug!(from = %self.state, to = %new_state, "Detector transition");
        self.state = new_state;
    }

    /// Send a type-agnostic identify and classify the identifier byte.
    ///
    /// Never fails: transport problems and unknown identifiers come back
    /// as `Detection::Unidentified`.
    #[instrument(skip_all)]
    pub fn detect<T: Transport + ?Sized, O: XcvrObserver + ?Sized>(
        &mut self,
        ctx: &mut ProtocolContext<'_, T, O>,
    ) -> Detection {
        self.goto_state(DetectorState::Detecting);

        let detection = match Self::read_identifier(ctx) {
            Ok(identifier) => match classify(identifier) {
                Some(module) => Detection::Identified { module, identifier },
                None => Detection::Unidentified {
                    identifier: Some(identifier),
                    reason: UnidentifiedReason::UnknownIdentifier,
                },
            },
            Err(e) => Detection::Unidentified {
                identifier: None,
                reason: UnidentifiedReason::from(&e),
            },
        };

        match &detection {
            Detection::Identified { module, identifier } => {
                info!(module = %module, identifier = %format!("0x{:02X}", identifier), "Module identified");
                self.goto_state(DetectorState::Identified(*module));
                ctx.emit(XcvrEvent::ModuleDetected {
                    module: *module,
                    identifier: *identifier,
                });
            }
            Detection::Unidentified { identifier, reason } => {
                self.goto_state(DetectorState::Unidentified);
                ctx.emit(XcvrEvent::ModuleUnidentified {
                    identifier: *identifier,
                    reason: reason.to_string(),
                });
            }
        }
        detection
    }

    fn read_identifier<T: Transport + ?Sized, O: XcvrObserver + ?Sized>(
        ctx: &mut ProtocolContext<'_, T, O>,
    ) -> Result<u8, ProtocolError> {
        let response = ctx.transact(None, &Command::Identify)?;
        response
            .payload()
            .first()
            .copied()
            .ok_or(ProtocolError::NoResponse {
                kind: CommandKind::Identify,
            })
    }
}
