//! Event system for front-end decoupling.
//!
//! Allows CLI/GUI front ends to subscribe to protocol events without
//! tight coupling to the core logic. Every event is also rendered into
//! the session's append-only `EventLog`.

use std::fmt;

use chrono::{DateTime, Local};

use crate::checksum::ChecksumStatus;
use crate::dump::hex_string;
use crate::memory::PageId;
use crate::module_type::ModuleType;
use crate::protocol::CommandKind;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Session phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Detecting,
    Reading,
    Writing,
    Complete,
    Error,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "Idle"),
            SessionPhase::Detecting => write!(f, "Detecting"),
            SessionPhase::Reading => write!(f, "Reading"),
            SessionPhase::Writing => write!(f, "Writing"),
            SessionPhase::Complete => write!(f, "Complete"),
            SessionPhase::Error => write!(f, "Error"),
        }
    }
}

/// Frame direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Host -> coding box
    Rx, // Coding box -> host
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Events emitted by a module session.
#[derive(Debug, Clone)]
pub enum XcvrEvent {
    /// Coding box present at session start.
    DeviceConnected { vid: u16, pid: u16 },
    /// Phase changed.
    PhaseChanged { from: SessionPhase, to: SessionPhase },
    /// Detection classified the identifier byte.
    ModuleDetected { module: ModuleType, identifier: u8 },
    /// Detection produced no verdict.
    ModuleUnidentified {
        identifier: Option<u8>,
        reason: String,
    },
    /// The controller committed a new selection.
    SelectionChanged {
        from: ModuleType,
        to: ModuleType,
        automatic: bool,
    },
    /// Frame sent/received.
    Packet {
        direction: PacketDirection,
        kind: CommandKind,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// A page read finished (possibly short).
    PageRead {
        module: ModuleType,
        page: PageId,
        received: usize,
        expected: usize,
    },
    /// One checksum region evaluated.
    Checksum {
        page: PageId,
        end_offset: usize,
        status: ChecksumStatus,
    },
    /// Read-back after a write matched.
    WriteVerified { address: u8, offset: u8, value: u8 },
    /// Read-back after a write did not match.
    VerificationFailed {
        address: u8,
        offset: u8,
        expected: u8,
        observed: Option<u8>,
    },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Error occurred.
    Error { message: String },
    /// Operation completed.
    Complete,
}

impl XcvrEvent {
    /// Level the event is logged at.
    pub fn level(&self) -> LogLevel {
        match self {
            XcvrEvent::Packet { .. } => LogLevel::Trace,
            XcvrEvent::PhaseChanged { .. } => LogLevel::Debug,
            XcvrEvent::Checksum {
                status: ChecksumStatus::Fail,
                ..
            }
            | XcvrEvent::ModuleUnidentified { .. }
            | XcvrEvent::VerificationFailed { .. } => LogLevel::Warn,
            XcvrEvent::Error { .. } => LogLevel::Error,
            XcvrEvent::Log { level, .. } => *level,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for XcvrEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XcvrEvent::DeviceConnected { vid, pid } => {
                write!(f, "Coding box connected ({vid:04X}:{pid:04X})")
            }
            XcvrEvent::PhaseChanged { from, to } => write!(f, "Phase {from} -> {to}"),
            XcvrEvent::ModuleDetected { module, identifier } => {
                write!(f, "{module} module detected (identifier 0x{identifier:02X})")
            }
            XcvrEvent::ModuleUnidentified { identifier, reason } => match identifier {
                Some(id) => write!(f, "Module not identified (identifier 0x{id:02X}): {reason}"),
                None => write!(f, "Module not identified: {reason}"),
            },
            XcvrEvent::SelectionChanged {
                from,
                to,
                automatic,
            } => {
                let how = if *automatic { "detected" } else { "selected" };
                write!(f, "Module type changed from {from} to {to} ({how})")
            }
            XcvrEvent::Packet {
                direction,
                kind,
                length,
                data,
            } => {
                write!(f, "{direction} {kind} [{length} bytes]")?;
                if let Some(data) = data {
                    write!(f, " {}", hex_string(data))?;
                }
                Ok(())
            }
            XcvrEvent::PageRead {
                module,
                page,
                received,
                expected,
            } => {
                if received < expected {
                    write!(
                        f,
                        "{module}-{page} read short: {received} of {expected} bytes"
                    )
                } else {
                    write!(f, "{module}-{page} read {received} bytes")
                }
            }
            XcvrEvent::Checksum {
                page,
                end_offset,
                status,
            } => write!(f, "{page} {end_offset} CheckSum {status}"),
            XcvrEvent::WriteVerified {
                address,
                offset,
                value,
            } => write!(
                f,
                "Verify OK: {address:02X}h offset 0x{offset:02X} = 0x{value:02X}"
            ),
            XcvrEvent::VerificationFailed {
                address,
                offset,
                expected,
                observed,
            } => match observed {
                Some(obs) => write!(
                    f,
                    "Verification failed at {address:02X}h offset 0x{offset:02X}: intended 0x{expected:02X}, observed 0x{obs:02X}"
                ),
                None => write!(
                    f,
                    "Verification failed at {address:02X}h offset 0x{offset:02X}: intended 0x{expected:02X}, observed nothing"
                ),
            },
            XcvrEvent::Log { message, .. } => write!(f, "{message}"),
            XcvrEvent::Error { message } => write!(f, "Error: {message}"),
            XcvrEvent::Complete => write!(f, "Operation complete"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your front end to receive updates.
pub trait XcvrObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &XcvrEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl XcvrObserver for NullObserver {
    fn on_event(&self, _event: &XcvrEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl XcvrObserver for TracingObserver {
    fn on_event(&self, event: &XcvrEvent) {
        match event {
            XcvrEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Coding box connected");
            }
            XcvrEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            XcvrEvent::ModuleDetected { module, identifier } => {
                tracing::info!(module = %module, identifier = %format!("0x{:02X}", identifier), "Module detected");
            }
            XcvrEvent::SelectionChanged { from, to, automatic } => {
                tracing::info!(from = %from, to = %to, automatic, "Module type changed");
            }
            XcvrEvent::Packet {
                direction,
                kind,
                length,
                ..
            } => {
                tracing::trace!(dir = %direction, kind = %kind, len = length, "HID frame");
            }
            XcvrEvent::Checksum {
                page,
                end_offset,
                status,
            } => {
                if *status == ChecksumStatus::Fail {
                    tracing::warn!(page = %page, end = end_offset, "Checksum failed");
                } else {
                    tracing::debug!(page = %page, end = end_offset, status = %status, "Checksum");
                }
            }
            other => match other.level() {
                LogLevel::Trace => tracing::trace!("{}", other),
                LogLevel::Debug => tracing::debug!("{}", other),
                LogLevel::Info => tracing::info!("{}", other),
                LogLevel::Warn => tracing::warn!("{}", other),
                LogLevel::Error => tracing::error!("{}", other),
            },
        }
    }
}

/// One timestamped line of the event log.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn from_event(event: &XcvrEvent) -> Self {
        Self {
            timestamp: Local::now(),
            level: event.level(),
            message: event.to_string(),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.timestamp.format("%H:%M:%S"), self.message)
    }
}

/// Append-only, ordered record of protocol events.
///
/// Consumers only read it; entries are added by the session controller.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    entries: Vec<LogEntry>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, entry: LogEntry) {
        self.entries.push(entry);
    }

    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.entries.extend(entries);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Timestamped lines, oldest first.
    pub fn lines(&self) -> Vec<String> {
        self.entries.iter().map(ToString::to_string).collect()
    }

    /// True if any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.entries.iter().any(|e| e.message.contains(needle))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verification_event_names_both_values() {
        let event = XcvrEvent::VerificationFailed {
            address: 0xA0,
            offset: 0x14,
            expected: 0x4F,
            observed: Some(0x20),
        };
        let text = event.to_string();
        assert!(text.contains("intended 0x4F"));
        assert!(text.contains("observed 0x20"));
        assert_eq!(event.level(), LogLevel::Warn);
    }

    #[test]
    fn test_log_lines_are_timestamped_in_order() {
        let mut log = EventLog::new();
        log.push(LogEntry::from_event(&XcvrEvent::Log {
            level: LogLevel::Info,
            message: "first".into(),
        }));
        log.push(LogEntry::from_event(&XcvrEvent::Complete));

        let lines = log.lines();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - first"));
        assert!(lines[1].ends_with(" - Operation complete"));
        // "HH:MM:SS - "
        assert_eq!(lines[0].find(" - "), Some(8));
    }

    #[test]
    fn test_checksum_event_text() {
        let event = XcvrEvent::Checksum {
            page: PageId::A0,
            end_offset: 63,
            status: ChecksumStatus::Pass,
        };
        assert_eq!(event.to_string(), "A0 63 CheckSum OK!");
    }
}
