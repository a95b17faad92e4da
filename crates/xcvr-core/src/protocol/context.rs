//! Per-operation protocol context.
//!
//! Bundles the link, the command builder and the observer for one
//! controller operation, and buffers the log entries it produces until
//! the controller commits them at the end of the step.

use std::time::Duration;

use tracing::debug;

use super::command::{Command, CommandBuilder, CommandFrame, CommandKind};
use super::error::ProtocolError;
use super::response::ResponseFrame;
use crate::checksum::ChecksumRule;
use crate::events::{LogEntry, LogLevel, PacketDirection, XcvrEvent, XcvrObserver};
use crate::module_type::ModuleType;
use crate::transport::Transport;

/// Bytes of each frame copied into packet events.
const PACKET_PREVIEW_LEN: usize = 32;

pub struct ProtocolContext<'a, T: Transport + ?Sized, O: XcvrObserver + ?Sized> {
    pub transport: &'a T,
    pub builder: &'a dyn CommandBuilder,
    pub observer: &'a O,
    /// Bound on each receive.
    pub timeout: Duration,
    /// Rule page reads evaluate their checksum regions with.
    pub checksum_rule: ChecksumRule,
    entries: Vec<LogEntry>,
}

impl<'a, T: Transport + ?Sized, O: XcvrObserver + ?Sized> ProtocolContext<'a, T, O> {
    pub fn new(
        transport: &'a T,
        builder: &'a dyn CommandBuilder,
        observer: &'a O,
        timeout: Duration,
    ) -> Self {
        Self {
            transport,
            builder,
            observer,
            timeout,
            checksum_rule: ChecksumRule::default(),
            entries: Vec::new(),
        }
    }

    pub fn with_checksum_rule(mut self, rule: ChecksumRule) -> Self {
        self.checksum_rule = rule;
        self
    }

    pub(crate) fn emit(&mut self, event: XcvrEvent) {
        self.observer.on_event(&event);
        self.entries.push(LogEntry::from_event(&event));
    }

    pub(crate) fn log(&mut self, level: LogLevel, message: impl Into<String>) {
        self.emit(XcvrEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn build(
        &self,
        module: Option<ModuleType>,
        command: &Command,
    ) -> Result<CommandFrame, ProtocolError> {
        self.builder.build(module, command)
    }

    /// Send one frame.
    pub fn send(&mut self, frame: &CommandFrame) -> Result<(), ProtocolError> {
        if !self.transport.is_connected() {
            return Err(ProtocolError::NotConnected);
        }
        self.transport
            .send(frame.as_bytes())
            .map_err(|e| ProtocolError::from_transport(e, frame.kind))?;
        self.emit(XcvrEvent::Packet {
            direction: PacketDirection::Tx,
            kind: frame.kind,
            length: frame.len(),
            data: Some(frame.bytes.iter().take(PACKET_PREVIEW_LEN).cloned().collect()),
        });
        Ok(())
    }

    /// Receive one response frame for a command of `kind`.
    pub fn receive(
        &mut self,
        module: Option<ModuleType>,
        kind: CommandKind,
    ) -> Result<ResponseFrame, ProtocolError> {
        let bytes = self
            .transport
            .receive(self.timeout)
            .map_err(|e| ProtocolError::from_transport(e, kind))?;
        debug!(kind = %kind, len = bytes.len(), "Response received");
        if !bytes.is_empty() {
            self.emit(XcvrEvent::Packet {
                direction: PacketDirection::Rx,
                kind,
                length: bytes.len(),
                data: Some(bytes.iter().take(PACKET_PREVIEW_LEN).cloned().collect()),
            });
        }
        let header_len = self.builder.response_header_len(module);
        Ok(ResponseFrame::new(kind, bytes, header_len))
    }

    /// Build, send, and wait for the first response frame.
    pub fn transact(
        &mut self,
        module: Option<ModuleType>,
        command: &Command,
    ) -> Result<ResponseFrame, ProtocolError> {
        let frame = self.build(module, command)?;
        self.send(&frame)?;
        self.receive(module, frame.kind)
    }

    /// Log entries produced so far, handed to the controller.
    pub fn into_entries(self) -> Vec<LogEntry> {
        self.entries
    }
}
