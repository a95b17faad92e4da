//! Response frames received from the coding box.

use super::command::CommandKind;

/// Bytes received for one command, with any framing header marked off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    kind: CommandKind,
    bytes: Vec<u8>,
    header_len: usize,
}

impl ResponseFrame {
    pub fn new(kind: CommandKind, bytes: Vec<u8>, header_len: usize) -> Self {
        Self {
            kind,
            bytes,
            header_len,
        }
    }

    /// Command kind this frame answers.
    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Raw bytes as received, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Data after the framing header. Empty when the frame is shorter than the header.
    pub fn payload(&self) -> &[u8] {
        self.bytes.get(self.header_len..).unwrap_or(&[])
    }

    pub fn into_payload(mut self) -> Vec<u8> {
        if self.header_len >= self.bytes.len() {
            return Vec::new();
        }
        self.bytes.drain(..self.header_len);
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.payload().is_empty()
    }
}
