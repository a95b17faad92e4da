//! Transport layer abstraction.
//!
//! Defines the `Transport` trait for the coding-box link,
//! allowing different implementations (nusb, mock, etc.).
//!
//! A transport moves opaque frames. It knows nothing about module
//! types or memory pages, and it never retries on its own.

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Device not connected")]
    NotConnected,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract half-duplex command/response link to the coding box.
///
/// This trait enables:
/// - Production implementation using nusb (HID interrupt endpoints)
/// - Mock implementation with deterministic fixtures for unit testing
///
/// Callers must not interleave commands: one `send` is followed by the
/// `receive` calls belonging to it before the next `send`.
pub trait Transport: Send + Sync {
    /// Send one command frame.
    ///
    /// Fails with `TransportError::NotConnected` when no device is present.
    fn send(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Wait up to `timeout` for one response frame.
    ///
    /// Expiry is reported as `TransportError::Timeout`, never as an empty frame.
    fn receive(&self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Check if the device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).receive(timeout)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn vendor_id(&self) -> u16 {
        (**self).vendor_id()
    }

    fn product_id(&self) -> u16 {
        (**self).product_id()
    }
}
