//! xcvr-core: protocol engine for optical transceiver coding boxes.
//!
//! Talks to SFP, SFP+, XFP, QSFP and QSFP-DD modules through a USB HID
//! coding box: detects the module type, reads and writes its memory
//! pages, validates checksums and decodes the serial ID fields.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: HID report I/O abstraction (nusb, mock)
//! - **Protocol**: Constants, command tables, response frames, errors
//! - **Module Type**: Descriptor registry (addressing, checksums, field layouts)
//! - **Detector / Memory**: Identify, page read, write-reboot-verify
//! - **Decoder / Diagnostics**: A0 serial ID and A2 monitoring values
//! - **Events**: Observer pattern and the session event log
//! - **Session**: Controller owning the type selection
//!
//! # Example
//!
//! ```no_run
//! use xcvr_core::session::{ModuleSession, SessionConfig};
//! use xcvr_core::transport::NusbTransport;
//!
//! let transport = NusbTransport::open().expect("coding box not found");
//! let mut session = ModuleSession::new(transport, SessionConfig::default());
//!
//! let report = session.read_module().expect("read failed");
//! println!("{}", report.info);
//! for line in session.event_log().lines() {
//!     println!("{line}");
//! }
//! ```

pub mod checksum;
pub mod decoder;
pub mod detector;
pub mod diagnostics;
pub mod dump;
pub mod events;
pub mod memory;
pub mod module_type;
pub mod protocol;
pub mod session;
pub mod transport;

#[cfg(test)]
mod fixtures;

// Re-exports for convenience
pub use checksum::{ChecksumRule, ChecksumStatus};
pub use decoder::{LinkLength, ModuleInfo, decode};
pub use detector::{Detection, Detector, DetectorState, UnidentifiedReason};
pub use diagnostics::Diagnostics;
pub use events::{EventLog, LogLevel, NullObserver, TracingObserver, XcvrEvent, XcvrObserver};
pub use memory::{ChecksumResult, MemoryPage, PageId, ReadError, WriteResult, WriteStep};
pub use module_type::{ModuleDescriptor, ModuleType, classify};
pub use protocol::{Command, CommandBuilder, CommandKind, CommandSet, CommandTable, ProtocolError};
pub use session::{ModuleReport, ModuleSession, SessionConfig, SessionState};
pub use transport::{MockTransport, NusbTransport, Transport, TransportError};
