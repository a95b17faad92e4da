//! nusb-based HID transport for the coding box.
//!
//! The box enumerates as a HID device with one interrupt IN and one
//! interrupt OUT endpoint on interface 0. Frames are raw 64-byte reports.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use nusb::transfer::{In, Interrupt, Out};
use nusb::{Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{Transport, TransportError};
use crate::protocol::constants::{CODING_BOX_PRODUCT_ID, CODING_BOX_VENDOR_ID, REPORT_LEN};

/// nusb-based HID transport.
pub struct NusbTransport {
    interface: Interface,
    in_endpoint: u8,
    out_endpoint: u8,
    vid: u16,
    pid: u16,
    connected: AtomicBool,
}

impl NusbTransport {
    /// Open the coding box with its default VID/PID.
    pub fn open() -> Result<Self, TransportError> {
        Self::open_with_ids(CODING_BOX_VENDOR_ID, CODING_BOX_PRODUCT_ID)
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found coding box"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // The kernel HID driver owns the interface until we detach it.
        let interface = device.detach_and_claim_interface(0).wait().map_err(|e| {
            TransportError::ClaimInterfaceFailed {
                interface: 0,
                message: e.to_string(),
            }
        })?;

        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;

        for config in device.configurations() {
            for iface in config.interfaces() {
                if iface.interface_number() != 0 {
                    continue;
                }
                for alt in iface.alt_settings() {
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == nusb::descriptors::TransferType::Interrupt {
                            if ep.direction() == nusb::transfer::Direction::In {
                                in_endpoint = ep.address();
                            } else {
                                out_endpoint = ep.address();
                            }
                        }
                    }
                }
            }
        }

        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Interrupt".into(),
                direction: "Out".into(),
            });
        }

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Coding box opened"
        );

        Ok(Self {
            interface,
            in_endpoint,
            out_endpoint,
            vid,
            pid,
            connected: AtomicBool::new(true),
        })
    }

    fn mark_lost(&self, err: &std::io::Error) {
        if matches!(
            err.kind(),
            ErrorKind::NotConnected | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
        ) {
            warn!(error = %err, "Coding box went away");
            self.connected.store(false, Ordering::SeqCst);
        }
    }
}

impl Transport for NusbTransport {
    #[instrument(skip(self, frame), fields(len = frame.len()))]
    fn send(&self, frame: &[u8]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let ep = self
            .interface
            .endpoint::<Interrupt, Out>(self.out_endpoint)
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;

        let mut writer = ep.writer(REPORT_LEN);
        let written = writer.write_all(frame).and_then(|_| writer.flush());
        if let Err(e) = written {
            self.mark_lost(&e);
            return Err(TransportError::SendFailed(e.to_string()));
        }

        debug!(bytes_written = frame.len(), "Send complete");
        Ok(())
    }

    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    fn receive(&self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }

        let ep = self
            .interface
            .endpoint::<Interrupt, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReceiveFailed(e.to_string()))?;

        let mut reader = ep.reader(REPORT_LEN).with_read_timeout(timeout);
        let mut buf = vec![0u8; REPORT_LEN];

        let n = match reader.read(&mut buf) {
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => {
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            Err(e) => {
                self.mark_lost(&e);
                return Err(TransportError::ReceiveFailed(e.to_string()));
            }
        };

        buf.truncate(n);
        debug!(bytes_read = n, "Receive complete");
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
