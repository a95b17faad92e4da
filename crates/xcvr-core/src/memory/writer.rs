//! Byte writes: write, reboot, settle, read back.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::page::PageId;
use crate::events::{LogLevel, XcvrEvent, XcvrObserver};
use crate::module_type::ModuleType;
use crate::protocol::{Command, ProtocolContext, ProtocolError};
use crate::transport::Transport;

/// Step of the write sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    Write,
    Reboot,
    Verify,
}

impl fmt::Display for WriteStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteStep::Write => write!(f, "write"),
            WriteStep::Reboot => write!(f, "reboot"),
            WriteStep::Verify => write!(f, "verify"),
        }
    }
}

/// Outcome of a write sequence.
#[derive(Debug)]
pub enum WriteResult {
    /// Read-back matched the intended value.
    Verified { address: u8, offset: u8, value: u8 },
    /// Read-back returned nothing or a different value.
    VerificationFailed {
        address: u8,
        offset: u8,
        expected: u8,
        observed: Option<u8>,
    },
    /// A step could not be carried out.
    WriteError { step: WriteStep, error: ProtocolError },
}

impl WriteResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, WriteResult::Verified { .. })
    }
}

impl fmt::Display for WriteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WriteResult::Verified {
                address,
                offset,
                value,
            } => write!(
                f,
                "Verify Code Successfully ({address:02X}h 0x{offset:02X} = 0x{value:02X})"
            ),
            WriteResult::VerificationFailed {
                expected, observed, ..
            } => match observed {
                Some(obs) => write!(
                    f,
                    "Verification Failed: intended 0x{expected:02X}, observed 0x{obs:02X}"
                ),
                None => write!(
                    f,
                    "Verification Failed: intended 0x{expected:02X}, no data read back"
                ),
            },
            WriteResult::WriteError { step, error } => write!(f, "{step} step failed: {error}"),
        }
    }
}

/// Write one byte, reboot the module, wait `settle`, and read the byte back.
///
/// Never retries. The settle wait blocks the calling thread.
#[instrument(skip_all, fields(module = %module, offset = offset, value = value))]
pub fn write_byte<T: Transport + ?Sized, O: XcvrObserver + ?Sized>(
    ctx: &mut ProtocolContext<'_, T, O>,
    module: ModuleType,
    address: u8,
    offset: u8,
    value: u8,
    settle: Duration,
) -> WriteResult {
    let page = PageId::from_address(address)
        .map(|p| p.to_string())
        .unwrap_or_else(|| format!("{address:02X}h"));
    let fail = |step: WriteStep, error: ProtocolError| {
        warn!(step = %step, "Write sequence aborted: {}", error);
        WriteResult::WriteError { step, error }
    };

    ctx.log(LogLevel::Info, format!("{module}-{page} Writing Code Start"));
    ctx.log(
        LogLevel::Info,
        format!("Writing 0x{value:02X} to {page} offset 0x{offset:02X}"),
    );
    // Write and read-back address the same upper page.
    let page_select = module
        .descriptor()
        .pages
        .iter()
        .find(|p| p.address == address)
        .map_or(0, |p| p.page_select);
    let write = Command::WriteByte {
        address,
        offset,
        page_select,
        value,
    };
    if let Err(e) = ctx
        .build(Some(module), &write)
        .and_then(|frame| ctx.send(&frame))
    {
        return fail(WriteStep::Write, e);
    }
    ctx.log(LogLevel::Info, "I2C Write OK");

    ctx.log(LogLevel::Info, "Start Reboot Module.");
    if let Err(e) = ctx
        .build(Some(module), &Command::Reboot)
        .and_then(|frame| ctx.send(&frame))
    {
        return fail(WriteStep::Reboot, e);
    }
    thread::sleep(settle);
    ctx.log(LogLevel::Info, "Reboot Module End.");

    let verify = Command::ReadPage {
        address,
        offset,
        length: 1,
        page_select,
    };
    let response = match ctx.transact(Some(module), &verify) {
        Ok(response) => response,
        Err(e) => return fail(WriteStep::Verify, e),
    };

    let observed = response.payload().first().copied();
    if observed == Some(value) {
        ctx.emit(XcvrEvent::WriteVerified {
            address,
            offset,
            value,
        });
        ctx.log(LogLevel::Info, "Verify Code Successfully");
        info!(offset, value, "Write verified");
        WriteResult::Verified {
            address,
            offset,
            value,
        }
    } else {
        ctx.emit(XcvrEvent::VerificationFailed {
            address,
            offset,
            expected: value,
            observed,
        });
        WriteResult::VerificationFailed {
            address,
            offset,
            expected: value,
            observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::CommandSet;
    use crate::transport::MockTransport;

    const WAIT: Duration = Duration::from_millis(10);

    fn writable() -> CommandSet {
        let mut set = CommandSet::default();
        set.generic.write = Some("23 00 02 %a %o %v".into());
        set.generic.reboot = Some("23 00 05".into());
        set
    }

    fn run(mock: &MockTransport, set: &CommandSet, value: u8) -> WriteResult {
        let mut ctx = ProtocolContext::new(mock, set, &NullObserver, WAIT);
        write_byte(&mut ctx, ModuleType::Sfp, 0xA0, 0x14, value, Duration::ZERO)
    }

    #[test]
    fn test_write_sequence_verified() {
        let mock = MockTransport::new();
        mock.queue_byte(0x4F);

        let result = run(&mock, &writable(), 0x4F);
        assert!(result.is_verified(), "{result}");

        let sends = mock.get_sends();
        assert_eq!(sends.len(), 3);
        assert_eq!(&sends[0][..6], &[0x23, 0x00, 0x02, 0xA0, 0x14, 0x4F]);
        assert_eq!(&sends[1][..3], &[0x23, 0x00, 0x05]);
        assert_eq!(&sends[2][..7], &[0x23, 0x00, 0x01, 0xA0, 0x14, 0x00, 0x01]);
    }

    #[test]
    fn test_read_back_mismatch() {
        let mock = MockTransport::new();
        mock.queue_byte(0x20);

        match run(&mock, &writable(), 0x4F) {
            WriteResult::VerificationFailed {
                expected, observed, ..
            } => {
                assert_eq!(expected, 0x4F);
                assert_eq!(observed, Some(0x20));
            }
            other => panic!("unexpected result: {other}"),
        }
        // No retry.
        assert_eq!(mock.get_sends().len(), 3);
    }

    #[test]
    fn test_empty_read_back_is_verification_failure() {
        let mock = MockTransport::new();
        mock.queue_response(&[]);

        let result = run(&mock, &writable(), 0x4F);
        assert!(matches!(
            result,
            WriteResult::VerificationFailed { observed: None, .. }
        ));
    }

    #[test]
    fn test_missing_read_back_is_verify_timeout() {
        let mock = MockTransport::new();
        match run(&mock, &writable(), 0x4F) {
            WriteResult::WriteError { step, error } => {
                assert_eq!(step, WriteStep::Verify);
                assert!(error.is_timeout());
            }
            other => panic!("unexpected result: {other}"),
        }
    }

    #[test]
    fn test_write_send_failure_stops_sequence() {
        let mock = MockTransport::new();
        mock.fail_send_at(0);

        let result = run(&mock, &writable(), 0x4F);
        assert!(matches!(
            result,
            WriteResult::WriteError {
                step: WriteStep::Write,
                ..
            }
        ));
        assert_eq!(mock.get_sends().len(), 1);
    }

    #[test]
    fn test_reboot_failure_reports_reboot_step() {
        let mock = MockTransport::new();
        mock.fail_send_at(1);

        let result = run(&mock, &writable(), 0x4F);
        assert!(matches!(
            result,
            WriteResult::WriteError {
                step: WriteStep::Reboot,
                ..
            }
        ));
    }

    #[test]
    fn test_xfp_write_and_read_back_share_page_select() {
        let mock = MockTransport::new();
        mock.queue_byte(0x41);
        let mut set = CommandSet::default();
        set.generic.read = Some("23 00 01 %a %p %o %2c".into());
        set.generic.write = Some("23 00 02 %a %p %o %v".into());
        set.generic.reboot = Some("23 00 05".into());

        let mut ctx = ProtocolContext::new(&mock, &set, &NullObserver, WAIT);
        let result = write_byte(&mut ctx, ModuleType::Xfp, 0xA0, 0x94, 0x41, Duration::ZERO);
        assert!(result.is_verified(), "{result}");

        let sends = mock.get_sends();
        assert_eq!(&sends[0][..6], &[0x23, 0x00, 0x02, 0xA0, 0x01, 0x94]);
        assert_eq!(&sends[2][..6], &[0x23, 0x00, 0x01, 0xA0, 0x01, 0x94]);
        assert_eq!(sends[0][4], sends[2][4]);
    }

    #[test]
    fn test_unconfigured_write_is_unavailable() {
        let mock = MockTransport::new();
        match run(&mock, &CommandSet::default(), 0x4F) {
            WriteResult::WriteError { step, error } => {
                assert_eq!(step, WriteStep::Write);
                assert!(matches!(error, ProtocolError::CommandUnavailable { .. }));
            }
            other => panic!("unexpected result: {other}"),
        }
        assert!(mock.get_sends().is_empty());
    }
}
