//! Page reads.

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use super::page::{ChecksumResult, MemoryPage, PageId};
use crate::events::{LogLevel, XcvrEvent, XcvrObserver};
use crate::module_type::ModuleType;
use crate::protocol::constants::MIN_PAGE_BUFFER_LEN;
use crate::protocol::{Command, CommandKind, ProtocolContext, ProtocolError};
use crate::transport::Transport;

/// A page read that could not produce a buffer.
#[derive(Error, Debug)]
#[error("Reading {module}-{page} failed: {source}")]
pub struct ReadError {
    pub module: ModuleType,
    pub page: PageId,
    #[source]
    pub source: ProtocolError,
}

impl ReadError {
    fn new(module: ModuleType, page: PageId, source: ProtocolError) -> Self {
        Self {
            module,
            page,
            source,
        }
    }
}

/// Read one page with `module`'s addressing table.
///
/// Only a missing first response (or a transport failure) is an error.
/// A short response is kept; checksums it does not cover come back as
/// `Indeterminate`, and failing checksums never abort the read.
#[instrument(skip_all, fields(module = %module, page = %page))]
pub fn read_page<T: Transport + ?Sized, O: XcvrObserver + ?Sized>(
    ctx: &mut ProtocolContext<'_, T, O>,
    module: ModuleType,
    page: PageId,
) -> Result<MemoryPage, ReadError> {
    let fail = |source: ProtocolError| ReadError::new(module, page, source);

    let layout = module
        .descriptor()
        .page(page)
        .ok_or_else(|| fail(ProtocolError::PageUnavailable { module, page }))?;
    let expected = layout.length as usize;

    ctx.log(LogLevel::Info, format!("{module}-{page} Reading Code Start"));

    let command = Command::ReadPage {
        address: layout.address,
        offset: layout.offset,
        length: layout.length,
        page_select: layout.page_select,
    };
    let frame = ctx.build(Some(module), &command).map_err(fail)?;
    ctx.send(&frame).map_err(fail)?;

    let first = ctx
        .receive(Some(module), CommandKind::ReadPage)
        .map_err(fail)?;
    if first.is_empty() {
        return Err(fail(ProtocolError::NoResponse {
            kind: CommandKind::ReadPage,
        }));
    }

    // A page may span several reports; collect until the layout length.
    let mut data = first.into_payload();
    while data.len() < expected {
        match ctx.receive(Some(module), CommandKind::ReadPage) {
            Ok(frame) if !frame.is_empty() => data.extend_from_slice(frame.payload()),
            Ok(_) => break,
            Err(e) if e.is_timeout() => {
                debug!(received = data.len(), expected, "Page read ended early");
                break;
            }
            Err(e) => return Err(fail(e)),
        }
    }
    data.truncate(expected);
    let received = data.len();

    ctx.emit(XcvrEvent::PageRead {
        module,
        page,
        received,
        expected,
    });
    if received < expected {
        warn!(received, expected, "Short page read");
    }

    let rule = ctx.checksum_rule;
    let checksums: Vec<ChecksumResult> = layout
        .checksums
        .iter()
        .map(|region| ChecksumResult::evaluate(page, region, rule, &data))
        .collect();
    for result in &checksums {
        ctx.emit(XcvrEvent::Checksum {
            page,
            end_offset: result.end_offset,
            status: result.status,
        });
    }

    if checksums.iter().all(|c| c.status.is_pass()) {
        ctx.log(LogLevel::Info, "PASS");
    } else {
        ctx.log(LogLevel::Warn, "FAIL - checksums invalid, data kept");
    }
    ctx.log(LogLevel::Info, format!("{module}-{page} Reading Code End"));
    info!(received, "Page read complete");

    if data.len() < MIN_PAGE_BUFFER_LEN {
        data.resize(MIN_PAGE_BUFFER_LEN, 0);
    }

    Ok(MemoryPage {
        page,
        data,
        received,
        expected,
        checksums,
    })
}
