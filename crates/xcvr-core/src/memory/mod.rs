//! Module memory pages: reading, writing and checksum bookkeeping.

pub mod page;
pub mod reader;
pub mod writer;

pub use page::{ChecksumResult, MemoryPage, PageId};
pub use reader::{ReadError, read_page};
pub use writer::{WriteResult, WriteStep, write_byte};
