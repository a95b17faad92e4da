//! Protocol module - coding box command/response definitions.

pub mod command;
pub mod constants;
pub mod context;
pub mod error;
pub mod response;

pub use command::{Command, CommandBuilder, CommandFrame, CommandKind, CommandSet, CommandTable};
pub use constants::*;
pub use context::ProtocolContext;
pub use error::ProtocolError;
pub use response::ResponseFrame;
