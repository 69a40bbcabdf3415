//! Endpoint-naming grammar, wire frame codec and shared error type for
//! `drvshelld` and the drivers it talks to.

pub mod endpoint;
pub mod error;
pub mod hash;
pub mod wire;

pub use error::{Error, Result};
pub use wire::{CommandArg, CommandFrame, CommandInfo, InfoFrame, ResponseFrame, Signature};
