//! Client side of the MicroPython raw REPL.
//!
//! [`Channel`] speaks the wire protocol, [`Device`] builds filesystem and
//! runtime operations on top of it, and the [`Board`] traits are the seam the
//! shell is written against.

mod board;
mod channel;
pub mod codec;
mod device;
mod error;
mod types;

pub use board::{Board, Evaluator, RemoteFs};
pub use channel::{Channel, Transport};
pub use codec::{decode, encode, Value};
pub use device::{open_transport, Device};
pub use error::{ChannelError, DecodeError, DeviceError, FsErrorKind, RemoteFsError, Result};
pub use types::*;
