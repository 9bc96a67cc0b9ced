//! Modbus RTU protocol engines in pure Rust.
//!
//! `rtumod-core` is a `no_std`-compatible implementation of both Modbus RTU
//! roles. Bytes are fed in one at a time; complete frames are validated,
//! applied to a register store and answered synchronously through an
//! injected [`transport::Transport`].
//!
//! - [`slave::Slave`] decodes requests and builds responses.
//! - [`master::Master`] encodes requests and decodes the matching response.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "alloc")]
extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

#[macro_use]
mod fmt;

pub mod config;
pub mod encoding;
pub mod error;
pub mod frame;
pub mod master;
pub mod pdu;
pub mod registers;
pub mod slave;
pub mod transport;

pub use config::{CrcFailurePolicy, FunctionSet, MasterConfig, SlaveConfig};
pub use error::{DecodeError, EncodeError, InternalError};
pub use master::{
    Master, MasterEvents, PendingRequest, ResponseData, ResponsePacket, ResponseStatus,
};
pub use registers::{RegisterStore, RegisterType};
pub use slave::{Slave, SlaveEvents};
pub use transport::{Transport, TransportError};

/// Largest RTU frame on the wire: address, PDU and CRC.
pub const MAX_FRAME_LEN: usize = 256;
/// Largest PDU (function code plus data) that fits in one frame.
pub const MAX_PDU_LEN: usize = 253;
