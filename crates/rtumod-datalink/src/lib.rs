//! Async serial drivers for the `rtumod-core` engines.
//!
//! The core engines are byte driven and never block; this crate owns the
//! line. It pumps received bytes into a [`Slave`](rtumod_core::Slave) or
//! [`Master`](rtumod_core::Master), writes the frames they queue, and turns
//! inter-byte silence into `reset()` calls.

#![forbid(unsafe_code)]

use rtumod_core::pdu::ExceptionCode;
use rtumod_core::InternalError;
use thiserror::Error;

pub mod rtu;
pub mod rtu_server;
pub mod shared;

pub use rtu::{open_serial, LinkConfig, RtuMasterLink};
pub use rtu_server::{serve_rtu_io, RtuSlaveServer};
pub use shared::SharedRegisters;

#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("internal error: {0}")]
    Internal(#[from] InternalError),
    #[error("device returned exception: {0}")]
    Exception(ExceptionCode),
    #[error("response crc mismatch")]
    CrcMismatch,
    #[error("unexpected function code {0:#04x} in response")]
    UnexpectedFunction(u8),
    #[error("response length does not match the request")]
    InvalidLength,
    #[error("request timed out")]
    Timeout,
    #[error("connection closed")]
    ConnectionClosed,
}
