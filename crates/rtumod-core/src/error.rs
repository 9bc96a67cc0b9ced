use core::fmt;

use crate::transport::TransportError;

/// Errors that can occur while encoding Modbus data into an output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum EncodeError {
    BufferTooSmall,
    ValueOutOfRange,
    InvalidLength,
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BufferTooSmall => f.write_str("buffer too small"),
            Self::ValueOutOfRange => f.write_str("value out of range"),
            Self::InvalidLength => f.write_str("invalid length"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for EncodeError {}

/// Errors that can occur while decoding Modbus data from an input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DecodeError {
    UnexpectedEof,
    InvalidFunctionCode,
    InvalidLength,
    InvalidValue,
    InvalidCrc,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => f.write_str("unexpected end of input"),
            Self::InvalidFunctionCode => f.write_str("invalid function code"),
            Self::InvalidLength => f.write_str("invalid length"),
            Self::InvalidValue => f.write_str("invalid value"),
            Self::InvalidCrc => f.write_str("invalid crc"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DecodeError {}

/// Failures that cannot be expressed on the wire.
///
/// Delivered to the role's internal-error handler; initiator request calls
/// also return them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InternalError {
    /// An inbound frame outgrew the scratch buffer.
    FrameOverflow,
    /// The transport refused an outbound frame.
    Transport(TransportError),
    /// An outbound frame could not be encoded (bad quantity, no values).
    Encode(EncodeError),
    /// The initiator was asked to send a function code it has disabled.
    FunctionDisabled(u8),
}

impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameOverflow => f.write_str("frame overflows scratch buffer"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Encode(err) => write!(f, "encode error: {err}"),
            Self::FunctionDisabled(code) => write!(f, "function code {code:#04x} is disabled"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for InternalError {}

impl From<EncodeError> for InternalError {
    fn from(err: EncodeError) -> Self {
        Self::Encode(err)
    }
}

impl From<TransportError> for InternalError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}
