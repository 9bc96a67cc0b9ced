use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError};

/// Exception codes a responder can report back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExceptionCode {
    /// Function code unsupported or its table has zero capacity.
    IllegalFunction,
    /// Start address at or beyond table capacity.
    IllegalDataAddress,
    /// Quantity, byte count or value the table cannot satisfy.
    IllegalDataValue,
    /// Sent only when a CRC mismatch is configured to be answered.
    ServerDeviceFailure,
    /// Anything else received from a remote responder.
    Unknown(u8),
}

impl ExceptionCode {
    pub const fn from_u8(value: u8) -> Self {
        match value {
            0x01 => Self::IllegalFunction,
            0x02 => Self::IllegalDataAddress,
            0x03 => Self::IllegalDataValue,
            0x04 => Self::ServerDeviceFailure,
            other => Self::Unknown(other),
        }
    }

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::IllegalFunction => 0x01,
            Self::IllegalDataAddress => 0x02,
            Self::IllegalDataValue => 0x03,
            Self::ServerDeviceFailure => 0x04,
            Self::Unknown(raw) => raw,
        }
    }
}

impl core::fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::IllegalFunction => f.write_str("illegal function"),
            Self::IllegalDataAddress => f.write_str("illegal data address"),
            Self::IllegalDataValue => f.write_str("illegal data value"),
            Self::ServerDeviceFailure => f.write_str("server device failure"),
            Self::Unknown(raw) => write!(f, "exception code {raw:#04x}"),
        }
    }
}

/// Two-byte exception PDU: the echoed function with bit 7 set, then the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExceptionResponse {
    /// Function byte as it appeared in the request, without the error bit.
    pub function: u8,
    pub code: ExceptionCode,
}

impl ExceptionResponse {
    pub const fn new(function: u8, code: ExceptionCode) -> Self {
        Self {
            function: function & 0x7F,
            code,
        }
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(self.function | 0x80)?;
        w.write_u8(self.code.as_u8())
    }

    pub fn decode(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let function = r.read_u8()?;
        if (function & 0x80) == 0 {
            return Err(DecodeError::InvalidFunctionCode);
        }
        Ok(Self::new(function, ExceptionCode::from_u8(r.read_u8()?)))
    }
}

#[cfg(test)]
mod tests {
    use super::{ExceptionCode, ExceptionResponse};
    use crate::encoding::{Reader, Writer};
    use crate::DecodeError;

    #[test]
    fn encodes_error_bit_on_function() {
        let mut buf = [0u8; 2];
        let mut w = Writer::new(&mut buf);
        ExceptionResponse::new(0x0F, ExceptionCode::IllegalDataValue)
            .encode(&mut w)
            .unwrap();
        assert_eq!(w.as_written(), &[0x8F, 0x03]);
    }

    #[test]
    fn decodes_exception_pdu() {
        let mut r = Reader::new(&[0x83, 0x02]);
        let decoded = ExceptionResponse::decode(&mut r).unwrap();
        assert_eq!(decoded.function, 0x03);
        assert_eq!(decoded.code, ExceptionCode::IllegalDataAddress);
    }

    #[test]
    fn keeps_codes_outside_the_known_set() {
        let mut r = Reader::new(&[0x81, 0x0B]);
        let decoded = ExceptionResponse::decode(&mut r).unwrap();
        assert_eq!(decoded.code, ExceptionCode::Unknown(0x0B));
        assert_eq!(decoded.code.as_u8(), 0x0B);
    }

    #[test]
    fn rejects_normal_function_byte() {
        let mut r = Reader::new(&[0x03, 0x02]);
        assert_eq!(
            ExceptionResponse::decode(&mut r).unwrap_err(),
            DecodeError::InvalidFunctionCode
        );
    }
}
