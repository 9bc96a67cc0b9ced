use crate::encoding::{Reader, Writer};
use crate::pdu::{BitView, FunctionCode, FunctionKind, RegisterView};
use crate::{DecodeError, EncodeError};

/// Coil value on the wire for ON.
pub const COIL_ON: u16 = 0xFF00;
/// Coil value on the wire for OFF.
pub const COIL_OFF: u16 = 0x0000;

fn validate_quantity(function: FunctionCode, quantity: u16) -> Result<(), EncodeError> {
    if quantity == 0 || quantity > function.max_quantity() {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(())
}

fn quantity_of(function: FunctionCode, len: usize) -> Result<u16, EncodeError> {
    let quantity: u16 = len.try_into().map_err(|_| EncodeError::ValueOutOfRange)?;
    validate_quantity(function, quantity)?;
    Ok(quantity)
}

/// Any of the four read functions: start address and count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ReadRequest {
    pub function: FunctionCode,
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        if self.function.kind() != FunctionKind::Read {
            return Err(EncodeError::ValueOutOfRange);
        }
        validate_quantity(self.function, self.quantity)?;
        w.write_u8(self.function.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteSingleCoilRequest {
    pub address: u16,
    pub value: bool,
}

impl WriteSingleCoilRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::ForceSingleCoil.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(if self.value { COIL_ON } else { COIL_OFF })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct WriteSingleRegisterRequest {
    pub address: u16,
    pub value: u16,
}

impl WriteSingleRegisterRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::PresetSingleRegister.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest<'a> {
    pub start_address: u16,
    pub values: &'a [bool],
}

impl WriteMultipleCoilsRequest<'_> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        quantity_of(FunctionCode::ForceMultipleCoils, self.values.len())
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count = FunctionCode::ForceMultipleCoils.data_len(quantity) as u8;
        w.write_u8(FunctionCode::ForceMultipleCoils.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8(byte_count)?;
        w.write_packed_bits(self.values.iter().copied())?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest<'a> {
    pub start_address: u16,
    pub values: &'a [u16],
}

impl WriteMultipleRegistersRequest<'_> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        quantity_of(FunctionCode::PresetMultipleRegisters, self.values.len())
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count = FunctionCode::PresetMultipleRegisters.data_len(quantity) as u8;
        w.write_u8(FunctionCode::PresetMultipleRegisters.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8(byte_count)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

/// Outbound request of any supported function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Read(ReadRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequest<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequest<'a>),
}

impl Request<'_> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::Read(req) => req.encode(w),
            Self::WriteSingleCoil(req) => req.encode(w),
            Self::WriteSingleRegister(req) => req.encode(w),
            Self::WriteMultipleCoils(req) => req.encode(w),
            Self::WriteMultipleRegisters(req) => req.encode(w),
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::Read(req) => req.function,
            Self::WriteSingleCoil(_) => FunctionCode::ForceSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::PresetSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::ForceMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::PresetMultipleRegisters,
        }
    }

    pub fn start_address(&self) -> u16 {
        match self {
            Self::Read(req) => req.start_address,
            Self::WriteSingleCoil(req) => req.address,
            Self::WriteSingleRegister(req) => req.address,
            Self::WriteMultipleCoils(req) => req.start_address,
            Self::WriteMultipleRegisters(req) => req.start_address,
        }
    }

    /// Number of points the request touches; single writes count as one.
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        match self {
            Self::Read(req) => Ok(req.quantity),
            Self::WriteSingleCoil(_) | Self::WriteSingleRegister(_) => Ok(1),
            Self::WriteMultipleCoils(req) => req.quantity(),
            Self::WriteMultipleRegisters(req) => req.quantity(),
        }
    }
}

/// Inbound request as seen by a responder, borrowing the frame it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DecodedRequest<'a> {
    Read(ReadRequest),
    /// Any nonzero wire value means ON.
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils {
        start_address: u16,
        values: BitView<'a>,
    },
    WriteMultipleRegisters {
        start_address: u16,
        values: RegisterView<'a>,
    },
}

impl<'a> DecodedRequest<'a> {
    /// Decodes a PDU (function byte onwards, CRC excluded).
    pub fn decode(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let function = FunctionCode::from_u8(r.read_u8()?)?;
        let address = r.read_be_u16()?;
        let request = match function {
            FunctionCode::ForceSingleCoil => Self::WriteSingleCoil(WriteSingleCoilRequest {
                address,
                value: r.read_be_u16()? != COIL_OFF,
            }),
            FunctionCode::PresetSingleRegister => {
                Self::WriteSingleRegister(WriteSingleRegisterRequest {
                    address,
                    value: r.read_be_u16()?,
                })
            }
            FunctionCode::ForceMultipleCoils | FunctionCode::PresetMultipleRegisters => {
                let quantity = r.read_be_u16()?;
                if quantity == 0 || quantity > function.max_quantity() {
                    return Err(DecodeError::InvalidValue);
                }
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != function.data_len(quantity) {
                    return Err(DecodeError::InvalidLength);
                }
                let body = r.read_exact(byte_count)?;
                if function == FunctionCode::ForceMultipleCoils {
                    Self::WriteMultipleCoils {
                        start_address: address,
                        values: BitView::new(body, quantity)?,
                    }
                } else {
                    Self::WriteMultipleRegisters {
                        start_address: address,
                        values: RegisterView::new(body)?,
                    }
                }
            }
            _ => {
                let quantity = r.read_be_u16()?;
                if quantity == 0 || quantity > function.max_quantity() {
                    return Err(DecodeError::InvalidValue);
                }
                Self::Read(ReadRequest {
                    function,
                    start_address: address,
                    quantity,
                })
            }
        };
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(request)
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::Read(req) => req.function,
            Self::WriteSingleCoil(_) => FunctionCode::ForceSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::PresetSingleRegister,
            Self::WriteMultipleCoils { .. } => FunctionCode::ForceMultipleCoils,
            Self::WriteMultipleRegisters { .. } => FunctionCode::PresetMultipleRegisters,
        }
    }

    pub fn start_address(&self) -> u16 {
        match self {
            Self::Read(req) => req.start_address,
            Self::WriteSingleCoil(req) => req.address,
            Self::WriteSingleRegister(req) => req.address,
            Self::WriteMultipleCoils { start_address, .. }
            | Self::WriteMultipleRegisters { start_address, .. } => *start_address,
        }
    }

    pub fn quantity(&self) -> u16 {
        match self {
            Self::Read(req) => req.quantity,
            Self::WriteSingleCoil(_) | Self::WriteSingleRegister(_) => 1,
            Self::WriteMultipleCoils { values, .. } => values.len() as u16,
            Self::WriteMultipleRegisters { values, .. } => values.len() as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DecodedRequest, ReadRequest, Request, WriteMultipleCoilsRequest,
        WriteMultipleRegistersRequest, WriteSingleCoilRequest,
    };
    use crate::encoding::{Reader, Writer};
    use crate::pdu::FunctionCode;
    use crate::{DecodeError, EncodeError};

    #[test]
    fn read_request_validates_quantity() {
        let mut buf = [0u8; 5];
        let mut w = Writer::new(&mut buf);
        let req = ReadRequest {
            function: FunctionCode::ReadHoldingRegisters,
            start_address: 0,
            quantity: 126,
        };
        assert_eq!(req.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);
        let zero = ReadRequest { quantity: 0, ..req };
        assert_eq!(zero.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);
    }

    #[test]
    fn read_request_refuses_write_function() {
        let mut buf = [0u8; 5];
        let mut w = Writer::new(&mut buf);
        let req = ReadRequest {
            function: FunctionCode::PresetSingleRegister,
            start_address: 0,
            quantity: 1,
        };
        assert!(req.encode(&mut w).is_err());
    }

    #[test]
    fn encodes_read_holding_registers() {
        let mut buf = [0u8; 5];
        let mut w = Writer::new(&mut buf);
        Request::Read(ReadRequest {
            function: FunctionCode::ReadHoldingRegisters,
            start_address: 0x006B,
            quantity: 3,
        })
        .encode(&mut w)
        .unwrap();
        assert_eq!(w.as_written(), &[0x03, 0x00, 0x6B, 0x00, 0x03]);
    }

    #[test]
    fn single_coil_uses_canonical_values() {
        let mut buf = [0u8; 5];
        let mut w = Writer::new(&mut buf);
        WriteSingleCoilRequest {
            address: 2,
            value: true,
        }
        .encode(&mut w)
        .unwrap();
        assert_eq!(w.as_written(), &[0x05, 0x00, 0x02, 0xFF, 0x00]);
    }

    #[test]
    fn write_multiple_coils_packs_lsb_first() {
        let mut buf = [0u8; 16];
        let mut w = Writer::new(&mut buf);
        WriteMultipleCoilsRequest {
            start_address: 0,
            values: &[false, true, false, true],
        }
        .encode(&mut w)
        .unwrap();
        assert_eq!(w.as_written(), &[0x0F, 0x00, 0x00, 0x00, 0x04, 0x01, 0x0A]);
    }

    #[test]
    fn write_multiple_registers_rejects_empty_and_oversized() {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        let empty = WriteMultipleRegistersRequest {
            start_address: 0,
            values: &[],
        };
        assert_eq!(empty.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);
        let values = [0u16; 124];
        let big = WriteMultipleRegistersRequest {
            start_address: 0,
            values: &values,
        };
        assert_eq!(big.encode(&mut w).unwrap_err(), EncodeError::ValueOutOfRange);
    }

    #[test]
    fn decodes_read_request() {
        let mut r = Reader::new(&[0x04, 0x00, 0x08, 0x00, 0x01]);
        let req = DecodedRequest::decode(&mut r).unwrap();
        assert_eq!(req.function_code(), FunctionCode::ReadInputRegisters);
        assert_eq!(req.start_address(), 8);
        assert_eq!(req.quantity(), 1);
    }

    #[test]
    fn decodes_single_coil_with_nonzero_value_as_on() {
        let mut r = Reader::new(&[0x05, 0x00, 0x01, 0x12, 0x34]);
        match DecodedRequest::decode(&mut r).unwrap() {
            DecodedRequest::WriteSingleCoil(req) => assert!(req.value),
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn decodes_multiple_registers() {
        let mut r = Reader::new(&[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]);
        match DecodedRequest::decode(&mut r).unwrap() {
            DecodedRequest::WriteMultipleRegisters {
                start_address,
                values,
            } => {
                assert_eq!(start_address, 1);
                assert_eq!(values.register(0), Some(0x000A));
                assert_eq!(values.register(1), Some(0x0102));
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let mut r = Reader::new(&[0x0F, 0x00, 0x00, 0x00, 0x09, 0x01, 0xFF]);
        assert_eq!(
            DecodedRequest::decode(&mut r).unwrap_err(),
            DecodeError::InvalidLength
        );
    }

    #[test]
    fn rejects_unsupported_function() {
        let mut r = Reader::new(&[0x17, 0x00, 0x00, 0x00, 0x01]);
        assert_eq!(
            DecodedRequest::decode(&mut r).unwrap_err(),
            DecodeError::InvalidFunctionCode
        );
    }
}
