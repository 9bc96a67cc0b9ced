use crate::registers::RegisterType;
use crate::DecodeError;

/// The eight function codes both engines speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum FunctionCode {
    ReadCoils,
    ReadInputStatus,
    ReadHoldingRegisters,
    ReadInputRegisters,
    ForceSingleCoil,
    PresetSingleRegister,
    ForceMultipleCoils,
    PresetMultipleRegisters,
}

/// Payload shape of a function code, shared by requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FunctionKind {
    /// Request: address + count. Response: byte count + data.
    Read,
    /// Request and response: address + value.
    WriteSingle,
    /// Request: address + count + byte count + data. Response: address + count.
    WriteMultiple,
}

impl FunctionCode {
    pub const ALL: [FunctionCode; 8] = [
        Self::ReadCoils,
        Self::ReadInputStatus,
        Self::ReadHoldingRegisters,
        Self::ReadInputRegisters,
        Self::ForceSingleCoil,
        Self::PresetSingleRegister,
        Self::ForceMultipleCoils,
        Self::PresetMultipleRegisters,
    ];

    pub const fn as_u8(self) -> u8 {
        match self {
            Self::ReadCoils => 0x01,
            Self::ReadInputStatus => 0x02,
            Self::ReadHoldingRegisters => 0x03,
            Self::ReadInputRegisters => 0x04,
            Self::ForceSingleCoil => 0x05,
            Self::PresetSingleRegister => 0x06,
            Self::ForceMultipleCoils => 0x0F,
            Self::PresetMultipleRegisters => 0x10,
        }
    }

    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        match value {
            0x01 => Ok(Self::ReadCoils),
            0x02 => Ok(Self::ReadInputStatus),
            0x03 => Ok(Self::ReadHoldingRegisters),
            0x04 => Ok(Self::ReadInputRegisters),
            0x05 => Ok(Self::ForceSingleCoil),
            0x06 => Ok(Self::PresetSingleRegister),
            0x0F => Ok(Self::ForceMultipleCoils),
            0x10 => Ok(Self::PresetMultipleRegisters),
            _ => Err(DecodeError::InvalidFunctionCode),
        }
    }

    pub const fn is_exception(value: u8) -> bool {
        (value & 0x80) != 0
    }

    pub const fn kind(self) -> FunctionKind {
        match self {
            Self::ReadCoils
            | Self::ReadInputStatus
            | Self::ReadHoldingRegisters
            | Self::ReadInputRegisters => FunctionKind::Read,
            Self::ForceSingleCoil | Self::PresetSingleRegister => FunctionKind::WriteSingle,
            Self::ForceMultipleCoils | Self::PresetMultipleRegisters => FunctionKind::WriteMultiple,
        }
    }

    /// The register table this function reads or writes.
    pub const fn register_type(self) -> RegisterType {
        match self {
            Self::ReadCoils | Self::ForceSingleCoil | Self::ForceMultipleCoils => {
                RegisterType::DiscreteOutputCoils
            }
            Self::ReadInputStatus => RegisterType::DiscreteInputCoils,
            Self::ReadHoldingRegisters
            | Self::PresetSingleRegister
            | Self::PresetMultipleRegisters => RegisterType::HoldingRegisters,
            Self::ReadInputRegisters => RegisterType::InputRegisters,
        }
    }

    /// Upper bound on the quantity field, sized so every response fits one frame.
    pub const fn max_quantity(self) -> u16 {
        match self {
            Self::ReadCoils | Self::ReadInputStatus => 2000,
            Self::ReadHoldingRegisters | Self::ReadInputRegisters => 125,
            Self::ForceSingleCoil | Self::PresetSingleRegister => 1,
            Self::ForceMultipleCoils => 1968,
            Self::PresetMultipleRegisters => 123,
        }
    }

    /// Byte count carried by a read response or a multiple-write request.
    pub const fn data_len(self, quantity: u16) -> usize {
        let quantity = quantity as usize;
        if self.register_type().is_bit() {
            quantity.div_ceil(8)
        } else {
            quantity * 2
        }
    }
}
