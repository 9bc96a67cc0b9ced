use crate::encoding::{Reader, Writer};
use crate::pdu::{FunctionCode, FunctionKind};
use crate::{DecodeError, EncodeError};

/// Coil values packed LSB-first, as carried by read responses and
/// multiple-coil writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitView<'a> {
    packed: &'a [u8],
    quantity: u16,
}

impl<'a> BitView<'a> {
    /// Fails if `packed` does not hold exactly `quantity` bits.
    pub fn new(packed: &'a [u8], quantity: u16) -> Result<Self, DecodeError> {
        if packed.len() != usize::from(quantity).div_ceil(8) {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { packed, quantity })
    }

    pub fn len(&self) -> usize {
        usize::from(self.quantity)
    }

    pub fn is_empty(&self) -> bool {
        self.quantity == 0
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.packed
    }

    pub fn coil(&self, index: usize) -> Option<bool> {
        if index >= self.len() {
            return None;
        }
        let byte = self.packed.get(index / 8)?;
        Some((byte & (1u8 << (index % 8))) != 0)
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + 'a {
        let view = *self;
        (0..view.len()).filter_map(move |i| view.coil(i))
    }

    #[cfg(feature = "alloc")]
    pub fn to_vec(&self) -> alloc::vec::Vec<bool> {
        self.iter().collect()
    }
}

/// Big-endian 16-bit values, as carried by register reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterView<'a> {
    data: &'a [u8],
}

impl<'a> RegisterView<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() % 2 != 0 {
            return Err(DecodeError::InvalidLength);
        }
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        let offset = index.checked_mul(2)?;
        let hi = *self.data.get(offset)?;
        let lo = *self.data.get(offset + 1)?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + 'a {
        self.data
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
    }

    #[cfg(feature = "alloc")]
    pub fn to_vec(&self) -> alloc::vec::Vec<u16> {
        self.iter().collect()
    }
}

/// Writes a bit-read response: function, byte count, packed bits.
pub fn encode_read_bits<I>(
    w: &mut Writer<'_>,
    function: FunctionCode,
    quantity: u16,
    bits: I,
) -> Result<(), EncodeError>
where
    I: IntoIterator<Item = bool>,
{
    let byte_count: u8 = function
        .data_len(quantity)
        .try_into()
        .map_err(|_| EncodeError::ValueOutOfRange)?;
    w.write_u8(function.as_u8())?;
    w.write_u8(byte_count)?;
    let written = w.write_packed_bits(bits.into_iter().take(usize::from(quantity)))?;
    if written != usize::from(byte_count) {
        return Err(EncodeError::InvalidLength);
    }
    Ok(())
}

/// Writes a register-read response: function, byte count, big-endian words.
pub fn encode_read_registers<I>(
    w: &mut Writer<'_>,
    function: FunctionCode,
    quantity: u16,
    values: I,
) -> Result<(), EncodeError>
where
    I: IntoIterator<Item = u16>,
{
    let byte_count: u8 = function
        .data_len(quantity)
        .try_into()
        .map_err(|_| EncodeError::ValueOutOfRange)?;
    w.write_u8(function.as_u8())?;
    w.write_u8(byte_count)?;
    let mut written = 0u16;
    for value in values.into_iter().take(usize::from(quantity)) {
        w.write_be_u16(value)?;
        written += 1;
    }
    if written != quantity {
        return Err(EncodeError::InvalidLength);
    }
    Ok(())
}

/// Writes a write acknowledgement: function, address, then either the stored
/// value (single writes) or the quantity (multiple writes).
pub fn encode_write_echo(
    w: &mut Writer<'_>,
    function: FunctionCode,
    address: u16,
    value: u16,
) -> Result<(), EncodeError> {
    w.write_u8(function.as_u8())?;
    w.write_be_u16(address)?;
    w.write_be_u16(value)
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResponseData<'a> {
    /// No usable body: exceptions and rejected frames.
    None,
    Bits(BitView<'a>),
    Registers(RegisterView<'a>),
    /// Address and value (or quantity) echoed by a write.
    Echo { address: u16, value: u16 },
}

impl<'a> ResponseData<'a> {
    /// Decodes the data that follows the function byte.
    ///
    /// `quantity` is the count the request asked for; read responses whose
    /// byte count disagrees with it are rejected.
    pub fn decode(
        function: FunctionCode,
        quantity: u16,
        r: &mut Reader<'a>,
    ) -> Result<Self, DecodeError> {
        let data = match function.kind() {
            FunctionKind::Read => {
                let byte_count = usize::from(r.read_u8()?);
                if byte_count != function.data_len(quantity) {
                    return Err(DecodeError::InvalidLength);
                }
                let body = r.read_exact(byte_count)?;
                if function.register_type().is_bit() {
                    Self::Bits(BitView::new(body, quantity)?)
                } else {
                    Self::Registers(RegisterView::new(body)?)
                }
            }
            FunctionKind::WriteSingle | FunctionKind::WriteMultiple => Self::Echo {
                address: r.read_be_u16()?,
                value: r.read_be_u16()?,
            },
        };
        if !r.is_empty() {
            return Err(DecodeError::InvalidLength);
        }
        Ok(data)
    }

    pub fn bits(&self) -> Option<BitView<'a>> {
        match self {
            Self::Bits(view) => Some(*view),
            _ => None,
        }
    }

    pub fn registers(&self) -> Option<RegisterView<'a>> {
        match self {
            Self::Registers(view) => Some(*view),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        encode_read_bits, encode_read_registers, encode_write_echo, BitView, RegisterView,
        ResponseData,
    };
    use crate::encoding::{Reader, Writer};
    use crate::pdu::FunctionCode;
    use crate::{DecodeError, EncodeError};

    #[test]
    fn bit_view_stops_at_quantity() {
        let view = BitView::new(&[0b1111_0101], 4).unwrap();
        assert_eq!(view.coil(0), Some(true));
        assert_eq!(view.coil(1), Some(false));
        assert_eq!(view.coil(2), Some(true));
        assert_eq!(view.coil(4), None);
        assert_eq!(view.iter().filter(|bit| *bit).count(), 2);
    }

    #[test]
    fn bit_view_rejects_wrong_byte_count() {
        assert_eq!(BitView::new(&[0, 0], 8).unwrap_err(), DecodeError::InvalidLength);
    }

    #[test]
    fn register_view_reads_big_endian() {
        let view = RegisterView::new(&[0x00, 0x06, 0x12, 0x34]).unwrap();
        assert_eq!(view.len(), 2);
        assert_eq!(view.register(1), Some(0x1234));
        assert_eq!(view.register(2), None);
        assert!(RegisterView::new(&[0x00]).is_err());
    }

    #[test]
    fn encodes_read_coils_payload() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        encode_read_bits(&mut w, FunctionCode::ReadCoils, 4, [false, true, false, true]).unwrap();
        assert_eq!(w.as_written(), &[0x01, 0x01, 0x0A]);
    }

    #[test]
    fn encodes_read_registers_payload() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        encode_read_registers(&mut w, FunctionCode::ReadHoldingRegisters, 3, [6, 0, 7]).unwrap();
        assert_eq!(
            w.as_written(),
            &[0x03, 0x06, 0x00, 0x06, 0x00, 0x00, 0x00, 0x07]
        );
    }

    #[test]
    fn short_register_source_is_an_error() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        assert_eq!(
            encode_read_registers(&mut w, FunctionCode::ReadInputRegisters, 2, [1]).unwrap_err(),
            EncodeError::InvalidLength
        );
    }

    #[test]
    fn encodes_write_echo() {
        let mut buf = [0u8; 5];
        let mut w = Writer::new(&mut buf);
        encode_write_echo(&mut w, FunctionCode::ForceSingleCoil, 0x00AC, 0xFF00).unwrap();
        assert_eq!(w.as_written(), &[0x05, 0x00, 0xAC, 0xFF, 0x00]);
    }

    #[test]
    fn decodes_read_registers_response() {
        let mut r = Reader::new(&[0x04, 0x00, 0x06, 0x00, 0x07]);
        let data = ResponseData::decode(FunctionCode::ReadHoldingRegisters, 2, &mut r).unwrap();
        let regs = data.registers().unwrap();
        assert_eq!(regs.register(0), Some(6));
        assert_eq!(regs.register(1), Some(7));
    }

    #[test]
    fn rejects_byte_count_mismatch() {
        let mut r = Reader::new(&[0x02, 0x00, 0x06]);
        assert_eq!(
            ResponseData::decode(FunctionCode::ReadHoldingRegisters, 2, &mut r).unwrap_err(),
            DecodeError::InvalidLength
        );
    }

    #[test]
    fn decodes_write_echo() {
        let mut r = Reader::new(&[0x00, 0x01, 0x00, 0x0A]);
        let data = ResponseData::decode(FunctionCode::PresetMultipleRegisters, 10, &mut r).unwrap();
        assert_eq!(
            data,
            ResponseData::Echo {
                address: 1,
                value: 10
            }
        );
    }
}
