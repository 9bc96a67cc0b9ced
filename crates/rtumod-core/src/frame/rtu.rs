//! RTU framing: `address + PDU + CRC16` with the CRC sent low byte first.

use crate::encoding::{Reader, Writer};
use crate::{DecodeError, EncodeError, MAX_PDU_LEN};

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Modbus CRC16: reflected polynomial 0xA001, initial value 0xFFFF.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let index = usize::from((crc as u8) ^ byte);
        crc = (crc >> 8) ^ CRC16_TABLE[index];
    }
    crc
}

pub fn verify_crc(data: &[u8], crc: u16) -> bool {
    crc16(data) == crc
}

/// Writes `address`, `pdu` and the CRC over both.
pub fn encode_frame(w: &mut Writer<'_>, address: u8, pdu: &[u8]) -> Result<(), EncodeError> {
    if pdu.is_empty() {
        return Err(EncodeError::InvalidLength);
    }
    if pdu.len() > MAX_PDU_LEN {
        return Err(EncodeError::ValueOutOfRange);
    }

    let start = w.position();
    w.write_u8(address)?;
    w.write_all(pdu)?;
    let crc = crc16(&w.as_written()[start..]);
    w.write_le_u16(crc)
}

/// Splits a complete frame into `(address, pdu)` after checking its CRC.
pub fn decode_frame(data: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
    if data.len() < 4 {
        return Err(DecodeError::InvalidLength);
    }

    let (body, trailer) = data.split_at(data.len() - 2);
    let received = Reader::new(trailer).read_le_u16()?;
    if !verify_crc(body, received) {
        return Err(DecodeError::InvalidCrc);
    }
    Ok((body[0], &body[1..]))
}
