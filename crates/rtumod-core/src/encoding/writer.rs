use crate::EncodeError;

/// A byte writer that encodes into a caller-owned buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub const fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    pub fn as_written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), EncodeError> {
        self.write_all(&[value])
    }

    pub fn write_all(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        if self.remaining() < data.len() {
            return Err(EncodeError::BufferTooSmall);
        }
        let end = self.pos + data.len();
        self.buf[self.pos..end].copy_from_slice(data);
        self.pos = end;
        Ok(())
    }

    pub fn write_be_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_be_bytes())
    }

    pub fn write_le_u16(&mut self, value: u16) -> Result<(), EncodeError> {
        self.write_all(&value.to_le_bytes())
    }

    /// Packs `bits` LSB-first: the first bit lands in bit 0 of the first byte.
    ///
    /// Returns the number of bytes written.
    pub fn write_packed_bits<I>(&mut self, bits: I) -> Result<usize, EncodeError>
    where
        I: IntoIterator<Item = bool>,
    {
        let start = self.pos;
        let mut current = 0u8;
        let mut used = 0u32;
        for bit in bits {
            if bit {
                current |= 1 << used;
            }
            used += 1;
            if used == 8 {
                self.write_u8(current)?;
                current = 0;
                used = 0;
            }
        }
        if used > 0 {
            self.write_u8(current)?;
        }
        Ok(self.pos - start)
    }
}
