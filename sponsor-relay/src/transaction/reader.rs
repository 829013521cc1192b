//! Byte cursor for the transaction wire format

use super::DecodeError;

/// Forward-only cursor over a transaction buffer.
///
/// Every read is bounds-checked and reports the field it was reading so
/// truncation errors name the missing part of the transaction.
pub(crate) struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub(crate) fn read_u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        let byte = *self.data.get(self.offset).ok_or(DecodeError::Truncated {
            field,
            offset: self.offset,
        })?;
        self.offset += 1;
        Ok(byte)
    }

    /// Looks at the next byte without consuming it.
    pub(crate) fn peek_u8(&self, field: &'static str) -> Result<u8, DecodeError> {
        self.data.get(self.offset).copied().ok_or(DecodeError::Truncated {
            field,
            offset: self.offset,
        })
    }

    pub(crate) fn read_bytes(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], DecodeError> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(DecodeError::Truncated {
                field,
                offset: self.offset,
            })?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub(crate) fn read_array<const N: usize>(&mut self, field: &'static str) -> Result<[u8; N], DecodeError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N, field)?);
        Ok(out)
    }

    /// Reads a compact-u16 ("shortvec") length prefix.
    ///
    /// One to three bytes, seven value bits per byte, high bit set on all but
    /// the last byte. Overlong encodings (a trailing zero byte) and values
    /// above `u16::MAX` are rejected, matching the runtime's decoder.
    pub(crate) fn read_compact_u16(&mut self, field: &'static str) -> Result<usize, DecodeError> {
        let start = self.offset;
        let mut value: u32 = 0;

        for i in 0..3 {
            let byte = self.read_u8(field)?;
            value |= u32::from(byte & 0x7f) << (7 * i);

            if byte & 0x80 == 0 {
                if i > 0 && byte == 0 {
                    return Err(DecodeError::InvalidCompactU16 { field, offset: start });
                }
                if value > u32::from(u16::MAX) {
                    return Err(DecodeError::InvalidCompactU16 { field, offset: start });
                }
                return Ok(value as usize);
            }
        }

        Err(DecodeError::InvalidCompactU16 { field, offset: start })
    }
}
