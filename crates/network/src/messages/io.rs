//! Little-endian payload reader and writer helpers.

use bytes::BufMut;

use crate::error::CodecError;

/// Cursor over a message body.
pub struct PayloadReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left to read
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < len {
            return Err(CodecError::Truncated {
                needed: len,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Reads a compact-size integer.
    pub fn read_var_int(&mut self) -> Result<u64, CodecError> {
        let [prefix] = self.read_array::<1>()?;
        Ok(match prefix {
            0xfd => u16::from_le_bytes(self.read_array()?) as u64,
            0xfe => self.read_u32()? as u64,
            0xff => self.read_u64()?,
            n => n as u64,
        })
    }

    /// Reads a compact-size count of items each at least `min_item_size` bytes.
    ///
    /// Counts that the remaining payload cannot possibly hold are rejected
    /// before any allocation.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize, CodecError> {
        let count = self.read_var_int()?;
        let max = (self.remaining() / min_item_size.max(1)) as u64;
        if count > max {
            return Err(CodecError::InvalidLength(count));
        }
        Ok(count as usize)
    }

    pub fn read_var_str(&mut self) -> Result<String, CodecError> {
        let len = self.read_count(1)?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Fails when unread bytes remain.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

pub fn put_var_int<B: BufMut>(dst: &mut B, value: u64) {
    match value {
        0..=0xfc => dst.put_u8(value as u8),
        0xfd..=0xffff => {
            dst.put_u8(0xfd);
            dst.put_u16_le(value as u16);
        }
        0x1_0000..=0xffff_ffff => {
            dst.put_u8(0xfe);
            dst.put_u32_le(value as u32);
        }
        _ => {
            dst.put_u8(0xff);
            dst.put_u64_le(value);
        }
    }
}

pub fn put_var_str<B: BufMut>(dst: &mut B, value: &str) {
    put_var_int(dst, value.len() as u64);
    dst.put_slice(value.as_bytes());
}
