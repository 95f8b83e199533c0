//! # Binary Codec
//!
//! `BinaryReader` / `BinaryWriter` plus the [`Serializable`] contract.
//!
//! ## Variable-Length Integer
//!
//! | Value | Encoding |
//! |-------|----------|
//! | `< 0xFD` | one byte |
//! | `<= 0xFFFF` | `0xFD` + u16 |
//! | `<= 0xFFFF_FFFF` | `0xFE` + u32 |
//! | otherwise | `0xFF` + u64 |

use crate::errors::FormatError;

/// Deterministic binary encoding with explicit size accounting.
///
/// `size()` must equal the number of bytes `serialize` writes.
pub trait Serializable: Sized {
    /// Encoded size in bytes.
    fn size(&self) -> usize;

    /// Append the encoding to `writer`.
    fn serialize(&self, writer: &mut BinaryWriter);

    /// Decode one value, advancing `reader`.
    fn deserialize(reader: &mut BinaryReader<'_>) -> Result<Self, FormatError>;

    /// Encode into a fresh buffer.
    fn to_array(&self) -> Vec<u8> {
        let mut writer = BinaryWriter::with_capacity(self.size());
        self.serialize(&mut writer);
        writer.into_bytes()
    }

    /// Decode from the start of `bytes`. Trailing bytes are ignored.
    fn from_array(bytes: &[u8]) -> Result<Self, FormatError> {
        let mut reader = BinaryReader::new(bytes);
        Self::deserialize(&mut reader)
    }
}

/// Size of a variable-length integer.
pub const fn var_int_size(value: u64) -> usize {
    if value < 0xFD {
        1
    } else if value <= 0xFFFF {
        3
    } else if value <= 0xFFFF_FFFF {
        5
    } else {
        9
    }
}

/// Size of a length-prefixed byte string.
pub const fn var_bytes_size(len: usize) -> usize {
    var_int_size(len as u64) + len
}

/// Size of a length-prefixed UTF-8 string.
pub fn var_string_size(value: &str) -> usize {
    var_bytes_size(value.len())
}

/// Size of a count-prefixed array.
pub fn array_size<T: Serializable>(items: &[T]) -> usize {
    var_int_size(items.len() as u64) + items.iter().map(Serializable::size).sum::<usize>()
}

/// Cursor over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Borrow the next `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < len {
            return Err(FormatError::UnexpectedEof {
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    /// Next byte without consuming it.
    pub fn peek_u8(&self) -> Result<u8, FormatError> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(FormatError::UnexpectedEof {
                needed: 1,
                available: 0,
            })
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_array::<1>()?[0])
    }

    /// Any non-zero byte reads as `true`.
    pub fn read_bool(&mut self) -> Result<bool, FormatError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, FormatError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, FormatError> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    /// Read a variable-length integer no larger than `max`.
    pub fn read_var_int(&mut self, max: u64) -> Result<u64, FormatError> {
        let value = match self.read_u8()? {
            0xFD => u64::from(self.read_u16()?),
            0xFE => u64::from(self.read_u32()?),
            0xFF => self.read_u64()?,
            b => u64::from(b),
        };
        if value > max {
            return Err(FormatError::LimitExceeded { value, max });
        }
        Ok(value)
    }

    /// Read a length-prefixed byte string of at most `max` bytes.
    pub fn read_var_bytes(&mut self, max: usize) -> Result<Vec<u8>, FormatError> {
        let len = self.read_var_int(max as u64)? as usize;
        Ok(self.read_bytes(len)?.to_vec())
    }

    /// Read a length-prefixed UTF-8 string of at most `max` bytes.
    pub fn read_var_string(&mut self, max: usize) -> Result<String, FormatError> {
        String::from_utf8(self.read_var_bytes(max)?).map_err(|_| FormatError::InvalidUtf8)
    }

    /// Read a null-padded string occupying exactly `len` bytes.
    pub fn read_fixed_string(&mut self, len: usize) -> Result<String, FormatError> {
        let raw = self.read_bytes(len)?;
        let end = raw.iter().position(|b| *b == 0).unwrap_or(len);
        if raw[end..].iter().any(|b| *b != 0) {
            return Err(FormatError::invalid("fixed string padding is not zero"));
        }
        std::str::from_utf8(&raw[..end])
            .map(str::to_owned)
            .map_err(|_| FormatError::InvalidUtf8)
    }

    pub fn read_serializable<T: Serializable>(&mut self) -> Result<T, FormatError> {
        T::deserialize(self)
    }

    /// Read a count-prefixed array of at most `max` items.
    pub fn read_serializable_array<T: Serializable>(
        &mut self,
        max: usize,
    ) -> Result<Vec<T>, FormatError> {
        let count = self.read_var_int(max as u64)? as usize;
        // Cap the preallocation by what the input could possibly hold.
        let mut items = Vec::with_capacity(count.min(self.remaining()));
        for _ in 0..count {
            items.push(T::deserialize(self)?);
        }
        Ok(items)
    }
}

/// Growable output buffer.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buffer: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.write_bytes(&value.to_le_bytes());
    }

    pub fn write_var_int(&mut self, value: u64) {
        if value < 0xFD {
            self.write_u8(value as u8);
        } else if value <= 0xFFFF {
            self.write_u8(0xFD);
            self.write_u16(value as u16);
        } else if value <= 0xFFFF_FFFF {
            self.write_u8(0xFE);
            self.write_u32(value as u32);
        } else {
            self.write_u8(0xFF);
            self.write_u64(value);
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_var_int(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn write_var_string(&mut self, value: &str) {
        self.write_var_bytes(value.as_bytes());
    }

    /// Write `value` null-padded to exactly `len` bytes.
    pub fn write_fixed_string(&mut self, value: &str, len: usize) -> Result<(), FormatError> {
        let bytes = value.as_bytes();
        if bytes.len() > len {
            return Err(FormatError::LimitExceeded {
                value: bytes.len() as u64,
                max: len as u64,
            });
        }
        self.write_bytes(bytes);
        self.buffer.resize(self.buffer.len() + len - bytes.len(), 0);
        Ok(())
    }

    pub fn write_serializable<T: Serializable>(&mut self, value: &T) {
        value.serialize(self);
    }

    pub fn write_serializable_array<T: Serializable>(&mut self, items: &[T]) {
        self.write_var_int(items.len() as u64);
        for item in items {
            item.serialize(self);
        }
    }
}
