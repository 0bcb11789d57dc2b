//! Data output traits and implementations for Hazelcast serialization.

use bytes::{BufMut, Bytes, BytesMut};
use uuid::Uuid;

use super::ByteOrder;
use crate::error::{Result, SerializationError};

/// Length written in place of an array or string to encode `None`.
pub const NULL_ARRAY_LENGTH: i32 = -1;

/// Default initial size of an [`ObjectDataOutput`].
pub const DEFAULT_INITIAL_SIZE: usize = 256;

/// A buffer that grew past `initial_size * SHRINK_FACTOR` is reallocated on clear.
pub(crate) const SHRINK_FACTOR: usize = 8;

macro_rules! ordered {
    ($dst:expr, $v:expr, $order:expr, $be:ident, $le:ident) => {
        match $order {
            ByteOrder::BigEndian => $dst.$be($v),
            ByteOrder::LittleEndian => $dst.$le($v),
        }
    };
}

/// Converts a slice length to its wire representation.
pub(crate) fn wire_length(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        SerializationError::Serialization(format!("length {} exceeds i32::MAX", len))
    })
}

/// Trait for writing primitive values in Hazelcast's binary format.
///
/// Multi-byte values use [`DataOutput::byte_order`] unless written through a
/// `_with` variant.
pub trait DataOutput {
    /// Returns the default byte order of this output.
    fn byte_order(&self) -> ByteOrder;

    /// Returns the current write position.
    fn position(&self) -> usize;

    /// Writes raw bytes without length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a single byte (i8).
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a UTF-16 code unit in the given byte order.
    fn write_char_with(&mut self, v: u16, order: ByteOrder) -> Result<()>;

    /// Writes a 16-bit signed integer in the given byte order.
    fn write_short_with(&mut self, v: i16, order: ByteOrder) -> Result<()>;

    /// Writes a 32-bit signed integer in the given byte order.
    fn write_int_with(&mut self, v: i32, order: ByteOrder) -> Result<()>;

    /// Writes a 64-bit signed integer in the given byte order.
    fn write_long_with(&mut self, v: i64, order: ByteOrder) -> Result<()>;

    /// Writes a 32-bit floating point in the given byte order.
    fn write_float_with(&mut self, v: f32, order: ByteOrder) -> Result<()>;

    /// Writes a 64-bit floating point in the given byte order.
    fn write_double_with(&mut self, v: f64, order: ByteOrder) -> Result<()>;

    /// Writes a UTF-16 code unit.
    fn write_char(&mut self, v: u16) -> Result<()> {
        let order = self.byte_order();
        self.write_char_with(v, order)
    }

    /// Writes a 16-bit signed integer.
    fn write_short(&mut self, v: i16) -> Result<()> {
        let order = self.byte_order();
        self.write_short_with(v, order)
    }

    /// Writes a 32-bit signed integer.
    fn write_int(&mut self, v: i32) -> Result<()> {
        let order = self.byte_order();
        self.write_int_with(v, order)
    }

    /// Writes a 64-bit signed integer.
    fn write_long(&mut self, v: i64) -> Result<()> {
        let order = self.byte_order();
        self.write_long_with(v, order)
    }

    /// Writes a 32-bit floating point.
    fn write_float(&mut self, v: f32) -> Result<()> {
        let order = self.byte_order();
        self.write_float_with(v, order)
    }

    /// Writes a 64-bit floating point.
    fn write_double(&mut self, v: f64) -> Result<()> {
        let order = self.byte_order();
        self.write_double_with(v, order)
    }

    /// Writes a string as its UTF-8 byte length followed by the UTF-8 bytes.
    ///
    /// `None` is written as length -1.
    fn write_string(&mut self, v: Option<&str>) -> Result<()> {
        match v {
            Some(s) => {
                self.write_int(wire_length(s.len())?)?;
                self.write_bytes(s.as_bytes())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a UUID as two 8-byte halves, most significant half first.
    ///
    /// Both halves are always big-endian so the bytes match the canonical
    /// string order regardless of the configured byte order.
    fn write_uuid(&mut self, v: Uuid) -> Result<()> {
        let (msb, lsb) = v.as_u64_pair();
        self.write_long_with(msb as i64, ByteOrder::BigEndian)?;
        self.write_long_with(lsb as i64, ByteOrder::BigEndian)
    }

    /// Writes a length-prefixed byte array.
    fn write_byte_array(&mut self, v: Option<&[i8]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                let bytes: Vec<u8> = arr.iter().map(|&b| b as u8).collect();
                self.write_bytes(&bytes)
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed boolean array.
    fn write_bool_array(&mut self, v: Option<&[bool]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &b in arr {
                    self.write_bool(b)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed char array.
    fn write_char_array(&mut self, v: Option<&[u16]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &c in arr {
                    self.write_char(c)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed short array.
    fn write_short_array(&mut self, v: Option<&[i16]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &s in arr {
                    self.write_short(s)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed int array.
    fn write_int_array(&mut self, v: Option<&[i32]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &i in arr {
                    self.write_int(i)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed long array.
    fn write_long_array(&mut self, v: Option<&[i64]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &l in arr {
                    self.write_long(l)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed float array.
    fn write_float_array(&mut self, v: Option<&[f32]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &f in arr {
                    self.write_float(f)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed double array.
    fn write_double_array(&mut self, v: Option<&[f64]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for &d in arr {
                    self.write_double(d)?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }

    /// Writes a length-prefixed array of nullable strings.
    fn write_string_array(&mut self, v: Option<&[Option<String>]>) -> Result<()> {
        match v {
            Some(arr) => {
                self.write_int(wire_length(arr.len())?)?;
                for s in arr {
                    self.write_string(s.as_deref())?;
                }
                Ok(())
            }
            None => self.write_int(NULL_ARRAY_LENGTH),
        }
    }
}

/// A growable, position-tracked implementation of `DataOutput`.
///
/// The backing buffer is zero-filled up to its capacity; the bytes before
/// [`position`](ObjectDataOutput::position) are the output. Positional writes
/// (`write_*_at`) patch previously reserved slots without moving the cursor.
#[derive(Debug)]
pub struct ObjectDataOutput {
    buffer: BytesMut,
    pos: usize,
    initial_size: usize,
    byte_order: ByteOrder,
}

macro_rules! positional_writers {
    ($($ty:ty => $at:ident, $at_with:ident, $be:ident, $le:ident, $size:expr;)*) => {
        $(
            #[doc = concat!("Writes a `", stringify!($ty), "` at `position` without moving the cursor.")]
            pub fn $at(&mut self, position: usize, v: $ty) -> Result<()> {
                self.$at_with(position, v, self.byte_order)
            }

            #[doc = concat!("Writes a `", stringify!($ty), "` at `position` in the given byte order.")]
            pub fn $at_with(&mut self, position: usize, v: $ty, order: ByteOrder) -> Result<()> {
                let mut dst = self.slot_at(position, $size)?;
                ordered!(dst, v, order, $be, $le);
                Ok(())
            }
        )*
    };
}

impl ObjectDataOutput {
    /// Creates a new `ObjectDataOutput` with default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_INITIAL_SIZE)
    }

    /// Creates a new `ObjectDataOutput` with the specified capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_byte_order(capacity, ByteOrder::BigEndian)
    }

    /// Creates a new `ObjectDataOutput` with the specified capacity and byte order.
    pub fn with_byte_order(capacity: usize, byte_order: ByteOrder) -> Self {
        Self {
            buffer: BytesMut::zeroed(capacity),
            pos: 0,
            initial_size: capacity,
            byte_order,
        }
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }

    /// Copies the written bytes into an immutable [`Bytes`], leaving the
    /// buffer reusable.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(self.as_bytes())
    }

    /// Consumes the output and returns the written bytes.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buffer.truncate(self.pos);
        self.buffer.to_vec()
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.pos
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Returns the current size of the backing buffer.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the size this output was created with.
    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    /// Moves the cursor. Fails if `position` is beyond the backing buffer.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.buffer.len() {
            return Err(SerializationError::out_of_bounds(
                position,
                0,
                self.buffer.len(),
            ));
        }
        self.pos = position;
        Ok(())
    }

    /// Grows the backing buffer so at least `n` bytes fit after the cursor.
    ///
    /// Capacity doubles, or jumps straight to the required size when doubling
    /// is not enough.
    pub fn ensure_available(&mut self, n: usize) {
        let required = self.pos + n;
        if required > self.buffer.len() {
            let new_len = (self.buffer.len() * 2).max(required);
            self.buffer.resize(new_len, 0);
        }
    }

    /// Writes `n` zero bytes, typically to reserve slots patched later.
    pub fn write_zero_bytes(&mut self, n: usize) -> Result<()> {
        self.ensure_available(n);
        self.buffer[self.pos..self.pos + n].fill(0);
        self.pos += n;
        Ok(())
    }

    /// Resets the cursor to zero.
    ///
    /// A buffer that grew far past its initial size is reallocated so a pooled
    /// output does not keep a rare large allocation alive.
    pub fn clear(&mut self) {
        self.pos = 0;
        if self.buffer.len() > self.initial_size.saturating_mul(SHRINK_FACTOR) {
            self.buffer = BytesMut::zeroed(self.initial_size);
        }
    }

    /// Writes a single byte at `position` without moving the cursor.
    pub fn write_byte_at(&mut self, position: usize, v: i8) -> Result<()> {
        let mut dst = self.slot_at(position, 1)?;
        dst.put_i8(v);
        Ok(())
    }

    /// Writes a boolean at `position` without moving the cursor.
    pub fn write_bool_at(&mut self, position: usize, v: bool) -> Result<()> {
        self.write_byte_at(position, i8::from(v))
    }

    positional_writers! {
        u16 => write_char_at, write_char_at_with, put_u16, put_u16_le, 2;
        i16 => write_short_at, write_short_at_with, put_i16, put_i16_le, 2;
        i32 => write_int_at, write_int_at_with, put_i32, put_i32_le, 4;
        i64 => write_long_at, write_long_at_with, put_i64, put_i64_le, 8;
        f32 => write_float_at, write_float_at_with, put_f32, put_f32_le, 4;
        f64 => write_double_at, write_double_at_with, put_f64, put_f64_le, 8;
    }

    fn slot_at(&mut self, position: usize, size: usize) -> Result<&mut [u8]> {
        let limit = self.buffer.len();
        match position.checked_add(size) {
            Some(end) if end <= limit => Ok(&mut self.buffer[position..end]),
            _ => Err(SerializationError::out_of_bounds(position, size, limit)),
        }
    }

    fn next_slot(&mut self, size: usize) -> &mut [u8] {
        self.ensure_available(size);
        let start = self.pos;
        self.pos += size;
        &mut self.buffer[start..start + size]
    }
}

impl Default for ObjectDataOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl DataOutput for ObjectDataOutput {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.next_slot(v.len()).copy_from_slice(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.next_slot(1).put_u8(u8::from(v));
        Ok(())
    }

    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.next_slot(1).put_i8(v);
        Ok(())
    }

    fn write_char_with(&mut self, v: u16, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(2);
        ordered!(dst, v, order, put_u16, put_u16_le);
        Ok(())
    }

    fn write_short_with(&mut self, v: i16, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(2);
        ordered!(dst, v, order, put_i16, put_i16_le);
        Ok(())
    }

    fn write_int_with(&mut self, v: i32, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(4);
        ordered!(dst, v, order, put_i32, put_i32_le);
        Ok(())
    }

    fn write_long_with(&mut self, v: i64, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(8);
        ordered!(dst, v, order, put_i64, put_i64_le);
        Ok(())
    }

    fn write_float_with(&mut self, v: f32, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(4);
        ordered!(dst, v, order, put_f32, put_f32_le);
        Ok(())
    }

    fn write_double_with(&mut self, v: f64, order: ByteOrder) -> Result<()> {
        let mut dst = self.next_slot(8);
        ordered!(dst, v, order, put_f64, put_f64_le);
        Ok(())
    }
}
