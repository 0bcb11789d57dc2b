//! Data input traits and implementations for Hazelcast serialization.

use bytes::Buf;
use uuid::Uuid;

use super::data_output::NULL_ARRAY_LENGTH;
use super::ByteOrder;
use crate::error::{Result, SerializationError};

macro_rules! ordered {
    ($src:expr, $order:expr, $be:ident, $le:ident) => {
        match $order {
            ByteOrder::BigEndian => $src.$be(),
            ByteOrder::LittleEndian => $src.$le(),
        }
    };
}

/// Reads an array length and checks that `len * element_size` bytes remain.
///
/// Returns `None` for the null sentinel.
fn read_length<I: DataInput + ?Sized>(input: &mut I, element_size: usize) -> Result<Option<usize>> {
    let len = input.read_int()?;
    if len == NULL_ARRAY_LENGTH {
        return Ok(None);
    }
    if len < 0 {
        return Err(SerializationError::Serialization(format!(
            "invalid length: {}",
            len
        )));
    }
    let len = len as usize;
    let needed = len.saturating_mul(element_size);
    if needed > input.remaining() {
        return Err(SerializationError::out_of_bounds(
            input.position(),
            needed,
            input.position() + input.remaining(),
        ));
    }
    Ok(Some(len))
}

/// Trait for reading primitive values from Hazelcast's binary format.
///
/// Multi-byte values use [`DataInput::byte_order`] unless read through a
/// `_with` variant. Every read fails with
/// [`SerializationError::OutOfBounds`] when too few bytes remain.
pub trait DataInput {
    /// Returns the default byte order of this input.
    fn byte_order(&self) -> ByteOrder;

    /// Returns the current read position.
    fn position(&self) -> usize;

    /// Returns the number of bytes remaining to be read.
    fn remaining(&self) -> usize;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a UTF-16 code unit in the given byte order.
    fn read_char_with(&mut self, order: ByteOrder) -> Result<u16>;

    /// Reads a 16-bit signed integer in the given byte order.
    fn read_short_with(&mut self, order: ByteOrder) -> Result<i16>;

    /// Reads a 32-bit signed integer in the given byte order.
    fn read_int_with(&mut self, order: ByteOrder) -> Result<i32>;

    /// Reads a 64-bit signed integer in the given byte order.
    fn read_long_with(&mut self, order: ByteOrder) -> Result<i64>;

    /// Reads a 32-bit floating point in the given byte order.
    fn read_float_with(&mut self, order: ByteOrder) -> Result<f32>;

    /// Reads a 64-bit floating point in the given byte order.
    fn read_double_with(&mut self, order: ByteOrder) -> Result<f64>;

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Advances the cursor by `n` bytes.
    fn skip_bytes(&mut self, n: usize) -> Result<()>;

    /// Reads a UTF-16 code unit.
    fn read_char(&mut self) -> Result<u16> {
        let order = self.byte_order();
        self.read_char_with(order)
    }

    /// Reads a 16-bit signed integer.
    fn read_short(&mut self) -> Result<i16> {
        let order = self.byte_order();
        self.read_short_with(order)
    }

    /// Reads a 32-bit signed integer.
    fn read_int(&mut self) -> Result<i32> {
        let order = self.byte_order();
        self.read_int_with(order)
    }

    /// Reads a 64-bit signed integer.
    fn read_long(&mut self) -> Result<i64> {
        let order = self.byte_order();
        self.read_long_with(order)
    }

    /// Reads a 32-bit floating point.
    fn read_float(&mut self) -> Result<f32> {
        let order = self.byte_order();
        self.read_float_with(order)
    }

    /// Reads a 64-bit floating point.
    fn read_double(&mut self) -> Result<f64> {
        let order = self.byte_order();
        self.read_double_with(order)
    }

    /// Reads a UTF-8 string prefixed by its byte length; length -1 is `None`.
    fn read_string(&mut self) -> Result<Option<String>> {
        let len = match read_length(self, 1)? {
            Some(len) => len,
            None => return Ok(None),
        };
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| SerializationError::Serialization(format!("invalid UTF-8 string: {}", e)))
    }

    /// Reads a UUID written by [`DataOutput::write_uuid`](super::DataOutput::write_uuid).
    fn read_uuid(&mut self) -> Result<Uuid> {
        let msb = self.read_long_with(ByteOrder::BigEndian)? as u64;
        let lsb = self.read_long_with(ByteOrder::BigEndian)? as u64;
        Ok(Uuid::from_u64_pair(msb, lsb))
    }

    /// Reads a length-prefixed byte array.
    fn read_byte_array(&mut self) -> Result<Option<Vec<i8>>> {
        match read_length(self, 1)? {
            Some(len) => Ok(Some(
                self.read_bytes(len)?.into_iter().map(|b| b as i8).collect(),
            )),
            None => Ok(None),
        }
    }

    /// Reads a length-prefixed boolean array.
    fn read_bool_array(&mut self) -> Result<Option<Vec<bool>>> {
        let Some(len) = read_length(self, 1)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_bool()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed char array.
    fn read_char_array(&mut self) -> Result<Option<Vec<u16>>> {
        let Some(len) = read_length(self, 2)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_char()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed short array.
    fn read_short_array(&mut self) -> Result<Option<Vec<i16>>> {
        let Some(len) = read_length(self, 2)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_short()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed int array.
    fn read_int_array(&mut self) -> Result<Option<Vec<i32>>> {
        let Some(len) = read_length(self, 4)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_int()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed long array.
    fn read_long_array(&mut self) -> Result<Option<Vec<i64>>> {
        let Some(len) = read_length(self, 8)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_long()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed float array.
    fn read_float_array(&mut self) -> Result<Option<Vec<f32>>> {
        let Some(len) = read_length(self, 4)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_float()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed double array.
    fn read_double_array(&mut self) -> Result<Option<Vec<f64>>> {
        let Some(len) = read_length(self, 8)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_double()).collect::<Result<Vec<_>>>().map(Some)
    }

    /// Reads a length-prefixed array of nullable strings.
    fn read_string_array(&mut self) -> Result<Option<Vec<Option<String>>>> {
        let Some(len) = read_length(self, 4)? else {
            return Ok(None);
        };
        (0..len).map(|_| self.read_string()).collect::<Result<Vec<_>>>().map(Some)
    }
}

/// A bounds-checked, random-access implementation of `DataInput` over a byte slice.
#[derive(Debug, Clone)]
pub struct ObjectDataInput<'a> {
    data: &'a [u8],
    pos: usize,
    byte_order: ByteOrder,
}

macro_rules! positional_readers {
    ($($ty:ty => $at:ident, $at_with:ident, $be:ident, $le:ident, $size:expr;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "` at `position` without moving the cursor.")]
            pub fn $at(&self, position: usize) -> Result<$ty> {
                self.$at_with(position, self.byte_order)
            }

            #[doc = concat!("Reads a `", stringify!($ty), "` at `position` in the given byte order.")]
            pub fn $at_with(&self, position: usize, order: ByteOrder) -> Result<$ty> {
                let mut src = self.slice_at(position, $size)?;
                Ok(ordered!(src, order, $be, $le))
            }
        )*
    };
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new big-endian `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_byte_order(data, ByteOrder::BigEndian)
    }

    /// Creates a new `ObjectDataInput` with the given default byte order.
    pub fn with_byte_order(data: &'a [u8], byte_order: ByteOrder) -> Self {
        Self {
            data,
            pos: 0,
            byte_order,
        }
    }

    /// Returns the total length of the underlying slice.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying slice is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the underlying slice.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Moves the cursor. Fails if `position` is past the end of the data.
    pub fn set_position(&mut self, position: usize) -> Result<()> {
        if position > self.data.len() {
            return Err(SerializationError::out_of_bounds(
                position,
                0,
                self.data.len(),
            ));
        }
        self.pos = position;
        Ok(())
    }

    /// Moves the cursor to a position read from the wire.
    ///
    /// Negative values are rejected rather than wrapped.
    pub fn seek(&mut self, position: i32) -> Result<()> {
        let position = usize::try_from(position).map_err(|_| {
            SerializationError::Serialization(format!("negative position: {}", position))
        })?;
        self.set_position(position)
    }

    /// Borrows the next `len` bytes and advances the cursor.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        let slice = self.slice_at(self.pos, len)?;
        self.pos += len;
        Ok(slice)
    }

    /// Reads a single byte at `position` without moving the cursor.
    pub fn read_byte_at(&self, position: usize) -> Result<i8> {
        let mut src = self.slice_at(position, 1)?;
        Ok(src.get_i8())
    }

    positional_readers! {
        u16 => read_char_at, read_char_at_with, get_u16, get_u16_le, 2;
        i16 => read_short_at, read_short_at_with, get_i16, get_i16_le, 2;
        i32 => read_int_at, read_int_at_with, get_i32, get_i32_le, 4;
        i64 => read_long_at, read_long_at_with, get_i64, get_i64_le, 8;
        f32 => read_float_at, read_float_at_with, get_f32, get_f32_le, 4;
        f64 => read_double_at, read_double_at_with, get_f64, get_f64_le, 8;
    }

    fn slice_at(&self, position: usize, len: usize) -> Result<&'a [u8]> {
        let data = self.data;
        let limit = data.len();
        match position.checked_add(len) {
            Some(end) if end <= limit => Ok(&data[position..end]),
            _ => Err(SerializationError::out_of_bounds(position, len, limit)),
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_slice(1)?.get_u8() != 0)
    }

    fn read_byte(&mut self) -> Result<i8> {
        Ok(self.read_slice(1)?.get_i8())
    }

    fn read_char_with(&mut self, order: ByteOrder) -> Result<u16> {
        let mut src = self.read_slice(2)?;
        Ok(ordered!(src, order, get_u16, get_u16_le))
    }

    fn read_short_with(&mut self, order: ByteOrder) -> Result<i16> {
        let mut src = self.read_slice(2)?;
        Ok(ordered!(src, order, get_i16, get_i16_le))
    }

    fn read_int_with(&mut self, order: ByteOrder) -> Result<i32> {
        let mut src = self.read_slice(4)?;
        Ok(ordered!(src, order, get_i32, get_i32_le))
    }

    fn read_long_with(&mut self, order: ByteOrder) -> Result<i64> {
        let mut src = self.read_slice(8)?;
        Ok(ordered!(src, order, get_i64, get_i64_le))
    }

    fn read_float_with(&mut self, order: ByteOrder) -> Result<f32> {
        let mut src = self.read_slice(4)?;
        Ok(ordered!(src, order, get_f32, get_f32_le))
    }

    fn read_double_with(&mut self, order: ByteOrder) -> Result<f64> {
        let mut src = self.read_slice(8)?;
        Ok(ordered!(src, order, get_f64, get_f64_le))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        Ok(self.read_slice(len)?.to_vec())
    }

    fn skip_bytes(&mut self, n: usize) -> Result<()> {
        self.read_slice(n).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{DataOutput, ObjectDataOutput};

    #[test]
    fn test_new_input() {
        let data = [1, 2, 3, 4];
        let input = ObjectDataInput::new(&data);
        assert_eq!(input.remaining(), 4);
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_read_byte_negative() {
        let data = [0xFFu8];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_byte().unwrap(), -1);
    }

    #[test]
    fn test_read_bool_nonzero_is_true() {
        let data = [42u8, 0];
        let mut input = ObjectDataInput::new(&data);
        assert!(input.read_bool().unwrap());
        assert!(!input.read_bool().unwrap());
    }

    #[test]
    fn test_read_int_big_endian() {
        let data = [0x01, 0x02, 0x03, 0x04];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_int().unwrap(), 0x01020304);
    }

    #[test]
    fn test_read_int_little_endian() {
        let data = [0x04, 0x03, 0x02, 0x01];
        let mut input = ObjectDataInput::with_byte_order(&data, ByteOrder::LittleEndian);
        assert_eq!(input.read_int().unwrap(), 0x01020304);
    }

    #[test]
    fn test_per_call_override() {
        let data = [0, 0, 0, 1];
        let mut input = ObjectDataInput::with_byte_order(&data, ByteOrder::LittleEndian);
        assert_eq!(input.read_int_with(ByteOrder::BigEndian).unwrap(), 1);
    }

    #[test]
    fn test_read_float_and_double() {
        let data = [
            0x3F, 0x80, 0x00, 0x00, 0x3F, 0xF0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_float().unwrap(), 1.0f32);
        assert_eq!(input.read_double().unwrap(), 1.0f64);
    }

    #[test]
    fn test_read_string() {
        let data = [0, 0, 0, 4, b't', b'e', b's', b't'];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_string().unwrap().as_deref(), Some("test"));
    }

    #[test]
    fn test_read_null_string() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF];
        let mut input = ObjectDataInput::new(&data);
        assert_eq!(input.read_string().unwrap(), None);
    }

    #[test]
    fn test_invalid_utf8_string() {
        let data = [0, 0, 0, 2, 0xFF, 0xFE];
        let mut input = ObjectDataInput::new(&data);
        assert!(input.read_string().is_err());
    }

    #[test]
    fn test_negative_string_length() {
        let data = [0xFF, 0xFF, 0xFF, 0xFE];
        let mut input = ObjectDataInput::new(&data);
        assert!(matches!(
            input.read_string(),
            Err(SerializationError::Serialization(_))
        ));
    }

    #[test]
    fn test_insufficient_data_is_bounds_error() {
        let data = [0x01, 0x02, 0x03];
        let mut input = ObjectDataInput::new(&data);
        assert!(matches!(
            input.read_int(),
            Err(SerializationError::OutOfBounds {
                position: 0,
                requested: 4,
                limit: 3
            })
        ));
        assert_eq!(input.position(), 0);
    }

    #[test]
    fn test_array_length_larger_than_data() {
        let data = [0x7F, 0xFF, 0xFF, 0xFF, 1, 2];
        let mut input = ObjectDataInput::new(&data);
        assert!(matches!(
            input.read_long_array(),
            Err(SerializationError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_array_sentinels() {
        let mut output = ObjectDataOutput::new();
        output.write_short_array(None).unwrap();
        output.write_short_array(Some(&[])).unwrap();
        output.write_short_array(Some(&[-1, 2])).unwrap();
        let bytes = output.into_bytes();

        let mut input = ObjectDataInput::new(&bytes);
        assert_eq!(input.read_short_array().unwrap(), None);
        assert_eq!(input.read_short_array().unwrap(), Some(vec![]));
        assert_eq!(input.read_short_array().unwrap(), Some(vec![-1, 2]));
        assert_eq!(input.remaining(), 0);
    }

    #[test]
    fn test_string_array_with_null_element() {
        let values = vec![Some("a".to_string()), None, Some("日本".to_string())];
        let mut output = ObjectDataOutput::new();
        output.write_string_array(Some(&values)).unwrap();
        let bytes = output.into_bytes();

        let mut input = ObjectDataInput::new(&bytes);
        assert_eq!(input.read_string_array().unwrap(), Some(values));
    }

    #[test]
    fn test_uuid_round_trip() {
        let uuid = Uuid::parse_str("6ba7b810-9dad-11d1-80b4-00c04fd430c8").unwrap();
        let mut output = ObjectDataOutput::with_byte_order(32, ByteOrder::LittleEndian);
        output.write_uuid(uuid).unwrap();
        let bytes = output.into_bytes();

        let mut input = ObjectDataInput::with_byte_order(&bytes, ByteOrder::LittleEndian);
        assert_eq!(input.read_uuid().unwrap(), uuid);
    }

    #[test]
    fn test_positional_reads_do_not_move_cursor() {
        let data = [0, 0, 0, 8, 0, 0, 0, 9];
        let input = ObjectDataInput::new(&data);
        assert_eq!(input.read_int_at(4).unwrap(), 9);
        assert_eq!(input.read_int_at(0).unwrap(), 8);
        assert_eq!(input.position(), 0);
        assert!(input.read_int_at(5).is_err());
    }

    #[test]
    fn test_set_position_and_seek() {
        let data = [1, 2, 3];
        let mut input = ObjectDataInput::new(&data);
        input.set_position(3).unwrap();
        assert_eq!(input.remaining(), 0);
        assert!(input.set_position(4).is_err());
        assert!(input.seek(-1).is_err());
        input.seek(1).unwrap();
        assert_eq!(input.read_byte().unwrap(), 2);
    }

    #[test]
    fn test_read_slice_and_skip() {
        let data = [1, 2, 3, 4, 5];
        let mut input = ObjectDataInput::new(&data);
        input.skip_bytes(1).unwrap();
        assert_eq!(input.read_slice(3).unwrap(), &[2, 3, 4]);
        assert!(input.skip_bytes(2).is_err());
        assert_eq!(input.read_bytes(1).unwrap(), vec![5]);
    }
}
