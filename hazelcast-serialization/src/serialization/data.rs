//! The serialized wire unit.

use bytes::{Buf, Bytes};

use crate::error::{Result, SerializationError};

const PARTITION_HASH_OFFSET: usize = 0;
const TYPE_OFFSET: usize = 4;
/// Offset of the payload within a [`Data`] blob.
pub const DATA_OFFSET: usize = 8;

/// Seed of the partition hash.
const PARTITION_HASH_SEED: u32 = 0x01000193;

/// An immutable serialized value: `[partitionHash:i32][typeId:i32][payload]`.
///
/// Both header fields are big-endian regardless of the payload's byte order.
/// A partition hash of zero means none was set; [`partition_hash`](Self::partition_hash)
/// then hashes the payload.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Data {
    bytes: Bytes,
}

impl Data {
    /// Wraps serialized bytes, checking that the header is present.
    pub fn new(bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < DATA_OFFSET {
            return Err(SerializationError::out_of_bounds(0, DATA_OFFSET, bytes.len()));
        }
        Ok(Self { bytes })
    }

    /// Builds a blob from a type ID and payload, without a partition hash.
    pub fn from_payload(type_id: i32, payload: &[u8]) -> Self {
        let mut bytes = Vec::with_capacity(DATA_OFFSET + payload.len());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&type_id.to_be_bytes());
        bytes.extend_from_slice(payload);
        Self {
            bytes: Bytes::from(bytes),
        }
    }

    /// Returns the serializer type ID.
    pub fn type_id(&self) -> i32 {
        (&self.bytes[TYPE_OFFSET..DATA_OFFSET]).get_i32()
    }

    /// Returns true if an explicit partition hash was stored.
    pub fn has_partition_hash(&self) -> bool {
        self.stored_partition_hash() != 0
    }

    /// Returns the stored partition hash, or the hash of the payload.
    pub fn partition_hash(&self) -> i32 {
        match self.stored_partition_hash() {
            0 => murmur_hash3_x86_32(self.payload(), PARTITION_HASH_SEED),
            stored => stored,
        }
    }

    /// Returns the payload after the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[DATA_OFFSET..]
    }

    /// Returns the whole blob, header included.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the whole blob, header included.
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Returns the total size in bytes.
    pub fn total_size(&self) -> usize {
        self.bytes.len()
    }

    /// Returns the payload size in bytes.
    pub fn data_size(&self) -> usize {
        self.bytes.len() - DATA_OFFSET
    }

    fn stored_partition_hash(&self) -> i32 {
        (&self.bytes[PARTITION_HASH_OFFSET..TYPE_OFFSET]).get_i32()
    }
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("type_id", &self.type_id())
            .field("partition_hash", &self.partition_hash())
            .field("data_size", &self.data_size())
            .finish()
    }
}

/// MurmurHash3 x86 32-bit implementation.
fn murmur_hash3_x86_32(data: &[u8], seed: u32) -> i32 {
    const C1: u32 = 0xcc9e2d51;
    const C2: u32 = 0x1b873593;

    fn mix_k1(k1: u32) -> u32 {
        k1.wrapping_mul(C1).rotate_left(15).wrapping_mul(C2)
    }

    let mut h1 = seed;
    let mut blocks = data.chunks_exact(4);
    for block in &mut blocks {
        let k1 = u32::from_le_bytes([block[0], block[1], block[2], block[3]]);
        h1 ^= mix_k1(k1);
        h1 = h1.rotate_left(13).wrapping_mul(5).wrapping_add(0xe6546b64);
    }

    let tail = blocks.remainder();
    if !tail.is_empty() {
        let k1 = tail
            .iter()
            .rev()
            .fold(0u32, |acc, &byte| (acc << 8) | u32::from(byte));
        h1 ^= mix_k1(k1);
    }

    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85ebca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2ae35);
    h1 ^= h1 >> 16;
    h1 as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_is_big_endian() {
        let data = Data::from_payload(-1, &[9, 8]);
        assert_eq!(data.as_bytes(), &[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 9, 8]);
        assert_eq!(data.type_id(), -1);
        assert_eq!(data.payload(), &[9, 8]);
        assert_eq!(data.data_size(), 2);
        assert_eq!(data.total_size(), 10);
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            Data::new(vec![0u8; 7]),
            Err(SerializationError::OutOfBounds { .. })
        ));
        assert!(Data::new(vec![0u8; 8]).is_ok());
    }

    #[test]
    fn test_stored_partition_hash_wins() {
        let mut bytes = vec![0, 0, 0, 7, 0, 0, 0, 1];
        bytes.extend_from_slice(b"payload");
        let data = Data::new(bytes).unwrap();
        assert!(data.has_partition_hash());
        assert_eq!(data.partition_hash(), 7);
    }

    #[test]
    fn test_computed_partition_hash_depends_on_payload() {
        let a = Data::from_payload(1, b"key1");
        let b = Data::from_payload(1, b"key2");
        assert!(!a.has_partition_hash());
        assert_ne!(a.partition_hash(), b.partition_hash());
        assert_eq!(a.partition_hash(), Data::from_payload(2, b"key1").partition_hash());
    }

    #[test]
    fn test_murmur_known_vectors() {
        assert_eq!(murmur_hash3_x86_32(b"", 0), 0);
        assert_eq!(murmur_hash3_x86_32(b"", 1), 0x514E28B7u32 as i32);
        assert_eq!(murmur_hash3_x86_32(b"test", 0), 0xba6bd213u32 as i32);
        assert_eq!(murmur_hash3_x86_32(b"Hello, world!", 0x9747b28c), 0x24884CBAu32 as i32);
    }

    #[test]
    fn test_murmur_tail_lengths() {
        let hashes: Vec<i32> = (0..8)
            .map(|n| murmur_hash3_x86_32(&b"abcdefgh"[..n], PARTITION_HASH_SEED))
            .collect();
        for (i, a) in hashes.iter().enumerate() {
            for b in &hashes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
