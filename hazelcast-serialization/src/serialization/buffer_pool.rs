//! Bounded pool of reusable output buffers.
//!
//! A pool is owned by a single thread. [`BufferPool::lease`] hands out a
//! guard that returns its buffer when dropped, including on error paths.
//! Returning a buffer is an optimization only: a buffer that is never returned
//! is simply freed.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};

use super::data_output::SHRINK_FACTOR;
use super::{ByteOrder, ObjectDataOutput};
use crate::error::{Result, SerializationError};

/// Default number of buffers retained by a pool.
pub const DEFAULT_MAX_POOLED_ITEMS: usize = 3;

/// A bounded, single-threaded cache of [`ObjectDataOutput`] buffers.
#[derive(Debug)]
pub struct BufferPool {
    items: VecDeque<ObjectDataOutput>,
    max_items: usize,
    initial_size: usize,
    byte_order: ByteOrder,
    disposed: bool,
}

impl BufferPool {
    /// Creates an empty pool.
    ///
    /// New buffers are created with `initial_size` bytes and `byte_order`;
    /// at most `max_items` returned buffers are retained.
    pub fn new(max_items: usize, initial_size: usize, byte_order: ByteOrder) -> Self {
        Self {
            items: VecDeque::with_capacity(max_items),
            max_items,
            initial_size,
            byte_order,
            disposed: false,
        }
    }

    /// Takes a buffer with at least `min_size` bytes of capacity.
    ///
    /// Prefers a pooled buffer; allocates a new one when none is large enough.
    /// Fails with [`SerializationError::Unavailable`] after [`dispose`](Self::dispose).
    pub fn rent(&mut self, min_size: usize) -> Result<ObjectDataOutput> {
        if self.disposed {
            return Err(SerializationError::Unavailable(
                "buffer pool has been disposed".to_string(),
            ));
        }

        if let Some(index) = self.items.iter().position(|b| b.capacity() >= min_size) {
            if let Some(buffer) = self.items.remove(index) {
                return Ok(buffer);
            }
        }

        let mut buffer = self
            .items
            .pop_front()
            .unwrap_or_else(|| ObjectDataOutput::with_byte_order(self.initial_size, self.byte_order));
        buffer.ensure_available(min_size);
        Ok(buffer)
    }

    /// Returns a buffer to the pool.
    ///
    /// The buffer is cleared first. It is dropped instead of retained when the
    /// pool is full or disposed, or when it grew past the shrink limit.
    pub fn give_back(&mut self, mut buffer: ObjectDataOutput) {
        let capacity = buffer.capacity();
        if capacity > self.initial_size.saturating_mul(SHRINK_FACTOR) {
            tracing::warn!(
                capacity,
                initial_size = self.initial_size,
                "dropping oversized returned buffer"
            );
            return;
        }
        buffer.clear();
        if self.disposed || self.items.len() >= self.max_items {
            tracing::trace!(
                retained = self.items.len(),
                max_items = self.max_items,
                disposed = self.disposed,
                "dropping returned buffer"
            );
            return;
        }
        self.items.push_back(buffer);
    }

    /// Rents a buffer wrapped in a guard that returns it on drop.
    pub fn lease(&mut self, min_size: usize) -> Result<PooledOutput<'_>> {
        let buffer = self.rent(min_size)?;
        Ok(PooledOutput { pool: self, buffer })
    }

    /// Releases all retained buffers and rejects every later rent.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.items.clear();
    }

    /// Returns true once [`dispose`](Self::dispose) has been called.
    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Returns the number of retained buffers.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true if no buffers are retained.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the maximum number of retained buffers.
    pub fn max_items(&self) -> usize {
        self.max_items
    }
}

/// A rented buffer that goes back to its pool when dropped.
#[derive(Debug)]
pub struct PooledOutput<'p> {
    pool: &'p mut BufferPool,
    buffer: ObjectDataOutput,
}

impl Deref for PooledOutput<'_> {
    type Target = ObjectDataOutput;

    fn deref(&self) -> &ObjectDataOutput {
        &self.buffer
    }
}

impl DerefMut for PooledOutput<'_> {
    fn deref_mut(&mut self) -> &mut ObjectDataOutput {
        &mut self.buffer
    }
}

impl Drop for PooledOutput<'_> {
    fn drop(&mut self) {
        let buffer = std::mem::replace(&mut self.buffer, ObjectDataOutput::with_capacity(0));
        self.pool.give_back(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::DataOutput;

    fn pool(max_items: usize) -> BufferPool {
        BufferPool::new(max_items, 64, ByteOrder::BigEndian)
    }

    #[test]
    fn test_rent_from_empty_pool_allocates() {
        let mut pool = pool(2);
        let buffer = pool.rent(16).unwrap();
        assert!(buffer.capacity() >= 16);
        assert!(buffer.is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_rent_honours_min_size() {
        let mut pool = pool(2);
        let buffer = pool.rent(1000).unwrap();
        assert!(buffer.capacity() >= 1000);
    }

    #[test]
    fn test_returned_buffer_is_reused_and_cleared() {
        let mut pool = pool(2);
        let mut buffer = pool.rent(16).unwrap();
        buffer.write_int(7).unwrap();
        pool.give_back(buffer);
        assert_eq!(pool.len(), 1);

        let buffer = pool.rent(16).unwrap();
        assert!(buffer.is_empty());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_pool_never_exceeds_max_items() {
        let mut pool = pool(3);
        let rented: Vec<_> = (0..10).map(|_| pool.rent(8).unwrap()).collect();
        for buffer in rented {
            pool.give_back(buffer);
            assert!(pool.len() <= 3);
        }
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_lease_returns_on_drop() {
        let mut pool = pool(2);
        {
            let mut lease = pool.lease(8).unwrap();
            lease.write_long(1).unwrap();
            assert_eq!(lease.len(), 8);
        }
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_lease_returns_on_error_path() {
        fn fails(pool: &mut BufferPool) -> Result<()> {
            let mut lease = pool.lease(8)?;
            lease.write_int(1)?;
            Err(SerializationError::Protocol("boom".to_string()))
        }

        let mut pool = pool(2);
        assert!(fails(&mut pool).is_err());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_rent_after_dispose_fails() {
        let mut pool = pool(2);
        let buffer = pool.rent(8).unwrap();
        pool.give_back(buffer);
        pool.dispose();

        assert!(pool.is_disposed());
        assert!(pool.is_empty());
        assert!(matches!(
            pool.rent(8),
            Err(SerializationError::Unavailable(_))
        ));
        assert!(pool.lease(8).is_err());
    }

    #[test]
    fn test_oversized_buffer_is_not_retained() {
        let mut pool = pool(2);
        let buffer = pool.rent(64 * 9).unwrap();
        pool.give_back(buffer);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_give_back_after_dispose_drops() {
        let mut pool = pool(2);
        let buffer = pool.rent(8).unwrap();
        pool.dispose();
        pool.give_back(buffer);
        assert!(pool.is_empty());
    }
}
