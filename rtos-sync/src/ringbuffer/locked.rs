use heapless::Vec;

use super::{BoundedBuffer, Full, RingBuffer};
use crate::{
    sync::{DefaultRawLock, Mutex, MutexGuard, RawLock},
    Result,
};

/// A [`RingBuffer`] whose operations are each serialized by an internal lock.
///
/// Unlike [`crate::sync::BlockingRingBuffer`] it never waits for data or
/// space: reads on an empty buffer fail and [`LockedRingBuffer::add_one`]
/// overwrites the oldest element when full.
///
/// Every method takes the lock once. Use [`LockedRingBuffer::lock`] to run
/// several operations atomically.
pub struct LockedRingBuffer<T, const N: usize, L: RawLock = DefaultRawLock> {
    inner: Mutex<RingBuffer<T, N>, L>,
}

impl<T, const N: usize, L: RawLock> LockedRingBuffer<T, N, L> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RingBuffer::new()),
        }
    }

    /// Creates a buffer holding `min(n, N)` clones of `value`.
    pub fn filled(value: T, n: usize) -> Self
    where
        T: Clone,
    {
        Self {
            inner: Mutex::new(RingBuffer::filled(value, n)),
        }
    }

    /// Locks the buffer for a sequence of operations.
    pub fn lock(&self) -> MutexGuard<'_, RingBuffer<T, N>, L> {
        self.inner.lock()
    }

    /// Appends `value`, evicting and returning the oldest element if full.
    pub fn add_one(&self, value: T) -> Option<T> {
        self.inner.lock().insert_overwrite(value)
    }

    /// Appends `value` if there is a free slot.
    pub fn put_one(&self, value: T) -> core::result::Result<(), Full<T>> {
        self.inner.lock().insert_if_space(value)
    }

    pub fn get_one(&self) -> Result<T> {
        self.inner.lock().remove_oldest()
    }

    /// Returns a clone of the oldest element.
    pub fn peek_one(&self) -> Result<T>
    where
        T: Clone,
    {
        self.inner.lock().peek_oldest().cloned()
    }

    /// Appends items until the buffer is full. Returns the number added.
    ///
    /// The iterator runs while the lock is held.
    pub fn add_many<I>(&self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        self.inner.lock().insert_many(items)
    }

    pub fn get_many(&self, max: usize) -> Vec<T, N> {
        self.inner.lock().remove_many(max)
    }

    pub fn peek_many(&self, max: usize) -> Vec<T, N>
    where
        T: Clone,
    {
        self.inner.lock().peek_many(max)
    }

    /// Discards up to `n` of the oldest elements. Returns the number
    /// discarded.
    pub fn remove(&self, n: usize) -> usize {
        self.inner.lock().remove_up_to(n)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn capacity_free(&self) -> usize {
        self.inner.lock().capacity_free()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.inner.lock().is_full()
    }

    /// Exchanges the contents of two buffers. Exclusive access to both makes
    /// locking unnecessary.
    pub fn swap(&mut self, other: &mut Self) {
        self.inner.get_mut().swap(other.inner.get_mut());
    }

    pub fn get_mut(&mut self) -> &mut RingBuffer<T, N> {
        self.inner.get_mut()
    }

    pub fn into_inner(self) -> RingBuffer<T, N> {
        self.inner.into_inner()
    }
}

impl<T: Clone, const N: usize, L: RawLock> Clone for LockedRingBuffer<T, N, L> {
    /// Clones a snapshot of the contents taken under the source's lock.
    fn clone(&self) -> Self {
        let snapshot = self.inner.lock().clone();
        Self {
            inner: Mutex::new(snapshot),
        }
    }
}

impl<T, const N: usize, L: RawLock> Default for LockedRingBuffer<T, N, L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, L: RawLock> From<RingBuffer<T, N>> for LockedRingBuffer<T, N, L> {
    fn from(buffer: RingBuffer<T, N>) -> Self {
        Self {
            inner: Mutex::new(buffer),
        }
    }
}

impl<T, const N: usize, L: RawLock> FromIterator<T> for LockedRingBuffer<T, N, L> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        RingBuffer::from_iter(iter).into()
    }
}
