//! Fixed-capacity circular buffers.
//!
//! [`RingBuffer`] owns storage for exactly `N` elements and keeps them in
//! insertion order. It performs no locking: callers that share a buffer
//! between threads must serialize access themselves, e.g. through
//! [`LockedRingBuffer`] or [`crate::sync::Mutex`].
//!
//! The [`BoundedBuffer`] trait is the storage contract the synchronized
//! queues depend on. Implementors provide the single-element operations, the
//! bulk operations come for free. Alternative storage can be plugged into
//! those queues by implementing it.

use core::{iter, mem};

use heapless::Deque;

use crate::{trace, Error, Result};

mod locked;

pub use locked::LockedRingBuffer;

/// A value that was rejected because the buffer had no free slot.
///
/// The rejected value is handed back so that it is not lost.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the rejected value.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> From<Full<T>> for Error {
    fn from(_: Full<T>) -> Self {
        Error::Full
    }
}

/// Contract of a fixed-capacity FIFO buffer.
///
/// Implementations are not expected to be synchronized. All mutating methods
/// take `&mut self`.
pub trait BoundedBuffer<T> {
    /// Maximum number of elements the buffer can hold.
    fn capacity(&self) -> usize;

    /// Number of elements currently stored.
    fn len(&self) -> usize;

    /// Appends `value`. If the buffer is full, the oldest element is removed
    /// first and returned.
    fn insert_overwrite(&mut self, value: T) -> Option<T>;

    /// Appends `value` if there is a free slot, otherwise hands it back
    /// unchanged.
    fn insert_if_space(&mut self, value: T) -> core::result::Result<(), Full<T>>;

    /// Removes and returns the oldest element.
    fn remove_oldest(&mut self) -> Result<T>;

    /// Returns a reference to the oldest element without removing it.
    fn peek_oldest(&self) -> Result<&T>;

    /// Returns a reference to the element at `index`, counted from the
    /// oldest element.
    fn peek_at(&self, index: usize) -> Option<&T>;

    /// Discards up to `n` of the oldest elements. Returns the number of
    /// elements actually discarded.
    fn remove_up_to(&mut self, n: usize) -> usize;

    /// Appends items in order until the buffer is full or the items are
    /// exhausted. Never overwrites. Returns the number of inserted items.
    ///
    /// No more items than there are free slots are pulled from the iterator.
    fn insert_many<I>(&mut self, items: I) -> usize
    where
        I: IntoIterator<Item = T>,
        Self: Sized,
    {
        let free = self.capacity_free();
        items
            .into_iter()
            .take(free)
            .map_while(|item| self.insert_if_space(item).ok())
            .count()
    }

    /// Removes up to `max` of the oldest elements and collects them in
    /// insertion order.
    fn remove_many<C>(&mut self, max: usize) -> C
    where
        C: FromIterator<T>,
        Self: Sized,
    {
        iter::from_fn(|| self.remove_oldest().ok()).take(max).collect()
    }

    /// Collects clones of up to `max` of the oldest elements in insertion
    /// order without removing them.
    fn peek_many<C>(&self, max: usize) -> C
    where
        C: FromIterator<T>,
        T: Clone,
        Self: Sized,
    {
        (0..max.min(self.len()))
            .map_while(|index| self.peek_at(index).cloned())
            .collect()
    }

    /// Number of elements that can still be inserted without overwriting.
    fn capacity_free(&self) -> usize {
        self.capacity() - self.len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() == self.capacity()
    }
}

/// A circular buffer with room for exactly `N` elements.
#[derive(Clone, Debug)]
pub struct RingBuffer<T, const N: usize> {
    items: Deque<T, N>,
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Creates an empty ring buffer.
    pub const fn new() -> Self {
        Self {
            items: Deque::new(),
        }
    }

    /// Creates a ring buffer holding `min(n, N)` clones of `value`.
    pub fn filled(value: T, n: usize) -> Self
    where
        T: Clone,
    {
        let mut buffer = Self::new();
        buffer.insert_many(iter::repeat(value).take(n));
        buffer
    }

    /// Iterates over the stored elements from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.items.iter()
    }

    /// Drops all stored elements.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Exchanges the contents of two buffers.
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(&mut self.items, &mut other.items);
    }
}

impl<T, const N: usize> BoundedBuffer<T> for RingBuffer<T, N> {
    fn capacity(&self) -> usize {
        N
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn insert_overwrite(&mut self, value: T) -> Option<T> {
        let evicted = if self.items.is_full() {
            trace!("ring buffer full, evicting oldest element");
            self.items.pop_front()
        } else {
            None
        };

        match self.items.push_back(value) {
            Ok(()) => evicted,
            // Cannot happen, a slot was freed above.
            Err(value) => Some(value),
        }
    }

    fn insert_if_space(&mut self, value: T) -> core::result::Result<(), Full<T>> {
        self.items.push_back(value).map_err(Full)
    }

    fn remove_oldest(&mut self) -> Result<T> {
        self.items.pop_front().ok_or(Error::Empty)
    }

    fn peek_oldest(&self) -> Result<&T> {
        self.items.front().ok_or(Error::Empty)
    }

    fn peek_at(&self, index: usize) -> Option<&T> {
        let (front, back) = self.items.as_slices();
        match index.checked_sub(front.len()) {
            None => front.get(index),
            Some(index) => back.get(index),
        }
    }

    fn remove_up_to(&mut self, n: usize) -> usize {
        let n = n.min(self.items.len());
        for _ in 0..n {
            self.items.pop_front();
        }
        n
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> FromIterator<T> for RingBuffer<T, N> {
    /// Stores up to `N` leading items.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut buffer = Self::new();
        buffer.insert_many(iter);
        buffer
    }
}
