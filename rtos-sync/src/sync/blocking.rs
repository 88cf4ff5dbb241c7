//! A bounded producer/consumer queue with blocking, non-blocking and timed
//! operations.
//!
//! Every slot of the queue is accounted for by exactly one of two counting
//! semaphores: `writers` counts free slots, `readers` counts stored items.
//! Producers take a writer permit, insert under the buffer lock and post a
//! reader permit. Consumers do the reverse. Permits are acquired outside the
//! lock, so a blocked thread never holds it.
//!
//! Destroying the queue destroys both semaphores. All blocked and all later
//! waits then fail with [`Error::Cancelled`] without touching the buffer.

use core::{fmt, marker::PhantomData};

use super::{
    lock::{DefaultRawLock, RawLock},
    mutex::Mutex,
    semaphore::{CountingSemaphore, Semaphore},
};
use crate::{
    debug, error,
    ringbuffer::{BoundedBuffer, Full, RingBuffer},
    time::Timeout,
    Error, Result,
};

/// An add operation that did not complete.
///
/// Unless the queue already took the item, it is handed back so that it is
/// not lost.
#[derive(PartialEq, Eq)]
pub struct AddError<T> {
    kind: Error,
    item: Option<T>,
}

impl<T> AddError<T> {
    fn rejected(kind: Error, item: T) -> Self {
        Self {
            kind,
            item: Some(item),
        }
    }

    fn enqueued(kind: Error) -> Self {
        Self { kind, item: None }
    }

    pub fn kind(&self) -> Error {
        self.kind
    }

    pub fn item(&self) -> Option<&T> {
        self.item.as_ref()
    }

    /// Returns the item the queue did not take. `None` if it was enqueued
    /// before the error was detected.
    pub fn into_item(self) -> Option<T> {
        self.item
    }
}

impl<T> fmt::Debug for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AddError")
            .field("kind", &self.kind)
            .field("item_returned", &self.item.is_some())
            .finish()
    }
}

impl<T> fmt::Display for AddError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind, f)
    }
}

impl<T> core::error::Error for AddError<T> {}

impl<T> From<AddError<T>> for Error {
    fn from(err: AddError<T>) -> Self {
        err.kind
    }
}

/// A thread-safe bounded multi-producer/multi-consumer FIFO queue of
/// capacity `N`.
///
/// Producers block (or fail) when the queue is full and consumers when it is
/// empty. Items are never overwritten. The buffer `B`, the lock `L` and the
/// semaphore `S` can be substituted, e.g. by test doubles.
///
/// The queue is usually shared by reference, e.g. from a `static` or through
/// [`std::thread::scope`].
pub struct BlockingRingBuffer<
    T,
    const N: usize,
    B = RingBuffer<T, N>,
    L = DefaultRawLock,
    S = Semaphore,
> where
    B: BoundedBuffer<T>,
    L: RawLock,
    S: CountingSemaphore,
{
    buffer: Mutex<B, L>,
    readers: S,
    writers: S,
    _item: PhantomData<fn(T) -> T>,
}

impl<T, const N: usize, B, L, S> BlockingRingBuffer<T, N, B, L, S>
where
    B: BoundedBuffer<T>,
    L: RawLock,
    S: CountingSemaphore,
{
    const PERMITS: u32 = {
        assert!(N > 0, "queue capacity must not be zero");
        assert!(
            N as u64 <= u32::MAX as u64,
            "queue capacity exceeds the permit counter range"
        );
        N as u32
    };

    /// Creates an empty queue.
    pub fn new() -> Self
    where
        B: Default,
    {
        Self::with_buffer(B::default(), 0)
    }

    /// Creates a queue filled to capacity with clones of `value`.
    pub fn filled(value: T) -> Self
    where
        T: Clone,
        B: Default,
    {
        Self::filled_n(value, N)
    }

    /// Creates a queue holding `min(n, N)` clones of `value`.
    pub fn filled_n(value: T, n: usize) -> Self
    where
        T: Clone,
        B: Default,
    {
        let mut buffer = B::default();
        let mut stored = 0;
        while stored < n.min(N) && buffer.insert_if_space(value.clone()).is_ok() {
            stored += 1;
        }
        // `stored` is bounded by N, which fits the permit counter.
        Self::with_buffer(buffer, stored as u32)
    }

    fn with_buffer(buffer: B, stored: u32) -> Self {
        Self {
            buffer: Mutex::new(buffer),
            readers: S::with_permits(stored),
            writers: S::with_permits(Self::PERMITS - stored),
            _item: PhantomData,
        }
    }

    /// Appends `value`, blocking while the queue is full.
    pub fn add(&self, value: T) -> core::result::Result<(), AddError<T>> {
        match self.writers.wait() {
            Ok(()) => self.push(value),
            Err(kind) => Err(AddError::rejected(kind, value)),
        }
    }

    /// Appends `value` if the queue has a free slot right now.
    pub fn try_add(&self, value: T) -> core::result::Result<(), AddError<T>> {
        match self.writers.try_wait() {
            Ok(()) => self.push(value),
            Err(kind) => Err(AddError::rejected(kind, value)),
        }
    }

    /// Appends `value`, blocking for at most `timeout` while the queue is
    /// full.
    pub fn add_timed(&self, value: T, timeout: Timeout) -> core::result::Result<(), AddError<T>> {
        match self.writers.wait_timed(timeout) {
            Ok(()) => self.push(value),
            Err(kind) => Err(AddError::rejected(kind, value)),
        }
    }

    /// Removes the oldest item, blocking while the queue is empty.
    pub fn get(&self) -> Result<T> {
        self.readers.wait()?;
        self.pop()
    }

    /// Removes the oldest item if there is one right now.
    pub fn try_get(&self) -> Result<T> {
        self.readers.try_wait()?;
        self.pop()
    }

    /// Removes the oldest item, blocking for at most `timeout` while the
    /// queue is empty.
    pub fn get_timed(&self, timeout: Timeout) -> Result<T> {
        self.readers.wait_timed(timeout)?;
        self.pop()
    }

    /// Inserts under the lock. The caller holds a writer permit.
    fn push(&self, value: T) -> core::result::Result<(), AddError<T>> {
        let inserted = self.buffer.lock().insert_if_space(value);
        if let Err(Full(value)) = inserted {
            error!("writer permit granted but the buffer is full");
            return Err(AddError::rejected(Error::Full, value));
        }

        self.readers.post().map_err(|kind| {
            error!("reader permits exceed the queue capacity");
            AddError::enqueued(kind)
        })
    }

    /// Removes under the lock. The caller holds a reader permit.
    fn pop(&self) -> Result<T> {
        let removed = self.buffer.lock().remove_oldest();
        let value = removed.inspect_err(|_| {
            error!("reader permit granted but the buffer is empty");
        })?;

        self.writers.post().inspect_err(|_| {
            error!("writer permits exceed the queue capacity");
        })?;
        Ok(value)
    }

    /// Number of items that can be added without blocking. Only a snapshot
    /// while other threads use the queue.
    pub fn capacity_free(&self) -> usize {
        self.buffer.lock().capacity_free()
    }

    /// Whether the queue holds no item. Only a snapshot while other threads
    /// use the queue.
    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Whether the queue has no free slot. Only a snapshot while other
    /// threads use the queue.
    pub fn is_full(&self) -> bool {
        self.buffer.lock().is_full()
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Cancels all blocked and future blocking operations.
    ///
    /// Items still stored in the queue stay there but can no longer be
    /// taken out. Calling this more than once has no further effect.
    pub fn destroy(&self) {
        debug!("destroying blocking ring buffer");
        self.readers.destroy();
        self.writers.destroy();
    }
}

impl<T, const N: usize, B, L, S> Default for BlockingRingBuffer<T, N, B, L, S>
where
    B: BoundedBuffer<T> + Default,
    L: RawLock,
    S: CountingSemaphore,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, B, L, S> FromIterator<T> for BlockingRingBuffer<T, N, B, L, S>
where
    B: BoundedBuffer<T> + Default,
    L: RawLock,
    S: CountingSemaphore,
{
    /// Adds up to `N` leading items in order.
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let queue = Self::new();
        for item in iter.into_iter().take(N) {
            if let Err(err) = queue.try_add(item) {
                error!("initial item rejected: {}", err.kind());
                break;
            }
        }
        queue
    }
}

impl<T, const N: usize, B, L, S> Drop for BlockingRingBuffer<T, N, B, L, S>
where
    B: BoundedBuffer<T>,
    L: RawLock,
    S: CountingSemaphore,
{
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use core::cell::Cell;
    use std::{
        collections::HashSet,
        sync::Barrier,
        thread,
        time::{Duration, Instant},
    };

    use fugit::ExtU64;
    use rand::Rng;

    use super::{AddError, BlockingRingBuffer};
    use crate::{
        ringbuffer::{BoundedBuffer, RingBuffer},
        sync::{lock::CountingLock, CountingSemaphore, NoopLock, RawMutex, Semaphore},
        time::Timeout,
        Error, Result,
    };

    type Queue<const N: usize> = BlockingRingBuffer<u32, N>;

    /// Never blocks: waiting without a permit fails with `TimedOut`. The
    /// next `post` fails with `fail_post` if one is set.
    #[derive(Debug)]
    struct FakeSemaphore {
        permits: Cell<u32>,
        posts: Cell<usize>,
        destroyed: Cell<bool>,
        fail_post: Cell<Option<Error>>,
    }

    impl FakeSemaphore {
        fn take(&self, empty: Error) -> Result<()> {
            if self.destroyed.get() {
                return Err(Error::Cancelled);
            }
            match self.permits.get() {
                0 => Err(empty),
                permits => {
                    self.permits.set(permits - 1);
                    Ok(())
                }
            }
        }
    }

    impl CountingSemaphore for FakeSemaphore {
        fn with_permits(permits: u32) -> Self {
            Self {
                permits: Cell::new(permits),
                posts: Cell::new(0),
                destroyed: Cell::new(false),
                fail_post: Cell::new(None),
            }
        }

        fn post(&self) -> Result<()> {
            if let Some(err) = self.fail_post.take() {
                return Err(err);
            }
            self.posts.set(self.posts.get() + 1);
            self.permits.set(self.permits.get() + 1);
            Ok(())
        }

        fn wait(&self) -> Result<()> {
            self.take(Error::TimedOut)
        }

        fn try_wait(&self) -> Result<()> {
            self.take(Error::WouldBlock)
        }

        fn wait_timed(&self, _timeout: Timeout) -> Result<()> {
            self.take(Error::TimedOut)
        }

        fn destroy(&self) {
            self.destroyed.set(true);
        }

        fn permits(&self) -> u32 {
            self.permits.get()
        }
    }

    type FakeQueue<const N: usize> =
        BlockingRingBuffer<u32, N, RingBuffer<u32, N>, CountingLock, FakeSemaphore>;

    fn assert_accounting<const N: usize>(queue: &Queue<N>) {
        assert_eq!(
            queue.readers.permits() + queue.writers.permits(),
            N as u32,
            "every slot must be counted by exactly one semaphore"
        );
        assert_eq!(queue.readers.permits() as usize, N - queue.capacity_free());
    }

    #[test]
    pub fn test_fifo() {
        let queue = Queue::<8>::new();
        for value in 1..=5 {
            queue.add(value).unwrap();
        }
        for value in 1..=5 {
            assert_eq!(queue.get(), Ok(value));
        }
        assert!(queue.is_empty());
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_capacity_three_scenario() {
        let queue = Queue::<3>::new();
        assert_eq!(queue.add(1), Ok(()));
        assert_eq!(queue.add(2), Ok(()));
        assert_eq!(queue.add(3), Ok(()));
        assert!(queue.is_full());

        let err = queue.try_add(4).unwrap_err();
        assert_eq!(err.kind(), Error::WouldBlock);
        assert_eq!(err.into_item(), Some(4), "the rejected item is handed back");

        assert_eq!(queue.get(), Ok(1));
        assert_eq!(queue.try_add(4), Ok(()));
        assert_eq!(queue.get(), Ok(2));
        assert_eq!(queue.get(), Ok(3));
        assert_eq!(queue.get(), Ok(4));
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_try_add_saturation() {
        let queue = Queue::<1>::new();
        assert_eq!(queue.try_add(1), Ok(()));
        assert_eq!(
            queue.try_add(2).map_err(Error::from),
            Err(Error::WouldBlock)
        );
        assert_eq!(queue.try_get(), Ok(1));
        assert_eq!(queue.try_get(), Err(Error::WouldBlock));
    }

    #[test]
    pub fn test_blocking_round_trip() {
        let queue = Queue::<1>::new();
        queue.add(1).unwrap();

        thread::scope(|s| {
            let producer = s.spawn(|| queue.add(2));

            thread::sleep(Duration::from_millis(20));
            assert!(!producer.is_finished(), "add on a full queue must block");
            assert_eq!(queue.capacity_free(), 0);

            assert_eq!(queue.get(), Ok(1));
            assert_eq!(producer.join().unwrap(), Ok(()));
        });

        assert_eq!(queue.get(), Ok(2));
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_get_timed_times_out() {
        let queue = Queue::<2>::new();

        let start = Instant::now();
        assert_eq!(queue.get_timed(30.millis()), Err(Error::TimedOut));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(queue.is_empty());
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_add_timed() {
        let queue = Queue::<1>::new();
        assert_eq!(queue.add_timed(1, 10.millis()), Ok(()));

        let err = queue.add_timed(2, 10.millis()).unwrap_err();
        assert_eq!(err.kind(), Error::TimedOut);
        assert_eq!(err.item(), Some(&2));
        assert_eq!(queue.get_timed(10.millis()), Ok(1));
    }

    #[test]
    pub fn test_destroy_cancels_subsequent_operations() {
        let queue = Queue::<1>::new();
        queue.add(1).unwrap();
        queue.destroy();

        let err = queue.add(2).unwrap_err();
        assert_eq!(err.kind(), Error::Cancelled);
        assert_eq!(err.into_item(), Some(2));
        assert_eq!(queue.get(), Err(Error::Cancelled));
        assert_eq!(queue.try_get(), Err(Error::Cancelled));
        assert_eq!(queue.get_timed(1.millis()), Err(Error::Cancelled));
        assert_eq!(
            queue.try_add(3).map_err(Error::from),
            Err(Error::Cancelled)
        );
        assert!(queue.is_full(), "the stored item must be left untouched");
    }

    #[test]
    pub fn test_destroy_cancels_pending_operations() {
        let full = Queue::<1>::filled(0);
        let empty = Queue::<1>::new();
        let barrier = Barrier::new(3);

        thread::scope(|s| {
            let producer = s.spawn(|| {
                barrier.wait();
                full.add(1)
            });
            let consumer = s.spawn(|| {
                barrier.wait();
                empty.get_timed(10.secs())
            });

            barrier.wait();
            thread::sleep(Duration::from_millis(20));
            full.destroy();
            empty.destroy();

            assert_eq!(
                producer.join().unwrap(),
                Err(AddError::rejected(Error::Cancelled, 1))
            );
            assert_eq!(consumer.join().unwrap(), Err(Error::Cancelled));
        });
    }

    #[test]
    pub fn test_filled_constructors() {
        let queue = Queue::<3>::filled(7);
        assert!(queue.is_full());
        assert_accounting(&queue);

        let queue = Queue::<3>::filled_n(7, 2);
        assert_eq!(queue.capacity_free(), 1);
        assert_eq!(queue.get(), Ok(7));
        assert_accounting(&queue);

        let queue = Queue::<3>::filled_n(7, 10);
        assert!(queue.is_full(), "fill count is capped at the capacity");
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_from_iter_adds_leading_items() {
        let queue: Queue<2> = [1, 2, 3].into_iter().collect();
        assert!(queue.is_full());
        assert_eq!(queue.get(), Ok(1));
        assert_eq!(queue.get(), Ok(2));
        assert_accounting(&queue);
    }

    #[test]
    pub fn test_permit_flow_with_fake_semaphore() {
        let queue = FakeQueue::<2>::new();
        assert_eq!(queue.add(1), Ok(()));

        assert_eq!(queue.writers.permits(), 1);
        assert_eq!(queue.readers.permits(), 1);
        assert_eq!(queue.readers.posts.get(), 1, "one reader permit per add");
        assert_eq!(queue.writers.posts.get(), 0);

        assert_eq!(queue.get(), Ok(1));
        assert_eq!(queue.writers.posts.get(), 1, "one writer permit per get");
        assert_eq!(queue.get(), Err(Error::TimedOut));
    }

    #[test]
    pub fn test_failed_wait_does_not_lock() {
        let queue = FakeQueue::<1>::new();
        queue.add(1).unwrap();
        let locks = queue.buffer.raw().locks();

        let err = queue.add(2).unwrap_err();
        assert_eq!(err.kind(), Error::TimedOut);
        assert_eq!(
            queue.buffer.raw().locks(),
            locks,
            "the buffer must not be touched without a permit"
        );
    }

    #[test]
    pub fn test_every_operation_locks_once() {
        let queue = FakeQueue::<4>::new();
        queue.add(1).unwrap();
        queue.try_add(2).unwrap();
        queue.add_timed(3, 1.millis()).unwrap();
        queue.get().unwrap();
        queue.try_get().unwrap();
        queue.get_timed(1.millis()).unwrap();
        let _ = (queue.capacity_free(), queue.is_empty(), queue.is_full());

        let lock = queue.buffer.raw();
        assert_eq!(lock.locks(), 9);
        assert_eq!(lock.unlocks(), 9);
        assert!(!lock.is_held(), "the lock must be released after each call");
    }

    #[test]
    pub fn test_reader_post_overflow_keeps_item_enqueued() {
        let queue = FakeQueue::<2>::new();
        queue.readers.fail_post.set(Some(Error::Overflow));

        let err = queue.add(1).unwrap_err();
        assert_eq!(err.kind(), Error::Overflow);
        assert_eq!(err.into_item(), None, "the item was already enqueued");
        assert_eq!(queue.capacity_free(), 1);
        assert_eq!(queue.buffer.lock().peek_oldest(), Ok(&1));
    }

    #[test]
    pub fn test_writer_post_overflow_on_get() {
        let queue = FakeQueue::<2>::new();
        queue.add(1).unwrap();
        queue.writers.fail_post.set(Some(Error::Overflow));

        assert_eq!(queue.get(), Err(Error::Overflow));
        assert!(queue.is_empty(), "the item was removed before the post");
        assert_eq!(queue.writers.permits(), 1);
    }

    #[test]
    pub fn test_full_buffer_hands_item_back() {
        let queue = FakeQueue::<1>::new();
        queue.add(1).unwrap();
        // A writer permit without a matching free slot.
        queue.writers.permits.set(1);

        let err = queue.add(2).unwrap_err();
        assert_eq!(err.kind(), Error::Full);
        assert_eq!(err.into_item(), Some(2), "the rejected item is handed back");
        assert_eq!(
            queue.readers.posts.get(),
            1,
            "a rejected item must not grant a reader permit"
        );
        assert_eq!(queue.get(), Ok(1));
    }

    #[test]
    pub fn test_empty_buffer_on_get() {
        let queue = FakeQueue::<1>::new();
        // A reader permit without a matching item.
        queue.readers.permits.set(1);

        assert_eq!(queue.get(), Err(Error::Empty));
        assert_eq!(
            queue.writers.posts.get(),
            0,
            "no writer permit may be granted without a removed item"
        );
    }

    #[test]
    pub fn test_single_threaded_with_noop_lock() {
        let queue: BlockingRingBuffer<u32, 2, RingBuffer<u32, 2>, NoopLock> =
            BlockingRingBuffer::new();
        queue.add(1).unwrap();
        assert_eq!(queue.get(), Ok(1));
    }

    #[test]
    pub fn test_mpmc_stress() {
        const PRODUCERS: u32 = 4;
        const CONSUMERS: usize = 3;
        const ITEMS: u32 = 500;

        let queue: BlockingRingBuffer<u32, 4, RingBuffer<u32, 4>, RawMutex, Semaphore> =
            BlockingRingBuffer::new();

        let received = thread::scope(|s| {
            for producer in 0..PRODUCERS {
                let queue = &queue;
                s.spawn(move || {
                    let mut rng = rand::rng();
                    for seq in 0..ITEMS {
                        let item = producer * ITEMS + seq;
                        if rng.random_bool(0.5) {
                            queue.add(item).unwrap();
                        } else {
                            let mut item = item;
                            while let Err(err) = queue.add_timed(item, 100.micros()) {
                                assert_eq!(err.kind(), Error::TimedOut);
                                item = err.into_item().unwrap();
                            }
                        }
                    }
                });
            }

            let consumers: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    s.spawn(|| {
                        let mut received = Vec::new();
                        let mut last_seen = [None; PRODUCERS as usize];
                        // Consumers stop once no item arrived for a while.
                        while let Ok(item) = queue.get_timed(500.millis()) {
                            let (producer, seq) = (item / ITEMS, item % ITEMS);
                            let last = &mut last_seen[producer as usize];
                            assert!(
                                last.is_none_or(|last| last < seq),
                                "items of one producer must arrive in order"
                            );
                            *last = Some(seq);
                            received.push(item);
                        }
                        received
                    })
                })
                .collect();

            consumers
                .into_iter()
                .flat_map(|consumer| consumer.join().unwrap())
                .collect::<Vec<_>>()
        });

        let unique: HashSet<_> = received.iter().copied().collect();
        assert_eq!(received.len(), (PRODUCERS * ITEMS) as usize);
        assert_eq!(unique.len(), received.len(), "no item may be duplicated");
        assert!(queue.is_empty());
    }
}
