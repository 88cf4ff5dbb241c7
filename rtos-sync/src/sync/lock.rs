//! Raw mutual exclusion.
//!
//! A [`RawLock`] only provides the acquire/release protocol. It does not own
//! the data it protects, see [`super::Mutex`] for that.

use core::{cell::Cell, hint::spin_loop, marker::PhantomData};

use portable_atomic::{AtomicBool, Ordering};

/// Lock used by the synchronized containers unless another one is requested.
#[cfg(feature = "std")]
pub type DefaultRawLock = RawMutex;

/// Lock used by the synchronized containers unless another one is requested.
#[cfg(not(feature = "std"))]
pub type DefaultRawLock = SpinLock;

/// The lock/unlock protocol of a non-reentrant mutual exclusion primitive.
///
/// # Safety
///
/// Between a successful [`RawLock::lock`] or [`RawLock::try_lock`] and the
/// matching [`RawLock::unlock`], no other acquisition of the same lock may
/// succeed. Implementations that are `Sync` must uphold this across threads.
pub unsafe trait RawLock: Default {
    /// Acquires the lock, blocking the caller until it is available.
    fn lock(&self);

    /// Acquires the lock if it is available. Returns whether it was acquired.
    fn try_lock(&self) -> bool;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The lock must be held by the caller.
    unsafe fn unlock(&self);
}

/// A lock that parks blocked threads until the holder releases it.
#[cfg(feature = "std")]
#[derive(Debug, Default)]
pub struct RawMutex {
    locked: std::sync::Mutex<bool>,
    released: std::sync::Condvar,
}

#[cfg(feature = "std")]
impl RawMutex {
    pub const fn new() -> Self {
        Self {
            locked: std::sync::Mutex::new(false),
            released: std::sync::Condvar::new(),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, bool> {
        // The flag is always consistent, a panicking holder cannot corrupt it.
        self.locked
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(feature = "std")]
unsafe impl RawLock for RawMutex {
    fn lock(&self) {
        let mut locked = self.locked();
        while *locked {
            locked = self
                .released
                .wait(locked)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
        }
        *locked = true;
    }

    fn try_lock(&self) -> bool {
        let mut locked = self.locked();
        if *locked {
            false
        } else {
            *locked = true;
            true
        }
    }

    unsafe fn unlock(&self) {
        *self.locked() = false;
        self.released.notify_one();
    }
}

/// A lock that busy-waits until it becomes available.
///
/// Suitable for short critical sections and for targets without an OS.
#[derive(Debug, Default)]
pub struct SpinLock {
    locked: AtomicBool,
}

impl SpinLock {
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
        }
    }
}

unsafe impl RawLock for SpinLock {
    fn lock(&self) {
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.locked.load(Ordering::Relaxed) {
                spin_loop();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

/// A lock that performs no synchronization at all.
///
/// It is `!Sync`, so anything protected by it stays confined to a single
/// thread. It still remembers whether it is held: locking it twice without
/// unlocking panics instead of handing out aliasing access.
#[derive(Debug, Default)]
pub struct NoopLock {
    held: Cell<bool>,
    _not_sync: PhantomData<Cell<()>>,
}

impl NoopLock {
    pub const fn new() -> Self {
        Self {
            held: Cell::new(false),
            _not_sync: PhantomData,
        }
    }
}

unsafe impl RawLock for NoopLock {
    fn lock(&self) {
        assert!(self.try_lock(), "NoopLock locked recursively");
    }

    fn try_lock(&self) -> bool {
        !self.held.replace(true)
    }

    unsafe fn unlock(&self) {
        self.held.set(false);
    }
}

#[cfg(all(test, feature = "std"))]
pub(crate) use tests::CountingLock;
