use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use super::lock::{DefaultRawLock, RawLock};

/// A mutex protecting a value of type `T` with the raw lock `L`.
///
/// Access is scoped: [`Mutex::lock`] returns a [`MutexGuard`] that releases
/// the lock when it goes out of scope, on every exit path.
pub struct Mutex<T, L: RawLock = DefaultRawLock> {
    raw: L,
    value: UnsafeCell<T>,
}

// Safety: the raw lock serializes all access to `value`. `T` only needs to be
// `Send` since a guard hands out `&mut T` to one thread at a time.
unsafe impl<T: Send, L: RawLock + Sync> Sync for Mutex<T, L> {}

impl<T, L: RawLock> Mutex<T, L> {
    pub fn new(value: T) -> Self {
        Mutex {
            raw: L::default(),
            value: UnsafeCell::new(value),
        }
    }

    /// Blocks until the lock is acquired.
    pub fn lock(&self) -> MutexGuard<'_, T, L> {
        self.raw.lock();
        MutexGuard {
            mutex: self,
            _value: PhantomData,
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, L>> {
        if self.raw.try_lock() {
            Some(MutexGuard {
                mutex: self,
                _value: PhantomData,
            })
        } else {
            None
        }
    }

    /// Get access to the protected value inside the mutex. This is similar to
    /// the Mutex::get_mut in std.
    pub fn get_mut(&mut self) -> &mut T {
        // Safety: &mut gives us exclusive access to T
        self.value.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.value.into_inner()
    }

    #[cfg(all(test, feature = "std"))]
    pub(crate) fn raw(&self) -> &L {
        &self.raw
    }
}

impl<T: Default, L: RawLock> Default for Mutex<T, L> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

/// Represents current exclusive access to the resource protected by a mutex
pub struct MutexGuard<'a, T, L: RawLock = DefaultRawLock> {
    mutex: &'a Mutex<T, L>,
    // Sharing the guard shares `&T`, so the guard is only `Sync` if `T` is.
    _value: PhantomData<&'a mut T>,
}

impl<T, L: RawLock> Deref for MutexGuard<'_, T, L> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        // Safety: the lock is held for as long as the guard exists
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T, L: RawLock> DerefMut for MutexGuard<'_, T, L> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // Safety: the lock is held for as long as the guard exists
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T, L: RawLock> Drop for MutexGuard<'_, T, L> {
    fn drop(&mut self) {
        // Safety: the guard was created by a successful acquisition
        unsafe { self.mutex.raw.unlock() }
    }
}
