//! Locks, counting semaphores and the blocking queue composed from them.
//!
//! Lock and semaphore are abstracted by [`RawLock`] and
//! [`CountingSemaphore`] so that the containers built on top of them can run
//! on OS primitives, spin locks or deterministic test doubles.
pub mod lock;
pub mod mutex;
pub mod semaphore;

#[cfg(feature = "std")]
pub mod blocking;

#[cfg(feature = "std")]
pub use blocking::*;
pub use lock::*;
pub use mutex::*;
pub use semaphore::*;
