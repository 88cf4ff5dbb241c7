//! Bounded buffering and synchronization primitives for RTOS-style
//! applications.
//!
//! The crate provides a small stack of building blocks, leaves first:
//!
//! - [`ringbuffer::RingBuffer`]: fixed-capacity circular storage. Not
//!   synchronized, all mutating operations require `&mut self`.
//! - [`sync::RawLock`] and [`sync::Mutex`]: mutual exclusion with scoped
//!   acquisition through [`sync::MutexGuard`].
//! - [`sync::CountingSemaphore`] and [`sync::Semaphore`]: counting semaphores
//!   that can be destroyed, cancelling all waiters.
//! - [`sync::BlockingRingBuffer`]: a bounded multi-producer/multi-consumer
//!   queue with blocking, non-blocking and timed operations.
//!
//! The lock, semaphore and buffer used by the blocking queue are type
//! parameters bound by the traits above so that test doubles or OS-native
//! primitives can be substituted.
//!
//! Without the `std` feature the crate is `no_std`. Blocking primitives need
//! an OS to park threads on and are only available with `std`.

#![cfg_attr(not(feature = "std"), no_std)]

use core::fmt;

pub mod ringbuffer;
pub mod sync;
pub mod time;

pub mod log;

#[cfg(any(feature = "defmt", feature = "log"))]
pub use self::log::*;

/// Errors reported by buffers, semaphores and queues.
///
/// None of these are fatal. Callers decide whether to retry, wait longer or
/// give up.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    /// A non-blocking operation found no permit available.
    WouldBlock,
    /// A timed operation gave up before a permit became available.
    TimedOut,
    /// The semaphore or queue was destroyed before or while waiting.
    Cancelled,
    /// A permit counter would exceed its representable maximum.
    Overflow,
    /// The buffer has no free slot.
    Full,
    /// The buffer holds no element.
    Empty,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            Error::WouldBlock => "operation would block",
            Error::TimedOut => "operation timed out",
            Error::Cancelled => "operation cancelled",
            Error::Overflow => "permit counter overflow",
            Error::Full => "buffer full",
            Error::Empty => "buffer empty",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for Error {}

/// A type alias for `Result<T, rtos_sync::Error>`.
pub type Result<T> = core::result::Result<T, Error>;
