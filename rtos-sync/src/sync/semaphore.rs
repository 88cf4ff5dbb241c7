//! Counting semaphores with cancellation.

use crate::{time::Timeout, Result};

/// Contract of a counting semaphore that can be destroyed.
///
/// A semaphore is alive until [`CountingSemaphore::destroy`] is called. From
/// then on every blocked waiter and every later wait returns
/// [`crate::Error::Cancelled`]. Destruction cannot be undone.
pub trait CountingSemaphore {
    /// Creates a live semaphore holding `permits` permits.
    fn with_permits(permits: u32) -> Self
    where
        Self: Sized;

    /// Releases one permit and wakes one blocked waiter, if any.
    ///
    /// Fails with [`crate::Error::Overflow`] if the permit counter is at its
    /// maximum.
    fn post(&self) -> Result<()>;

    /// Takes one permit, blocking until one is available.
    fn wait(&self) -> Result<()>;

    /// Takes one permit if one is available right now, otherwise fails with
    /// [`crate::Error::WouldBlock`].
    fn try_wait(&self) -> Result<()>;

    /// Like [`CountingSemaphore::wait`] but fails with
    /// [`crate::Error::TimedOut`] if no permit became available within
    /// `timeout`.
    fn wait_timed(&self, timeout: Timeout) -> Result<()>;

    /// Destroys the semaphore and wakes all blocked waiters.
    fn destroy(&self);

    /// Point-in-time number of available permits.
    fn permits(&self) -> u32;
}

#[cfg(feature = "std")]
pub use self::os::Semaphore;

#[cfg(feature = "std")]
mod os {
    use std::{
        sync::{Condvar, Mutex, MutexGuard, PoisonError},
        time::Instant,
    };

    use super::CountingSemaphore;
    use crate::{debug, error, time, time::Timeout, Error, Result};

    #[derive(Debug)]
    struct State {
        permits: u32,
        alive: bool,
        waiters: usize,
    }

    impl State {
        /// Takes a permit if the semaphore is alive and has one.
        fn try_take(&mut self) -> Option<Result<()>> {
            if !self.alive {
                Some(Err(Error::Cancelled))
            } else if self.permits > 0 {
                self.permits -= 1;
                Some(Ok(()))
            } else {
                None
            }
        }
    }

    /// A counting semaphore that parks waiting threads.
    ///
    /// Waiters are woken in the order chosen by the OS, no FIFO fairness is
    /// guaranteed.
    #[derive(Debug)]
    pub struct Semaphore {
        state: Mutex<State>,
        available: Condvar,
    }

    impl Semaphore {
        pub const fn new(permits: u32) -> Self {
            Self {
                state: Mutex::new(State {
                    permits,
                    alive: true,
                    waiters: 0,
                }),
                available: Condvar::new(),
            }
        }

        pub fn is_destroyed(&self) -> bool {
            !self.state().alive
        }

        fn state(&self) -> MutexGuard<'_, State> {
            // The state is updated in single steps that cannot panic halfway.
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        fn park<'a>(&self, mut state: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
            state.waiters += 1;
            let mut state = self
                .available
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            state.waiters -= 1;
            state
        }
    }

    impl CountingSemaphore for Semaphore {
        fn with_permits(permits: u32) -> Self {
            Self::new(permits)
        }

        fn post(&self) -> Result<()> {
            {
                let mut state = self.state();
                let Some(permits) = state.permits.checked_add(1) else {
                    error!("semaphore permit counter overflow");
                    return Err(Error::Overflow);
                };
                state.permits = permits;
            }
            self.available.notify_one();
            Ok(())
        }

        fn wait(&self) -> Result<()> {
            let mut state = self.state();
            loop {
                if let Some(result) = state.try_take() {
                    return result;
                }
                state = self.park(state);
            }
        }

        fn try_wait(&self) -> Result<()> {
            self.state().try_take().unwrap_or(Err(Error::WouldBlock))
        }

        fn wait_timed(&self, timeout: Timeout) -> Result<()> {
            let Some(deadline) = Instant::now().checked_add(time::to_std(timeout)) else {
                // The deadline is too far out to be represented.
                return self.wait();
            };

            let mut state = self.state();
            loop {
                if let Some(result) = state.try_take() {
                    return result;
                }

                let now = Instant::now();
                if now >= deadline {
                    return Err(Error::TimedOut);
                }

                state.waiters += 1;
                let (mut woken, _) = self
                    .available
                    .wait_timeout(state, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                woken.waiters -= 1;
                state = woken;
            }
        }

        fn destroy(&self) {
            let waiters = {
                let mut state = self.state();
                if !state.alive {
                    return;
                }
                state.alive = false;
                state.waiters
            };
            self.available.notify_all();
            debug!("semaphore destroyed, cancelled {} waiter(s)", waiters);
        }

        fn permits(&self) -> u32 {
            self.state().permits
        }
    }

    impl Drop for Semaphore {
        fn drop(&mut self) {
            self.destroy();
        }
    }
}
