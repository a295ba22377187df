//! One-shot signal used by the synchronous wait bridges.
//!
//! A [`Baton`] transfers a single post from one thread to any number of
//! waiters. A post that happens before any waiter arrives is remembered
//! and delivered to the next `wait`.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A one-shot signal.
///
/// `post` may be called at most once per baton; `wait` parks the calling
/// thread until the post has happened.
///
/// # Example
///
/// ```
/// use fulcrum::sync::Baton;
/// use std::sync::Arc;
///
/// let baton = Arc::new(Baton::new());
/// let b2 = Arc::clone(&baton);
/// let t = std::thread::spawn(move || b2.post());
/// baton.wait();
/// t.join().unwrap();
/// ```
#[derive(Debug, Default)]
pub struct Baton {
    posted: Mutex<bool>,
    cv: Condvar,
}

impl Baton {
    /// Creates a new baton in the unposted state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            posted: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Posts the baton, releasing every current and future waiter.
    pub fn post(&self) {
        let mut posted = self.posted.lock();
        *posted = true;
        drop(posted);
        self.cv.notify_all();
    }

    /// Returns true if the baton has been posted.
    #[must_use]
    pub fn ready(&self) -> bool {
        *self.posted.lock()
    }

    /// Parks the calling thread until the baton is posted.
    pub fn wait(&self) {
        let mut posted = self.posted.lock();
        while !*posted {
            self.cv.wait(&mut posted);
        }
    }

    /// Parks the calling thread until the baton is posted or `dur` elapses.
    ///
    /// Returns true if the baton was posted in time.
    pub fn try_wait_for(&self, dur: Duration) -> bool {
        let deadline = Instant::now() + dur;
        let mut posted = self.posted.lock();
        while !*posted {
            if self.cv.wait_until(&mut posted, deadline).timed_out() {
                return *posted;
            }
        }
        true
    }
}
