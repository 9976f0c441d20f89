use std::thread;
use std::time::{Duration, Instant};

/// Time source for pump waits.
///
/// The scheduler only ever sleeps through a `Clock`, so a whole recipe can be
/// replayed in virtual time.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);
}

/// Wall-clock time backed by `std::time::Instant` and `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        if !d.is_zero() {
            thread::sleep(d);
        }
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod test_clock {
    use super::{Clock, Duration, Instant};
    use std::sync::{Arc, Mutex, PoisonError};

    #[derive(Debug, Default)]
    struct Virtual {
        elapsed: Duration,
        sleeps: usize,
    }

    /// Virtual clock: `sleep` advances time instantly. Clones share state, so
    /// a test keeps one copy while the engine sleeps on another.
    #[derive(Debug, Clone)]
    pub struct TestClock {
        origin: Instant,
        state: Arc<Mutex<Virtual>>,
    }

    impl Default for TestClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                state: Arc::new(Mutex::new(Virtual::default())),
            }
        }

        /// Total virtual time slept so far.
        pub fn elapsed(&self) -> Duration {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .elapsed
        }

        /// Number of non-zero sleeps taken.
        pub fn sleeps(&self) -> usize {
            self.state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .sleeps
        }
    }

    impl Clock for TestClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            if d.is_zero() {
                return;
            }
            let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.elapsed = st.elapsed.saturating_add(d);
            st.sleeps += 1;
        }
    }
}
