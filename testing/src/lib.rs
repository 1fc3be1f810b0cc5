//! # Todo Sync Testing
//!
//! Testing utilities and helpers for the external todo sync pipeline.
//!
//! This crate provides:
//! - Deterministic implementations of the environment traits
//!   ([`FixedClock`], [`ManualClock`], [`SequentialIdGenerator`])
//! - A scriptable [`MockExternalTodoService`]
//! - In-memory broker doubles ([`InMemoryEventBus`], [`InMemoryMessageSource`])
//! - A [`RecordingProcessor`] with fault injection
//!
//! ## Example
//!
//! ```ignore
//! use todo_sync_testing::{ManualClock, MockExternalTodoService};
//! use todo_sync_runtime::{CachingExternalTodoService, InMemoryCacheStore};
//!
//! #[tokio::test]
//! async fn list_is_cached() {
//!     let clock = Arc::new(ManualClock::at_epoch());
//!     let inner = Arc::new(MockExternalTodoService::new());
//!     let cache = Arc::new(InMemoryCacheStore::with_clock(clock.clone()));
//!     let service = CachingExternalTodoService::new(inner.clone(), cache);
//!
//!     service.list(&CancellationToken::new()).await?;
//!     service.list(&CancellationToken::new()).await?;
//!     assert_eq!(inner.calls().list, 1);
//! }
//! ```

mod event_bus_mocks;
mod service_mocks;

use chrono::{DateTime, Utc};
use todo_sync_core::environment::{Clock, IdGenerator};

/// Mock implementations of Environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity

    use super::{Clock, DateTime, IdGenerator, Utc};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use todo_sync_testing::mocks::FixedClock;
    /// use todo_sync_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }

        /// Fixed clock at the Unix epoch.
        #[must_use]
        pub const fn at_epoch() -> Self {
            Self::new(DateTime::<Utc>::UNIX_EPOCH)
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Lets cache expiry be tested without sleeping:
    ///
    /// ```
    /// use todo_sync_testing::mocks::ManualClock;
    /// use todo_sync_core::environment::Clock;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::at_epoch();
    /// let start = clock.now();
    /// clock.advance(Duration::from_secs(61));
    /// assert_eq!((clock.now() - start).num_seconds(), 61);
    /// ```
    #[derive(Debug)]
    pub struct ManualClock {
        time: Mutex<DateTime<Utc>>,
    }

    impl ManualClock {
        /// Start at `time`.
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Mutex::new(time),
            }
        }

        /// Start at the Unix epoch.
        #[must_use]
        pub const fn at_epoch() -> Self {
            Self::new(DateTime::<Utc>::UNIX_EPOCH)
        }

        /// Move time forward by `by`.
        pub fn advance(&self, by: Duration) {
            let by = chrono::Duration::from_std(by).unwrap();
            let mut time = self.time.lock().unwrap();
            *time += by;
        }

        /// Jump to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.lock().unwrap() = time;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap()
        }
    }

    /// Predictable ids: `{prefix}-1`, `{prefix}-2`, ...
    #[derive(Debug)]
    pub struct SequentialIdGenerator {
        prefix: String,
        next: AtomicU64,
    }

    impl SequentialIdGenerator {
        /// Ids of the form `{prefix}-{n}`, starting at 1.
        #[must_use]
        pub fn new(prefix: impl Into<String>) -> Self {
            Self {
                prefix: prefix.into(),
                next: AtomicU64::new(1),
            }
        }
    }

    impl IdGenerator for SequentialIdGenerator {
        fn next_id(&self) -> String {
            let n = self.next.fetch_add(1, Ordering::SeqCst);
            format!("{}-{n}", self.prefix)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

// Re-export commonly used items
pub use event_bus_mocks::{InMemoryEventBus, InMemoryMessageSource, RecordingProcessor, SourceProbe};
pub use mocks::{FixedClock, ManualClock, SequentialIdGenerator, test_clock};
pub use service_mocks::{MockExternalTodoService, ServiceCalls};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
    }

    #[test]
    fn sequential_ids_count_from_one() {
        let ids = SequentialIdGenerator::new("todo");
        assert_eq!(ids.next_id(), "todo-1");
        assert_eq!(ids.next_id(), "todo-2");
    }
}
