//! # Testable Clock
//!
//! A millisecond clock whose source can be swapped at runtime. Tests pin it to
//! a fixed instant, hand it a closure, or point it at another clock; production
//! code leaves it on the system time.
//!
//! Clones share state: calling [`Clock::set_time`] on any handle is visible to
//! every other handle of the same clock, and to every clock proxying it.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// A closure producing the current time in milliseconds since the Unix epoch.
pub type TimeFn = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Where a [`Clock`] reads its time from.
#[derive(Clone)]
pub enum TimeSource {
    /// Wall-clock time.
    System,
    /// A pinned instant, in milliseconds.
    Fixed(i64),
    /// An arbitrary closure.
    Delegate(TimeFn),
    /// Another clock. Later changes to that clock are observed here.
    Proxy(Clock),
}

impl fmt::Debug for TimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeSource::System => f.write_str("System"),
            TimeSource::Fixed(ms) => f.debug_tuple("Fixed").field(ms).finish(),
            TimeSource::Delegate(_) => f.write_str("Delegate(..)"),
            TimeSource::Proxy(_) => f.write_str("Proxy(..)"),
        }
    }
}

impl From<i64> for TimeSource {
    fn from(ms: i64) -> Self {
        TimeSource::Fixed(ms)
    }
}

impl From<Option<i64>> for TimeSource {
    fn from(ms: Option<i64>) -> Self {
        ms.map_or(TimeSource::System, TimeSource::Fixed)
    }
}

impl From<Clock> for TimeSource {
    fn from(clock: Clock) -> Self {
        TimeSource::Proxy(clock)
    }
}

impl From<&Clock> for TimeSource {
    fn from(clock: &Clock) -> Self {
        TimeSource::Proxy(clock.clone())
    }
}

/// A shareable, swappable millisecond clock.
#[derive(Clone)]
pub struct Clock {
    source: Arc<RwLock<TimeSource>>,
}

impl Clock {
    /// A clock on system time.
    pub fn new() -> Self {
        Self::with_source(TimeSource::System)
    }

    /// A clock reading from `source`.
    pub fn with_source(source: impl Into<TimeSource>) -> Self {
        Self {
            source: Arc::new(RwLock::new(source.into())),
        }
    }

    /// A clock pinned to `ms`.
    pub fn fixed(ms: i64) -> Self {
        Self::with_source(TimeSource::Fixed(ms))
    }

    /// A clock that evaluates `f` on every read.
    pub fn from_fn(f: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self::with_source(TimeSource::Delegate(Arc::new(f)))
    }

    /// Current time in milliseconds since the Unix epoch.
    pub fn now(&self) -> i64 {
        // Clone out of the lock so delegates and proxies run unlocked.
        let source = self
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match source {
            TimeSource::System => system_millis(),
            TimeSource::Fixed(ms) => ms,
            TimeSource::Delegate(f) => f(),
            TimeSource::Proxy(other) => other.now(),
        }
    }

    /// Replaces this clock's source. Clocks proxying this one follow the change;
    /// a clock this one proxies is left alone.
    pub fn set_time(&self, source: impl Into<TimeSource>) {
        let source = source.into();
        if let TimeSource::Proxy(other) = &source {
            if other.reaches(self) {
                log::warn!("Ignoring clock proxy that would point back at itself");
                return;
            }
        }
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = source;
    }

    /// Whether both handles share the same underlying state.
    pub fn same_as(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.source, &other.source)
    }

    fn reaches(&self, target: &Clock) -> bool {
        if self.same_as(target) {
            return true;
        }
        let source = self
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match source {
            TimeSource::Proxy(next) => next.reaches(target),
            _ => false,
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = self.source.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Clock").field("source", &*source).finish()
    }
}

fn system_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}
