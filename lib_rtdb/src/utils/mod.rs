//! General helpers shared by the protocol layers.

/// A swappable millisecond clock used for timestamps and token windows.
pub mod clock;

pub use clock::{Clock, TimeFn, TimeSource};
