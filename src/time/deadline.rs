//! The [`Deadline`] type.

use std::time::{Duration, Instant};

/// An absolute point on the monotonic clock, or "never".
///
/// A `Deadline` is captured once and carried through a wait loop; every
/// retry computes the remaining budget from the same expiry, so spurious
/// wake-ups never extend the total wait.
///
/// # Example
///
/// ```
/// use uipool::Deadline;
///
/// let deadline = Deadline::from_millis(50);
/// assert!(!deadline.is_elapsed());
/// assert!(Deadline::INFINITE.remaining().is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// The deadline that never elapses.
    pub const INFINITE: Self = Self { at: None };

    /// Returns the deadline that never elapses.
    #[must_use]
    pub const fn infinite() -> Self {
        Self::INFINITE
    }

    /// Returns a deadline `millis` milliseconds from now.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self::after(Duration::from_millis(millis))
    }

    /// Returns a deadline `duration` from now.
    ///
    /// A duration too large to represent saturates to [`Self::INFINITE`].
    #[must_use]
    pub fn after(duration: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(duration),
        }
    }

    /// Returns true if the deadline has passed.
    #[must_use]
    pub fn is_elapsed(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Returns true for the infinite deadline.
    #[must_use]
    pub const fn is_infinite(&self) -> bool {
        self.at.is_none()
    }

    /// Returns the time left until expiry, `None` for an infinite deadline.
    ///
    /// An elapsed deadline reports `Some(Duration::ZERO)`.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns the remaining whole milliseconds, `None` for infinite.
    #[must_use]
    pub fn remaining_millis(&self) -> Option<u64> {
        self.remaining()
            .map(|rem| u64::try_from(rem.as_millis()).unwrap_or(u64::MAX))
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::INFINITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn infinite_never_elapses() {
        let deadline = Deadline::infinite();
        assert!(!deadline.is_elapsed());
        assert!(deadline.is_infinite());
        assert_eq!(deadline.remaining(), None);
        assert_eq!(deadline.remaining_millis(), None);
    }

    #[test]
    fn zero_deadline_is_elapsed() {
        let deadline = Deadline::from_millis(0);
        assert!(deadline.is_elapsed());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn deadline_elapses_after_expiry() {
        let deadline = Deadline::from_millis(20);
        assert!(!deadline.is_elapsed());
        thread::sleep(Duration::from_millis(40));
        assert!(deadline.is_elapsed());
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[test]
    fn remaining_is_monotone_against_one_expiry() {
        let deadline = Deadline::from_millis(200);
        let first = deadline.remaining().unwrap();
        thread::sleep(Duration::from_millis(10));
        let second = deadline.remaining().unwrap();
        assert!(second <= first);
    }
}
