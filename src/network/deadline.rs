//! Deadline
//!
//! One absolute deadline per `read`/`flush` call. Every socket attempt gets
//! only what is left of it, so repeated short waits cannot add up past the
//! configured timeout.

use std::time::{Duration, Instant};

/// Time left before a deadline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Budget {
    /// No timeout configured
    Unbounded,

    /// Wait at most this long
    Remaining(Duration),

    Expired,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// Deadline `timeout` from now; `None`, or a timeout too large to
    /// represent, never expires
    pub(crate) fn after(timeout: Option<Duration>) -> Self {
        Self {
            at: timeout.and_then(|timeout| Instant::now().checked_add(timeout)),
        }
    }

    pub(crate) fn remaining(&self) -> Budget {
        match self.at {
            None => Budget::Unbounded,
            Some(at) => match at.checked_duration_since(Instant::now()) {
                Some(left) if !left.is_zero() => Budget::Remaining(left),
                _ => Budget::Expired,
            },
        }
    }
}
