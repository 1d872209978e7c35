use std::time::{Duration, Instant};

/// Absolute expiry for one socket operation, derived once per call from the
/// configured timeout in seconds.
///
/// A non-positive timeout has no expiry: blocking mode delegates waiting to
/// the kernel, non-blocking mode never waits at all.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Deadline {
    expires: Option<Instant>,
}

impl Deadline {
    /// Starts the deadline for an operation configured with `timeout` seconds.
    pub(crate) fn start(timeout: f64) -> Self {
        let expires = if timeout > 0.0 {
            Some(Instant::now() + Duration::from_secs_f64(timeout))
        } else {
            None
        };
        Self { expires }
    }

    /// Time left until expiry. `None` means unbounded.
    pub(crate) fn remaining(&self) -> Option<Duration> {
        self.expires
            .map(|at| at.saturating_duration_since(Instant::now()))
    }
}
