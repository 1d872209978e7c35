use crate::deadline::Deadline;
use crate::error::{Error, errno};

/// Event mask for a single-descriptor readiness wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Event {
    Readable,
    Writable,
    /// Either direction — used while completing a connect attempt.
    Any,
}

impl Event {
    fn poll_mask(self) -> libc::c_short {
        match self {
            Event::Readable => libc::POLLIN,
            Event::Writable => libc::POLLOUT,
            Event::Any => libc::POLLIN | libc::POLLOUT,
        }
    }
}

/// Outcome of a readiness wait that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Readiness {
    Ready,
    TimedOut,
}

/// Polls one descriptor until it is ready for `event` or the deadline passes.
///
/// Sockets configured with a non-positive timeout skip the poll entirely, as
/// does a closed descriptor — the syscall that follows reports the real
/// outcome. An elapsed deadline short-circuits to `TimedOut` without
/// polling. `EINTR` is retried with the time already spent still charged
/// against the deadline.
pub(crate) fn wait_fd(
    fd: libc::c_int,
    timeout: f64,
    event: Event,
    deadline: &Deadline,
) -> Result<Readiness, Error> {
    if timeout <= 0.0 || fd < 0 {
        return Ok(Readiness::Ready);
    }

    let mut pollfd = libc::pollfd {
        fd,
        events: event.poll_mask(),
        revents: 0,
    };

    loop {
        let left = match deadline.remaining() {
            Some(left) if !left.is_zero() => left,
            _ => return Ok(Readiness::TimedOut),
        };
        let ms = left.as_millis().min(i32::MAX as u128) as libc::c_int;

        let ret = unsafe { libc::poll(&mut pollfd, 1, ms) };
        if ret == -1 {
            let e = errno();
            if e == libc::EINTR {
                continue;
            }
            return Err(Error::Poll { errno: e });
        }
        return if ret == 0 {
            Ok(Readiness::TimedOut)
        } else {
            Ok(Readiness::Ready)
        };
    }
}
