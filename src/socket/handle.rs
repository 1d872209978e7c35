use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd};

use tracing::{debug, trace};

use crate::addr::ToSockAddr;
use crate::deadline::Deadline;
use crate::error::{Error, errno};
use crate::poll::{Event, Readiness, wait_fd};

/// Descriptor ownership plus the configured timeout, shared by the stream
/// and datagram variants.
///
/// `fd == None` is the closed sentinel: operations on an invalidated handle
/// report `Error::Closed` instead of touching a stale descriptor. The OS
/// blocking flag is rederived from the timeout's sign whenever it changes —
/// blocking for negative timeouts, non-blocking otherwise.
#[derive(Debug)]
pub(crate) struct Handle {
    fd: Option<OwnedFd>,
    timeout: f64,
}

impl Handle {
    /// Creates the descriptor for `family`/`ty`, enables address reuse, and
    /// applies the initial blocking mode. Sockets start in blocking mode
    /// (timeout -1).
    pub(crate) fn open(family: libc::c_int, ty: libc::c_int) -> Result<Self, Error> {
        crate::init();

        let fd = unsafe { libc::socket(family, ty | libc::SOCK_CLOEXEC, 0) };
        if fd == -1 {
            return Err(Error::Create { errno: errno() });
        }
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };

        let on: libc::c_int = 1;
        let ret = unsafe {
            libc::setsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &on as *const _ as *const libc::c_void,
                std::mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret == -1 {
            return Err(Error::SetOption {
                errno: errno(),
                option: "SO_REUSEADDR",
            });
        }

        let handle = Self {
            fd: Some(fd),
            timeout: -1.0,
        };
        handle.apply_blocking()?;
        trace!(fd = handle.raw(), "socket created");
        Ok(handle)
    }

    /// Wraps a descriptor produced by accept(2). Accepted sockets start in
    /// blocking mode with no timeout of their own.
    pub(crate) fn adopt(fd: OwnedFd) -> Self {
        Self {
            fd: Some(fd),
            timeout: -1.0,
        }
    }

    /// The raw descriptor, or -1 when closed.
    pub(crate) fn raw(&self) -> libc::c_int {
        self.fd.as_ref().map_or(-1, |fd| fd.as_raw_fd())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.fd.is_none()
    }

    pub(crate) fn timeout(&self) -> f64 {
        self.timeout
    }

    /// True when configured for a single attempt with no waiting.
    pub(crate) fn is_nonblocking(&self) -> bool {
        self.timeout == 0.0
    }

    /// Deadline for one operation under the current timeout configuration.
    pub(crate) fn deadline(&self) -> Deadline {
        Deadline::start(self.timeout)
    }

    /// Sets the timeout in seconds and rederives the blocking flag:
    /// `< 0` blocking, `0` non-blocking, `> 0` timeout mode.
    pub(crate) fn set_timeout(&mut self, secs: f64) -> Result<(), Error> {
        self.timeout = secs;
        if self.fd.is_some() {
            self.apply_blocking()
        } else {
            Ok(())
        }
    }

    fn apply_blocking(&self) -> Result<(), Error> {
        let fd = self.raw();
        let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
        if flags == -1 {
            return Err(Error::GetOption {
                errno: errno(),
                option: "F_GETFL",
            });
        }
        let new_flags = if self.timeout < 0.0 {
            flags & !libc::O_NONBLOCK
        } else {
            flags | libc::O_NONBLOCK
        };
        if unsafe { libc::fcntl(fd, libc::F_SETFL, new_flags) } == -1 {
            return Err(Error::SetOption {
                errno: errno(),
                option: "O_NONBLOCK",
            });
        }
        Ok(())
    }

    /// Waits for readiness against the deadline. Non-positive timeouts and
    /// closed descriptors report ready without polling.
    pub(crate) fn wait(&self, event: Event, deadline: &Deadline) -> Result<Readiness, Error> {
        wait_fd(self.raw(), self.timeout, event, deadline)
    }

    /// Closes the descriptor, surfacing the close(2) error. Idempotent.
    pub(crate) fn close(&mut self) -> Result<(), Error> {
        if let Some(fd) = self.fd.take() {
            trace!(fd = fd.as_raw_fd(), "closing socket");
            let raw = fd.into_raw_fd();
            if unsafe { libc::close(raw) } != 0 {
                return Err(Error::Close { errno: errno() });
            }
        }
        Ok(())
    }

    /// Close on a failure path, where the original error wins.
    pub(crate) fn invalidate(&mut self) {
        let _ = self.close();
    }

    /// Reads and clears the pending socket error (`SO_ERROR`).
    fn take_error(&self) -> Result<libc::c_int, Error> {
        let mut err: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;

        let ret = unsafe {
            libc::getsockopt(
                self.raw(),
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut err as *mut _ as *mut libc::c_void,
                &mut len,
            )
        };
        if ret == -1 {
            return Err(Error::GetOption {
                errno: errno(),
                option: "SO_ERROR",
            });
        }
        Ok(err)
    }

    /// Completes a connect attempt under the configured timeout.
    ///
    /// An `EINPROGRESS` result with a positive timeout waits for readiness
    /// in either direction, then reads the real outcome from `SO_ERROR`;
    /// `EISCONN` there counts as connected. Every failure — timeout, wait
    /// error, or connect error — closes and invalidates the handle, so the
    /// caller must not reuse it afterwards.
    pub(crate) fn connect<A>(&mut self, addr: &A) -> Result<(), Error>
    where
        A: ToSockAddr + std::fmt::Display,
    {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.deadline();

        let ret = addr.with_raw(|ptr, len| unsafe { libc::connect(self.raw(), ptr, len) });
        let Some(ret) = ret else {
            return Err(Error::Invalid {
                reason: "address too long",
            });
        };
        let mut err = if ret == 0 { 0 } else { errno() };

        if self.timeout > 0.0 && err == libc::EINPROGRESS {
            match self.wait(Event::Any, &deadline) {
                Ok(Readiness::TimedOut) => {
                    debug!(fd = self.raw(), peer = %addr, "connect timed out");
                    self.invalidate();
                    return Err(Error::Timeout);
                }
                Ok(Readiness::Ready) => match self.take_error() {
                    Ok(pending) => {
                        err = if pending == libc::EISCONN { 0 } else { pending };
                    }
                    Err(e) => {
                        self.invalidate();
                        return Err(e);
                    }
                },
                Err(e) => {
                    self.invalidate();
                    return Err(e);
                }
            }
        }

        if err != 0 {
            debug!(fd = self.raw(), peer = %addr, errno = err, "connect failed");
            self.invalidate();
            return Err(Error::Connect {
                errno: err,
                addr: addr.to_string(),
            });
        }

        debug!(fd = self.raw(), peer = %addr, "connected");
        Ok(())
    }

    /// Disables one or both directions of the connection.
    pub(crate) fn shutdown(&self, how: libc::c_int) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        if unsafe { libc::shutdown(self.raw(), how) } == -1 {
            return Err(Error::Shutdown { errno: errno() });
        }
        Ok(())
    }
}
