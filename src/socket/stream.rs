use std::marker::PhantomData;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tracing::trace;

use crate::addr::{Domain, FromSockAddr, ToSockAddr};
use crate::buffer::StreamBuffer;
use crate::error::{Error, ReadError, Result, errno};
use crate::poll::{Event, Readiness};

use super::handle::Handle;
use super::scanner::ReadUntil;
use super::{RECV_CHUNK, SEND_CHUNK, Shutdown, query_addr};

/// A stream-oriented socket with deadline-governed operations.
///
/// One value owns one descriptor, the configured timeout, and a lazily
/// created accumulation buffer. The timeout set through [`set_timeout`]
/// selects the operating mode for every subsequent call:
///
/// - `< 0` — blocking: operations block until the kernel completes them.
/// - `0` — non-blocking: a single attempt, no waiting.
/// - `> 0` — timeout mode: operations fail with [`Error::Timeout`] when not
///   completed within that many seconds.
///
/// Operations take `&mut self`; one socket serves one caller at a time.
///
/// [`set_timeout`]: StreamSocket::set_timeout
#[derive(Debug)]
pub struct StreamSocket<D: Domain> {
    handle: Handle,
    buf: Option<StreamBuffer>,
    _marker: PhantomData<D>,
}

impl<D: Domain> StreamSocket<D> {
    /// Creates a stream socket for the domain. Starts in blocking mode.
    pub fn new() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(D::raw(), libc::SOCK_STREAM)?,
            buf: None,
            _marker: PhantomData,
        })
    }

    fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            buf: None,
            _marker: PhantomData,
        }
    }

    /// Splits the socket into its handle and (lazily created) buffer.
    pub(crate) fn parts(&mut self) -> (&mut Handle, &mut StreamBuffer) {
        let buf = self
            .buf
            .get_or_insert_with(|| StreamBuffer::with_capacity(RECV_CHUNK));
        (&mut self.handle, buf)
    }

    /// Sets the timeout in seconds: `< 0` blocking, `0` non-blocking,
    /// `> 0` timeout mode.
    pub fn set_timeout(&mut self, secs: f64) -> Result<()> {
        self.handle.set_timeout(secs)
    }

    /// The configured timeout in seconds. Negative means blocking.
    pub fn timeout(&self) -> f64 {
        self.handle.timeout()
    }

    /// The raw descriptor, or -1 when closed.
    pub fn as_raw_fd(&self) -> RawFd {
        self.handle.raw()
    }

    /// Connects to a remote or local-domain peer under the configured
    /// timeout. On any failure the socket is closed and must not be reused.
    pub fn connect(&mut self, addr: &D::Addr) -> Result<()>
    where
        D::Addr: ToSockAddr + std::fmt::Display,
    {
        self.handle.connect(addr)
    }

    /// Binds the socket to a local address.
    pub fn bind(&mut self, addr: &D::Addr) -> Result<()>
    where
        D::Addr: ToSockAddr + std::fmt::Display,
    {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let ret = addr.with_raw(|ptr, len| unsafe { libc::bind(self.handle.raw(), ptr, len) });
        match ret {
            Some(0) => Ok(()),
            Some(_) => Err(Error::Bind {
                errno: errno(),
                addr: addr.to_string(),
            }),
            None => Err(Error::Invalid {
                reason: "address too long",
            }),
        }
    }

    /// Starts listening for connections. A negative backlog is clamped to
    /// zero for systems that reject it.
    pub fn listen(&mut self, backlog: i32) -> Result<()> {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let backlog = backlog.max(0);
        if unsafe { libc::listen(self.handle.raw(), backlog) } == -1 {
            return Err(Error::Listen {
                errno: errno(),
                backlog,
            });
        }
        Ok(())
    }

    /// Accepts one pending connection, waiting for read-readiness first
    /// when a positive timeout is configured.
    ///
    /// The accepted socket starts in blocking mode with no timeout of its
    /// own.
    pub fn accept(&mut self) -> Result<StreamSocket<D>> {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.handle.deadline();
        match self.handle.wait(Event::Readable, &deadline)? {
            Readiness::TimedOut => return Err(Error::Timeout),
            Readiness::Ready => {}
        }

        loop {
            let fd = unsafe {
                libc::accept4(
                    self.handle.raw(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    libc::SOCK_CLOEXEC,
                )
            };
            if fd == -1 {
                let e = errno();
                if e == libc::EINTR {
                    continue;
                }
                return Err(Error::Accept { errno: e });
            }
            trace!(listener = self.handle.raw(), fd, "accepted connection");
            let fd = unsafe { OwnedFd::from_raw_fd(fd) };
            return Ok(StreamSocket::from_handle(Handle::adopt(fd)));
        }
    }

    /// Sends all of `data`, waiting for write-readiness before each partial
    /// send and capping each send(2) at 8 KiB.
    ///
    /// On success the returned count always equals `data.len()`. On error
    /// only the error is reported; bytes already handed to the kernel before
    /// the failure are not counted back. A broken pipe surfaces as
    /// [`Error::Closed`].
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.handle.deadline();
        let mut sent = 0;

        while sent < data.len() {
            match self.handle.wait(Event::Writable, &deadline)? {
                Readiness::TimedOut => return Err(Error::Timeout),
                Readiness::Ready => {}
            }

            let chunk = (data.len() - sent).min(SEND_CHUNK);
            let n = unsafe {
                libc::send(
                    self.handle.raw(),
                    data[sent..].as_ptr() as *const libc::c_void,
                    chunk,
                    0,
                )
            };
            if n < 0 {
                let e = errno();
                match e {
                    libc::EINTR => continue,
                    libc::EAGAIN if !self.handle.is_nonblocking() => continue,
                    libc::EPIPE => return Err(Error::Closed),
                    _ => return Err(Error::Send { errno: e }),
                }
            }
            sent += n as usize;
        }

        debug_assert_eq!(sent, data.len());
        Ok(sent)
    }

    /// Reads exactly `size` bytes through the stream buffer.
    ///
    /// Bytes already buffered satisfy the request without touching the
    /// socket. On timeout, peer close, or an OS error, whatever was buffered
    /// so far is returned inside the [`ReadError`].
    pub fn read_exact(&mut self, size: usize) -> Result<Vec<u8>, ReadError> {
        let (handle, buf) = self.parts();
        if handle.is_closed() {
            return Err(ReadError {
                partial: buf.take_unread(),
                error: Error::Closed,
            });
        }
        let deadline = handle.deadline();

        loop {
            if buf.size() >= size {
                return Ok(buf.take_front(size));
            }

            match handle.wait(Event::Readable, &deadline) {
                Ok(Readiness::Ready) => {}
                Ok(Readiness::TimedOut) => {
                    return Err(ReadError {
                        partial: buf.take_unread(),
                        error: Error::Timeout,
                    });
                }
                Err(e) => {
                    return Err(ReadError {
                        partial: buf.take_unread(),
                        error: e,
                    });
                }
            }

            match recv_step(handle, buf) {
                Ok(RecvStep::Data) => {}
                Ok(RecvStep::Retry) => {}
                Ok(RecvStep::Eof) => {
                    return Err(ReadError {
                        partial: buf.take_unread(),
                        error: Error::Closed,
                    });
                }
                Err(e) => {
                    return Err(ReadError {
                        partial: buf.take_unread(),
                        error: e,
                    });
                }
            }
        }
    }

    /// Returns a scanner producing delimiter-bounded chunks.
    ///
    /// Each [`ReadUntil::next_chunk`] call yields the bytes up to the next
    /// occurrence of `pattern`, including the delimiter when `inclusive`.
    /// The scanner borrows the socket mutably for its lifetime, so it cannot
    /// be shared or outlive other use of the socket.
    pub fn read_until(
        &mut self,
        pattern: impl Into<Vec<u8>>,
        inclusive: bool,
    ) -> Result<ReadUntil<'_, D>> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(Error::Invalid {
                reason: "empty delimiter pattern",
            });
        }
        Ok(ReadUntil::new(self, pattern, inclusive))
    }

    /// Disables further sends, receives, or both.
    pub fn shutdown(&mut self, how: Shutdown) -> Result<()> {
        self.handle.shutdown(how.raw())
    }

    /// Closes the socket and releases its buffer. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.buf = None;
        self.handle.close()
    }

    /// Returns the address of the local endpoint.
    pub fn local_addr(&self) -> Result<D::Addr>
    where
        D::Addr: FromSockAddr,
    {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        query_addr(self.handle.raw(), "getsockname", libc::getsockname)
    }

    /// Returns the address of the remote endpoint.
    pub fn peer_addr(&self) -> Result<D::Addr>
    where
        D::Addr: FromSockAddr,
    {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        query_addr(self.handle.raw(), "getpeername", libc::getpeername)
    }
}

/// Outcome of one receive into the stream buffer.
pub(crate) enum RecvStep {
    /// Bytes were appended past the write cursor.
    Data,
    /// Zero-length receive: the peer closed the connection.
    Eof,
    /// Interrupted or would-block; wait for readiness again.
    Retry,
}

/// Grows the buffer to keep a full receive chunk of spare capacity, then
/// performs one recv(2) into the tail.
///
/// `EINTR` always retries. Would-block retries except in non-blocking mode,
/// where the single attempt has been spent and the error surfaces.
pub(crate) fn recv_step(handle: &Handle, buf: &mut StreamBuffer) -> Result<RecvStep> {
    if buf.available() < RECV_CHUNK {
        buf.grow(RECV_CHUNK - buf.available());
    }

    let spare = buf.spare_mut();
    let n = unsafe {
        libc::recv(
            handle.raw(),
            spare.as_mut_ptr() as *mut libc::c_void,
            RECV_CHUNK,
            0,
        )
    };

    if n > 0 {
        buf.advance_write(n as usize);
        Ok(RecvStep::Data)
    } else if n == 0 {
        Ok(RecvStep::Eof)
    } else {
        match errno() {
            libc::EINTR => Ok(RecvStep::Retry),
            libc::EAGAIN if !handle.is_nonblocking() => Ok(RecvStep::Retry),
            e => Err(Error::Recv { errno: e }),
        }
    }
}
