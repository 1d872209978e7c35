use std::marker::PhantomData;
use std::os::fd::RawFd;

use crate::addr::{Domain, FromSockAddr, ToSockAddr};
use crate::error::{Error, Result, errno};
use crate::poll::{Event, Readiness};

use super::RECV_CHUNK;
use super::handle::Handle;
use super::query_addr;

/// A datagram-oriented socket with deadline-governed operations.
///
/// Shares the timeout model of [`StreamSocket`]: the configured timeout
/// gates every send and receive through the same readiness wait. Datagram
/// sockets have no stream buffer — each receive delivers one whole datagram
/// and each send is atomic, so there is no partial-transfer loop. `connect`
/// only pins the default peer for `send`/`recv`; no handshake takes place,
/// but a failure still invalidates the handle.
///
/// [`StreamSocket`]: super::StreamSocket
pub struct DatagramSocket<D: Domain> {
    handle: Handle,
    _marker: PhantomData<D>,
}

impl<D: Domain> DatagramSocket<D> {
    /// Creates a datagram socket for the domain. Starts in blocking mode.
    pub fn new() -> Result<Self> {
        Ok(Self {
            handle: Handle::open(D::raw(), libc::SOCK_DGRAM)?,
            _marker: PhantomData,
        })
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

    /// Sets the default peer for `send`/`recv`.
    pub fn connect(&mut self, addr: &D::Addr) -> Result<()>
    where
        D::Addr: ToSockAddr + std::fmt::Display,
    {
        self.handle.connect(addr)
    }

    /// Sends one datagram to the connected peer.
    pub fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.handle.deadline();

        loop {
            match self.handle.wait(Event::Writable, &deadline)? {
                Readiness::TimedOut => return Err(Error::Timeout),
                Readiness::Ready => {}
            }

            let n = unsafe {
                libc::send(
                    self.handle.raw(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    0,
                )
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let e = errno();
            match e {
                libc::EINTR => continue,
                libc::EAGAIN if !self.handle.is_nonblocking() => continue,
                libc::EPIPE => return Err(Error::Closed),
                _ => return Err(Error::Send { errno: e }),
            }
        }
    }

    /// Sends one datagram to a specific address.
    pub fn send_to(&mut self, data: &[u8], addr: &D::Addr) -> Result<usize>
    where
        D::Addr: ToSockAddr,
    {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.handle.deadline();

        loop {
            match self.handle.wait(Event::Writable, &deadline)? {
                Readiness::TimedOut => return Err(Error::Timeout),
                Readiness::Ready => {}
            }

            let ret = addr.with_raw(|ptr, len| unsafe {
                libc::sendto(
                    self.handle.raw(),
                    data.as_ptr() as *const libc::c_void,
                    data.len(),
                    0,
                    ptr,
                    len,
                )
            });
            let Some(n) = ret else {
                return Err(Error::Invalid {
                    reason: "address too long",
                });
            };
            if n >= 0 {
                return Ok(n as usize);
            }
            let e = errno();
            match e {
                libc::EINTR => continue,
                libc::EAGAIN if !self.handle.is_nonblocking() => continue,
                _ => return Err(Error::Send { errno: e }),
            }
        }
    }

    /// Receives one datagram of at most `max` bytes (default chunk size
    /// when zero). Excess datagram bytes are discarded by the kernel.
    pub fn recv(&mut self, max: usize) -> Result<Vec<u8>> {
        self.recv_inner(max).map(|(data, _, _)| data)
    }

    /// Receives one datagram along with its sender address.
    pub fn recv_from(&mut self, max: usize) -> Result<(Vec<u8>, D::Addr)>
    where
        D::Addr: FromSockAddr,
    {
        let (data, storage, len) = self.recv_inner(max)?;
        let addr = unsafe {
            D::Addr::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len)
        }
        .ok_or(Error::Invalid {
            reason: "unsupported address family",
        })?;
        Ok((data, addr))
    }

    fn recv_inner(
        &mut self,
        max: usize,
    ) -> Result<(Vec<u8>, libc::sockaddr_storage, libc::socklen_t)> {
        if self.handle.is_closed() {
            return Err(Error::Closed);
        }
        let deadline = self.handle.deadline();
        let max = if max == 0 { RECV_CHUNK } else { max };
        let mut data = vec![0u8; max];

        loop {
            match self.handle.wait(Event::Readable, &deadline)? {
                Readiness::TimedOut => return Err(Error::Timeout),
                Readiness::Ready => {}
            }

            let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

            let n = unsafe {
                libc::recvfrom(
                    self.handle.raw(),
                    data.as_mut_ptr() as *mut libc::c_void,
                    data.len(),
                    0,
                    &mut storage as *mut _ as *mut libc::sockaddr,
                    &mut len,
                )
            };
            if n >= 0 {
                data.truncate(n as usize);
                return Ok((data, storage, len));
            }
            let e = errno();
            match e {
                libc::EINTR => continue,
                libc::EAGAIN if !self.handle.is_nonblocking() => continue,
                _ => return Err(Error::Recv { errno: e }),
            }
        }
    }

    /// Closes the socket. Idempotent.
    pub fn close(&mut self) -> Result<()> {
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
}
