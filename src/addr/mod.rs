//! Address families and related types.
//!
//! Three families are supported:
//! - `Ipv4` — Internet Protocol version 4
//! - `Ipv6` — Internet Protocol version 6
//! - `Unix` — Unix domain sockets (local only)
//!
//! The socket layer treats addresses as opaque `ToSockAddr` inputs; name
//! resolution is out of scope and addresses are built from numeric parts or
//! filesystem paths.

mod ipv4;
mod ipv6;
mod unix;
pub use self::ipv4::{Ipv4, SocketAddrV4};
pub use self::ipv6::{Ipv6, SocketAddrV6};
pub use self::unix::{Unix, UnixAddr};

/// Trait for address family markers.
///
/// Each implementor names the native address type for its family and the
/// constant passed to the `socket()` syscall.
pub trait Domain {
    type Addr;
    fn raw() -> libc::c_int;
}

/// Trait for address types that can be converted to raw sockaddr for syscalls.
pub trait ToSockAddr {
    /// Calls the provided closure with a pointer to the raw sockaddr and its
    /// size. Returns None if the address is invalid (e.g., path too long for
    /// Unix). The closure pattern keeps the stack-allocated sockaddr alive
    /// for the duration of the syscall.
    fn with_raw<F, R>(&self, f: F) -> Option<R>
    where
        F: FnOnce(*const libc::sockaddr, libc::socklen_t) -> R;
}

/// Trait for address types that can be created from raw sockaddr.
pub trait FromSockAddr: Sized {
    /// Creates address from raw sockaddr storage.
    ///
    /// # Safety
    /// The sockaddr must be of the correct family for this type.
    unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self>;
}

impl FromSockAddr for SocketAddrV4 {
    unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
        if len < std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t {
            return None;
        }
        let raw = unsafe { &*(addr as *const libc::sockaddr_in) };
        Some(Self::from_raw(raw))
    }
}

impl FromSockAddr for SocketAddrV6 {
    unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
        if len < std::mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t {
            return None;
        }
        let raw = unsafe { &*(addr as *const libc::sockaddr_in6) };
        Some(Self::from_raw(raw))
    }
}

impl FromSockAddr for UnixAddr {
    unsafe fn from_sockaddr(addr: *const libc::sockaddr, len: libc::socklen_t) -> Option<Self> {
        if len < std::mem::size_of::<libc::sa_family_t>() as libc::socklen_t {
            return None;
        }
        let raw = unsafe { &*(addr as *const libc::sockaddr_un) };
        Some(Self::from_raw(raw))
    }
}
