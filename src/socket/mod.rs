mod datagram;
mod handle;
mod scanner;
mod stream;

pub use self::datagram::DatagramSocket;
pub use self::scanner::ReadUntil;
pub use self::stream::StreamSocket;

use crate::addr::FromSockAddr;
use crate::error::{Error, errno};

/// Cap on a single send(2) inside the write loop, bounding per-call latency.
pub(crate) const SEND_CHUNK: usize = 8192;

/// Receive chunk size: the stream buffer is grown so at least this much
/// spare capacity exists before every recv(2).
pub(crate) const RECV_CHUNK: usize = 8192;

/// Which half of the connection shutdown(2) disables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shutdown {
    /// Further receives are disallowed.
    Read,
    /// Further sends are disallowed.
    Write,
    /// Both directions.
    Both,
}

impl Shutdown {
    pub(crate) fn raw(self) -> libc::c_int {
        match self {
            Shutdown::Read => libc::SHUT_RD,
            Shutdown::Write => libc::SHUT_WR,
            Shutdown::Both => libc::SHUT_RDWR,
        }
    }
}

/// Queries a socket name through getsockname(2) or getpeername(2) and
/// decodes it into the domain's address type.
pub(crate) fn query_addr<A: FromSockAddr>(
    fd: libc::c_int,
    option: &'static str,
    f: unsafe extern "C" fn(libc::c_int, *mut libc::sockaddr, *mut libc::socklen_t) -> libc::c_int,
) -> Result<A, Error> {
    let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

    let ret = unsafe { f(fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len) };
    if ret == -1 {
        return Err(Error::GetOption {
            errno: errno(),
            option,
        });
    }

    unsafe { A::from_sockaddr(&storage as *const _ as *const libc::sockaddr, len) }.ok_or(
        Error::Invalid {
            reason: "unsupported address family",
        },
    )
}
