pub mod socket;
mod addr;
mod buffer;
mod deadline;
mod error;
mod poll;

pub use self::addr::{
    Domain, FromSockAddr, Ipv4, Ipv6, SocketAddrV4, SocketAddrV6, ToSockAddr, Unix, UnixAddr,
};
pub use self::error::{Error, ReadError, Result, errno};
pub use self::socket::{DatagramSocket, ReadUntil, Shutdown, StreamSocket};

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the process-wide SIGPIPE suppression so that writes to a closed
/// peer surface as errors instead of terminating the process.
///
/// Runs at most once no matter how often it is called; socket creation
/// invokes it implicitly, so calling it by hand is only needed when raw
/// descriptors are used before the first socket exists.
pub fn init() {
    INIT.call_once(|| unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    });
}
