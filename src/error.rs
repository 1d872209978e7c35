/// Errors raised by socket setup and I/O operations.
///
/// `Timeout`, `Closed` and `Invalid` are the conditions callers branch on;
/// the remaining variants carry the errno of the failing syscall.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("operation timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("invalid argument: {reason}")]
    Invalid { reason: &'static str },

    #[error("socket() failed: {}", errno_to_str(*.errno))]
    Create { errno: i32 },

    #[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("accept() failed: {}", errno_to_str(*.errno))]
    Accept { errno: i32 },

    #[error("poll() failed: {}", errno_to_str(*.errno))]
    Poll { errno: i32 },

    #[error("recv() failed: {}", errno_to_str(*.errno))]
    Recv { errno: i32 },

    #[error("send() failed: {}", errno_to_str(*.errno))]
    Send { errno: i32 },

    #[error("shutdown() failed: {}", errno_to_str(*.errno))]
    Shutdown { errno: i32 },

    #[error("close() failed: {}", errno_to_str(*.errno))]
    Close { errno: i32 },

    #[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
    GetOption { errno: i32, option: &'static str },

    #[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
    SetOption { errno: i32, option: &'static str },
}

/// Terminal outcome of a buffered read: the error plus whatever bytes had
/// already been received before it struck.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ReadError {
    pub partial: Vec<u8>,
    pub error: Error,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
    match errno {
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EINPROGRESS => "operation in progress".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EISCONN => "already connected".into(),
        libc::EMFILE => "too many open files".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN => std::io::ErrorKind::WouldBlock,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Timeout => std::io::ErrorKind::TimedOut,
            Error::Closed => std::io::ErrorKind::ConnectionReset,
            Error::Invalid { .. } => std::io::ErrorKind::InvalidInput,
            Error::Create { errno }
            | Error::Bind { errno, .. }
            | Error::Listen { errno, .. }
            | Error::Connect { errno, .. }
            | Error::Accept { errno }
            | Error::Poll { errno }
            | Error::Recv { errno }
            | Error::Send { errno }
            | Error::Shutdown { errno }
            | Error::Close { errno }
            | Error::GetOption { errno, .. }
            | Error::SetOption { errno, .. } => errno_to_kind(*errno),
        };
        std::io::Error::new(kind, err)
    }
}

impl From<ReadError> for std::io::Error {
    fn from(err: ReadError) -> Self {
        err.error.into()
    }
}
