//! Error types for socket setup and configuration

use core::fmt;

/// Result type for socket/reactor setup operations
pub type NetResult<T> = Result<T, NetError>;

/// Errors that can occur while setting up sockets, pollers, or reactors.
///
/// Hot-path I/O does not use this type — reads and writes report raw
/// byte counts with `-1` + errno like the syscalls they wrap, because a
/// short read or `EAGAIN` is flow control, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// An OS call failed; payload is the errno value
    Os(i32),

    /// Port outside the usable range
    InvalidPort(i64),

    /// Configuration rejected by validation
    Config(&'static str),
}

impl NetError {
    /// Capture the calling thread's current errno.
    #[inline]
    pub fn last_os() -> Self {
        NetError::Os(crate::util::last_errno())
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Os(errno) => write!(f, "os error (errno {})", errno),
            NetError::InvalidPort(p) => write!(f, "invalid port: {}", p),
            NetError::Config(msg) => write!(f, "bad configuration: {}", msg),
        }
    }
}

impl std::error::Error for NetError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = NetError::Os(98);
        assert_eq!(format!("{}", e), "os error (errno 98)");

        let e = NetError::InvalidPort(70000);
        assert_eq!(format!("{}", e), "invalid port: 70000");

        let e = NetError::Config("workers must be at least 1");
        assert_eq!(
            format!("{}", e),
            "bad configuration: workers must be at least 1"
        );
    }
}
