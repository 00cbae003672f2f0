//! Socket and fd utilities
//!
//! Thin wrappers over the libc calls the server needs: listener setup,
//! fd flags, and the two buffered drain helpers every connection uses.
//! The drain helpers follow non-blocking discipline: `EAGAIN` ends the
//! drain without being an error, `EINTR` retries, and a `read` of zero
//! reports peer close.

use crate::error::{NetError, NetResult};
use std::os::unix::io::RawFd;
use std::sync::Once;

/// Chunk size for draining a socket into the inbound buffer.
const MAX_BUFF: usize = 4096;

/// The calling thread's current errno.
#[inline]
pub fn last_errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Set `O_NONBLOCK` on an fd.
pub fn set_nonblocking(fd: RawFd) -> Result<(), i32> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_errno());
    }
    let ret = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if ret < 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// Disable Nagle's algorithm so small responses go out immediately.
pub fn set_nodelay(fd: RawFd) {
    let opt: libc::c_int = 1;
    unsafe {
        libc::setsockopt(
            fd,
            libc::IPPROTO_TCP,
            libc::TCP_NODELAY,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        );
    }
}

/// Create, bind, and listen an IPv4 TCP socket on `INADDR_ANY:port`.
///
/// `SO_REUSEADDR` is set so restarts do not trip over `TIME_WAIT`
/// sockets. The listen backlog is 2048. The fd is returned blocking;
/// callers set non-blocking mode themselves before registering it.
pub fn socket_bind_listen(port: u16) -> NetResult<RawFd> {
    let fd = unsafe { libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
    if fd < 0 {
        return Err(NetError::last_os());
    }

    let opt: libc::c_int = 1;
    let ret = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &opt as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = NetError::last_os();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    addr.sin_family = libc::AF_INET as libc::sa_family_t;
    addr.sin_addr.s_addr = libc::INADDR_ANY.to_be();
    addr.sin_port = port.to_be();

    let ret = unsafe {
        libc::bind(
            fd,
            &addr as *const _ as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
        )
    };
    if ret < 0 {
        let err = NetError::last_os();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    if unsafe { libc::listen(fd, 2048) } < 0 {
        let err = NetError::last_os();
        unsafe { libc::close(fd) };
        return Err(err);
    }

    Ok(fd)
}

/// Port a bound socket actually landed on (meaningful after binding
/// port 0 to get an ephemeral port).
pub fn local_port(fd: RawFd) -> NetResult<u16> {
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    let ret = unsafe {
        libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len)
    };
    if ret < 0 {
        return Err(NetError::last_os());
    }
    Ok(u16::from_be(addr.sin_port))
}

static SIGPIPE_ONCE: Once = Once::new();

/// Ignore SIGPIPE process-wide, exactly once.
///
/// A write to a half-closed peer then fails with `EPIPE` instead of
/// killing the process.
pub fn ignore_sigpipe() {
    SIGPIPE_ONCE.call_once(|| unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = libc::SIG_IGN;
        libc::sigaction(libc::SIGPIPE, &sa, std::ptr::null_mut());
    });
}

/// Drain a non-blocking fd into `buf` until it would block.
///
/// Returns `(total_read, peer_closed)`. `total_read` is `-1` only for a
/// real socket error; `EAGAIN` ends the drain with whatever was read and
/// `EINTR` retries. A `read` of zero sets `peer_closed` and stops.
pub fn read_to_buf(fd: RawFd, buf: &mut Vec<u8>) -> (isize, bool) {
    let mut total: isize = 0;
    let mut chunk = [0u8; MAX_BUFF];
    loop {
        let n = unsafe { libc::read(fd, chunk.as_mut_ptr() as *mut libc::c_void, MAX_BUFF) };
        if n < 0 {
            let errno = last_errno();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                return (total, false);
            }
            return (-1, false);
        }
        if n == 0 {
            return (total, true);
        }
        buf.extend_from_slice(&chunk[..n as usize]);
        total += n;
    }
}

/// Write as much of `buf` as the socket will take.
///
/// Written bytes are removed from the front of `buf`; on `EAGAIN` the
/// tail stays for the next write-readiness event. Returns the number of
/// bytes written, or `-1` on a real socket error.
pub fn write_from_buf(fd: RawFd, buf: &mut Vec<u8>) -> isize {
    let mut written: usize = 0;
    while written < buf.len() {
        let n = unsafe {
            libc::write(
                fd,
                buf[written..].as_ptr() as *const libc::c_void,
                buf.len() - written,
            )
        };
        if n < 0 {
            let errno = last_errno();
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                break;
            }
            return -1;
        }
        written += n as usize;
    }
    if written == buf.len() {
        buf.clear();
    } else {
        buf.drain(..written);
    }
    written as isize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nonblocking_pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
        assert_eq!(ret, 0);
        set_nonblocking(fds[0]).unwrap();
        set_nonblocking(fds[1]).unwrap();
        (fds[0], fds[1])
    }

    #[test]
    fn test_read_to_buf_drains_until_eagain() {
        let (r, w) = nonblocking_pipe();
        let payload = b"hello webd";
        let n = unsafe { libc::write(w, payload.as_ptr() as *const libc::c_void, payload.len()) };
        assert_eq!(n as usize, payload.len());

        let mut buf = Vec::new();
        let (total, closed) = read_to_buf(r, &mut buf);
        assert_eq!(total as usize, payload.len());
        assert!(!closed);
        assert_eq!(&buf, payload);

        // Nothing more available: zero bytes, not closed, not an error.
        let (total, closed) = read_to_buf(r, &mut buf);
        assert_eq!(total, 0);
        assert!(!closed);

        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn test_read_to_buf_reports_peer_close() {
        let (r, w) = nonblocking_pipe();
        unsafe { libc::close(w) };
        let mut buf = Vec::new();
        let (total, closed) = read_to_buf(r, &mut buf);
        assert_eq!(total, 0);
        assert!(closed);
        unsafe { libc::close(r) };
    }

    #[test]
    fn test_write_from_buf_consumes_written_prefix() {
        let (r, w) = nonblocking_pipe();
        let mut out = b"response bytes".to_vec();
        let n = write_from_buf(w, &mut out);
        assert_eq!(n, 14);
        assert!(out.is_empty());

        let mut buf = Vec::new();
        let (total, _) = read_to_buf(r, &mut buf);
        assert_eq!(total, 14);
        assert_eq!(&buf, b"response bytes");

        unsafe {
            libc::close(r);
            libc::close(w);
        }
    }

    #[test]
    fn test_socket_bind_listen_ephemeral() {
        let fd = socket_bind_listen(0).unwrap();
        let port = local_port(fd).unwrap();
        assert!(port > 0);
        unsafe { libc::close(fd) };
    }
}
