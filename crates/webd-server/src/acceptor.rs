//! Acceptor — listening socket and connection dispatch
//!
//! Lives in the main reactor. On read readiness it drains `accept4` until
//! the socket would block and hands each new fd to the next worker reactor
//! round-robin as an install task; the connection object itself is built on
//! the worker's thread, so the fd is never registered anywhere before its
//! owning reactor runs the install.

use std::cell::RefCell;
use std::net::Ipv4Addr;
use std::os::unix::io::RawFd;
use std::rc::Rc;
use std::sync::Arc;

use webd_core::error::{NetError, NetResult};
use webd_core::util::{
    ignore_sigpipe, last_errno, local_port, set_nodelay, set_nonblocking, socket_bind_listen,
};
use webd_core::{log_debug, log_error, log_info, log_warn};

use crate::channel::Channel;
use crate::config::ServerConfig;
use crate::connection::Connection;
use crate::mask::{EV_ERR, EV_ET, EV_HUP, EV_IN, EV_READ_MASK};
use crate::pool::ReactorPool;
use crate::reactor::{Reactor, Registered};

pub struct Acceptor {
    listen_fd: RawFd,
    channel: Channel,
    pool: ReactorPool,
    cfg: Arc<ServerConfig>,
}

impl Acceptor {
    pub(crate) fn handle_event(&mut self, r: &Reactor, revents: u32) {
        self.channel.set_revents(revents);
        self.channel.set_events(0);

        if revents & EV_HUP != 0 && revents & EV_IN == 0 {
            return;
        }
        if revents & EV_ERR != 0 {
            log_error!("acceptor: poll error on listen fd {}", self.listen_fd);
            return;
        }
        if revents & EV_READ_MASK != 0 {
            self.accept_all();
        }

        // Edge-triggered listen socket: re-arm after every pass.
        self.channel.set_events(EV_IN | EV_ET);
        r.update_channel(&mut self.channel);
    }

    /// Drain the accept queue until it would block.
    fn accept_all(&mut self) {
        loop {
            let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
            let mut addr_len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
            let fd = unsafe {
                libc::accept4(
                    self.listen_fd,
                    &mut addr as *mut _ as *mut libc::sockaddr,
                    &mut addr_len,
                    libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                )
            };
            if fd < 0 {
                let errno = last_errno();
                if errno == libc::EINTR {
                    continue;
                }
                if errno == libc::EAGAIN || errno == libc::EWOULDBLOCK {
                    break;
                }
                log_warn!("acceptor: accept failed (errno {})", errno);
                break;
            }

            if fd as usize >= self.cfg.max_fds {
                unsafe { libc::close(fd) };
                continue;
            }
            set_nodelay(fd);

            log_debug!(
                "acceptor: connection from {}:{} on fd {}",
                Ipv4Addr::from(u32::from_be(addr.sin_addr.s_addr)),
                u16::from_be(addr.sin_port),
                fd
            );

            let cfg = self.cfg.clone();
            self.pool.next().queue(Box::new(move |worker| {
                Connection::install(worker, fd, cfg);
            }));
        }
    }
}

impl Drop for Acceptor {
    fn drop(&mut self) {
        unsafe { libc::close(self.listen_fd) };
    }
}

/// A running server: listening socket registered in the calling reactor,
/// worker pool started and receiving connections.
pub struct Server {
    inner: Rc<RefCell<Acceptor>>,
    port: u16,
}

impl Server {
    /// Bind, start the worker pool, and register the acceptor in `r` (the
    /// main reactor). Returns once every worker has published its handle;
    /// connections flow as soon as `r.run()` begins.
    pub fn start(r: &Reactor, cfg: ServerConfig) -> NetResult<Server> {
        cfg.validate().map_err(NetError::Config)?;
        ignore_sigpipe();

        let listen_fd = socket_bind_listen(cfg.port)?;
        if let Err(errno) = set_nonblocking(listen_fd) {
            unsafe { libc::close(listen_fd) };
            return Err(NetError::Os(errno));
        }
        let port = match local_port(listen_fd) {
            Ok(port) => port,
            Err(e) => {
                unsafe { libc::close(listen_fd) };
                return Err(e);
            }
        };

        let pool = ReactorPool::start(cfg.workers, r.handle());
        log_info!(
            "server: listening on port {} with {} worker reactors",
            port,
            pool.num_workers()
        );

        let mut channel = Channel::new(listen_fd);
        channel.set_events(EV_IN | EV_ET);
        let acceptor = Rc::new(RefCell::new(Acceptor {
            listen_fd,
            channel,
            pool,
            cfg: Arc::new(cfg),
        }));
        r.add_channel(&mut acceptor.borrow_mut().channel);
        r.register(listen_fd, Registered::Acceptor(acceptor.clone()));

        Ok(Server {
            inner: acceptor,
            port,
        })
    }

    /// The bound port (resolves an ephemeral port-0 bind).
    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the worker reactors and join their threads. The caller quits
    /// the main reactor itself.
    pub fn shutdown(&self) {
        self.inner.borrow_mut().pool.shutdown();
    }
}
