//! Connection — per-fd HTTP state machine
//!
//! One `Connection` per accepted socket, owned by exactly one reactor and
//! touched only on that reactor's thread. A dispatch pass feeds it the
//! ready mask; it drains the socket, steps the incremental parser, builds
//! the response, and re-arms its own interest mask plus a fresh close
//! deadline in `handle_update`.
//!
//! Lifecycle: installed with read interest and a 2 s deadline; a request
//! that negotiates keep-alive stretches the deadline to 5 minutes and the
//! connection is reset for the next request (pipelined bytes already in
//! the inbound buffer are replayed immediately). Errors answer 400/404 on
//! the spot and close. A peer half-close finishes parsing what was
//! buffered, flushes, then closes.

use std::cell::RefCell;
use std::os::unix::io::RawFd;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use webd_core::util::{read_to_buf, write_from_buf};
use webd_core::{log_debug, log_trace, log_warn};

use crate::channel::Channel;
use crate::config::ServerConfig;
use crate::http::{Method, Parse, Parser, ProcessState};
use crate::mask::{EV_ET, EV_HUP, EV_IN, EV_ONESHOT, EV_OUT, EV_READ_MASK, EV_ERR};
use crate::mime::{mime_type, FAVICON};
use crate::reactor::{ConnTimer, Reactor, Registered};

/// Deadline while a request is in flight.
const DEFAULT_EXPIRE_MS: u64 = 2_000;

/// Keep-alive idle deadline (5 minutes).
const KEEP_ALIVE_MS: u64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Connected,
    Disconnecting,
    Disconnected,
}

pub struct Connection {
    fd: RawFd,
    channel: Channel,
    cfg: Arc<ServerConfig>,
    self_weak: Weak<RefCell<Connection>>,
    in_buf: Vec<u8>,
    out_buf: Vec<u8>,
    parser: Parser,
    keep_alive: bool,
    conn_state: ConnState,
    error: bool,
    timer: Weak<ConnTimer>,
}

impl Connection {
    fn new(fd: RawFd, cfg: Arc<ServerConfig>, self_weak: Weak<RefCell<Connection>>) -> Self {
        Self {
            fd,
            channel: Channel::new(fd),
            cfg,
            self_weak,
            in_buf: Vec::new(),
            out_buf: Vec::new(),
            parser: Parser::new(),
            keep_alive: false,
            conn_state: ConnState::Connected,
            error: false,
            timer: Weak::new(),
        }
    }

    /// Create a connection for `fd` and register it with the calling
    /// reactor: read interest (edge-triggered, one-shot first arm) and the
    /// initial 2 s deadline. Runs as a queued task on the owning reactor,
    /// so no fd event can be observed before this completes.
    pub(crate) fn install(r: &Reactor, fd: RawFd, cfg: Arc<ServerConfig>) {
        let conn = Rc::new_cyclic(|weak| {
            RefCell::new(Connection::new(fd, cfg, weak.clone()))
        });
        {
            let mut c = conn.borrow_mut();
            c.channel.set_events(EV_IN | EV_ET | EV_ONESHOT);
            let entry = r.schedule(DEFAULT_EXPIRE_MS, c.self_weak.clone());
            c.timer = Rc::downgrade(&entry);
            r.add_channel(&mut c.channel);
        }
        r.register(fd, Registered::Conn(conn));
    }

    /// Dispatch one ready mask in the fixed order: hangup gate, error
    /// gate, read, write, then the re-arm hook.
    pub(crate) fn handle_event(&mut self, r: &Reactor, revents: u32) {
        self.channel.set_revents(revents);
        self.channel.set_events(0);

        if revents & EV_HUP != 0 && revents & EV_IN == 0 {
            // Peer went away with nothing left to read. The armed
            // deadline will reap this connection.
            return;
        }
        if revents & EV_ERR != 0 {
            log_warn!("connection fd={}: poll error event", self.fd);
            return;
        }
        if revents & EV_READ_MASK != 0 {
            self.handle_read();
        }
        if revents & EV_OUT != 0 {
            self.handle_write();
        }
        self.handle_update(r);
    }

    /// Drain the socket and run the request machine as far as the buffered
    /// bytes allow. Loops back after a finished request when pipelined
    /// bytes remain.
    fn handle_read(&mut self) {
        loop {
            'step: {
                let (n, peer_closed) = read_to_buf(self.fd, &mut self.in_buf);
                log_trace!(
                    "connection fd={}: read {} bytes, buffered {}",
                    self.fd,
                    n,
                    self.in_buf.len()
                );

                if self.conn_state == ConnState::Disconnecting {
                    self.in_buf.clear();
                    break 'step;
                }
                if n < 0 {
                    self.error = true;
                    break 'step;
                }
                if peer_closed {
                    self.conn_state = ConnState::Disconnecting;
                    if n == 0 {
                        break 'step;
                    }
                }

                if self.parser.state == ProcessState::ParseUri {
                    match self.parser.parse_request_line(&mut self.in_buf) {
                        Parse::Again => break 'step,
                        Parse::Error => {
                            log_debug!("connection fd={}: bad request line", self.fd);
                            self.in_buf.clear();
                            self.error = true;
                            self.send_error(400, "Bad Request");
                            break 'step;
                        }
                        Parse::Success => self.parser.state = ProcessState::ParseHeaders,
                    }
                }

                if self.parser.state == ProcessState::ParseHeaders {
                    match self.parser.parse_headers(&mut self.in_buf) {
                        Parse::Again => break 'step,
                        Parse::Error => {
                            log_debug!("connection fd={}: bad header block", self.fd);
                            self.error = true;
                            self.send_error(400, "Bad Request");
                            break 'step;
                        }
                        Parse::Success => {
                            self.parser.state = if self.parser.method == Method::Post {
                                ProcessState::RecvBody
                            } else {
                                ProcessState::Analyze
                            };
                        }
                    }
                }

                if self.parser.state == ProcessState::RecvBody {
                    let content_length = self
                        .parser
                        .headers
                        .get("Content-length")
                        .and_then(|v| v.parse::<usize>().ok());
                    let content_length = match content_length {
                        Some(len) => len,
                        None => {
                            self.error = true;
                            self.send_error(
                                400,
                                "Bad Request: Lack of argument (Content-length)",
                            );
                            break 'step;
                        }
                    };
                    if self.in_buf.len() < content_length {
                        break 'step;
                    }
                    self.parser.state = ProcessState::Analyze;
                }

                if self.parser.state == ProcessState::Analyze {
                    match self.analyze() {
                        Parse::Success => {
                            self.parser.state = ProcessState::Finish;
                        }
                        _ => self.error = true,
                    }
                    break 'step;
                }
            }

            if !self.error {
                if !self.out_buf.is_empty() {
                    self.handle_write();
                }
                // handle_write may have flagged an error.
                if !self.error && self.parser.state == ProcessState::Finish {
                    self.reset();
                    if !self.in_buf.is_empty() && self.conn_state != ConnState::Disconnecting {
                        continue;
                    }
                } else if !self.error && self.conn_state != ConnState::Disconnected {
                    self.channel.or_events(EV_IN);
                }
            }
            break;
        }
    }

    /// Push the outbound buffer at the socket; leave the tail buffered on
    /// `EAGAIN` with write interest set.
    fn handle_write(&mut self) {
        if !self.error && self.conn_state != ConnState::Disconnected {
            let n = write_from_buf(self.fd, &mut self.out_buf);
            if n < 0 {
                log_warn!("connection fd={}: write failed", self.fd);
                self.channel.set_events(0);
                self.error = true;
            }
            if !self.out_buf.is_empty() {
                self.channel.or_events(EV_OUT);
            }
        }
    }

    /// Re-arm hook, run after every dispatch: open a fresh deadline window
    /// and push the computed interest mask to the poller.
    fn handle_update(&mut self, r: &Reactor) {
        self.detach_timer();

        if !self.error && self.conn_state == ConnState::Connected {
            if self.channel.events() != 0 {
                let mut timeout = DEFAULT_EXPIRE_MS;
                if self.keep_alive {
                    timeout = KEEP_ALIVE_MS;
                }
                // Readable and writable at once: finish draining the
                // response before accepting more input.
                if self.channel.events() & EV_IN != 0 && self.channel.events() & EV_OUT != 0 {
                    self.channel.set_events(EV_OUT);
                }
                self.channel.or_events(EV_ET);
                self.arm(r, timeout);
            } else if self.keep_alive {
                self.channel.or_events(EV_IN | EV_ET);
                self.arm(r, KEEP_ALIVE_MS);
            } else {
                self.channel.or_events(EV_IN | EV_ET);
                self.arm(r, KEEP_ALIVE_MS / 2);
            }
        } else if !self.error
            && self.conn_state == ConnState::Disconnecting
            && self.channel.events() & EV_OUT != 0
        {
            // Half-closed peer with a response tail to flush.
            self.channel.set_events(EV_OUT | EV_ET);
            r.update_channel(&mut self.channel);
        } else {
            self.handle_close(r);
        }
    }

    fn arm(&mut self, r: &Reactor, timeout_ms: u64) {
        let entry = r.schedule(timeout_ms, self.self_weak.clone());
        self.timer = Rc::downgrade(&entry);
        r.update_channel(&mut self.channel);
    }

    /// Tear down: deregister from the poller and drop the reactor's strong
    /// reference. The fd closes when the last reference unwinds.
    pub(crate) fn handle_close(&mut self, r: &Reactor) {
        if self.conn_state == ConnState::Disconnected {
            return;
        }
        self.conn_state = ConnState::Disconnected;
        self.detach_timer();
        r.remove_conn(self.fd);
    }

    /// Prepare for the next request on this connection. Keeps the inbound
    /// buffer (pipelined bytes) and the negotiated keep-alive flag.
    fn reset(&mut self) {
        self.parser.reset();
        self.detach_timer();
    }

    fn detach_timer(&mut self) {
        if let Some(entry) = self.timer.upgrade() {
            entry.cancel();
        }
        self.timer = Weak::new();
    }

    /// Build the response for the parsed request.
    fn analyze(&mut self) -> Parse {
        match self.parser.method {
            Method::Post => {
                // No POST handler is wired up.
                Parse::Error
            }
            Method::Get | Method::Head => {
                let mut header = String::new();
                header.push_str("HTTP/1.1 200 OK\r\n");

                if let Some(conn_val) = self.parser.headers.get("Connection") {
                    if conn_val == "Keep-Alive" || conn_val == "keep-alive" {
                        self.keep_alive = true;
                        header.push_str("Connection: Keep-Alive\r\n");
                        header.push_str(&format!("Keep-Alive: timeout={}\r\n", KEEP_ALIVE_MS));
                    }
                }

                let file_type = match self.parser.target.rfind('.') {
                    Some(dot) => mime_type(&self.parser.target[dot..]),
                    None => mime_type("default"),
                };

                if self.parser.target == "hello" {
                    self.out_buf =
                        b"HTTP/1.1 200 OK\r\nContent-type: text/plain\r\n\r\nHello World"
                            .to_vec();
                    return Parse::Success;
                }
                if self.parser.target == "favicon.ico" {
                    header.push_str("Content-Type: image/png\r\n");
                    header.push_str(&format!("Content-Length: {}\r\n", FAVICON.len()));
                    header.push_str("Server: LinYa's Web Server\r\n");
                    header.push_str("\r\n");
                    self.out_buf.extend_from_slice(header.as_bytes());
                    if self.parser.method != Method::Head {
                        self.out_buf.extend_from_slice(&FAVICON);
                    }
                    return Parse::Success;
                }

                let size = match self.cfg.source.len(&self.parser.target) {
                    Some(size) => size,
                    None => {
                        self.send_error(404, "Not Found!");
                        return Parse::Error;
                    }
                };
                header.push_str(&format!("Content-Type: {}\r\n", file_type));
                header.push_str(&format!("Content-Length: {}\r\n", size));
                header.push_str("Server: LinYa's Web Server\r\n");
                header.push_str("\r\n");
                self.out_buf.extend_from_slice(header.as_bytes());

                if self.parser.method == Method::Head {
                    return Parse::Success;
                }

                match self.cfg.source.read(&self.parser.target) {
                    Some(bytes) => {
                        self.out_buf.extend_from_slice(&bytes);
                        Parse::Success
                    }
                    None => {
                        self.out_buf.clear();
                        self.send_error(404, "Not Found!");
                        Parse::Error
                    }
                }
            }
        }
    }

    /// Write an error response synchronously in one pass. The connection
    /// is about to close, so nothing is staged in the outbound buffer and
    /// short writes are not retried.
    fn send_error(&mut self, code: u16, msg: &str) {
        let msg = format!(" {}", msg);
        let mut body = String::new();
        body.push_str("<html><title>哎~出错了</title>");
        body.push_str("<body bgcolor=\"ffffff\">");
        body.push_str(&format!("{}{}", code, msg));
        body.push_str("<hr><em> LinYa's Web Server</em>\n</body></html>");

        let mut header = String::new();
        header.push_str(&format!("HTTP/1.1 {}{}\r\n", code, msg));
        header.push_str("Content-Type: text/html\r\n");
        header.push_str("Connection: Close\r\n");
        header.push_str(&format!("Content-Length: {}\r\n", body.len()));
        header.push_str("Server: LinYa's Web Server\r\n");
        header.push_str("\r\n");

        let mut bytes = header.into_bytes();
        write_from_buf(self.fd, &mut bytes);
        let mut bytes = body.into_bytes();
        write_from_buf(self.fd, &mut bytes);
    }

    #[cfg(test)]
    pub(crate) fn is_keep_alive(&self) -> bool {
        self.keep_alive
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        unsafe { libc::close(self.fd) };
    }
}
