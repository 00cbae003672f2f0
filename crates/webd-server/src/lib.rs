//! # webd-server — the multi-reactor HTTP/1.x core
//!
//! One reactor per thread. The main reactor owns the listening socket and
//! hands accepted fds to N worker reactors round-robin; each worker drives
//! its connections with an epoll loop, an incremental HTTP parser, and a
//! lazy-expiry timer heap.
//!
//! ```text
//!   listen fd ──► Acceptor (main reactor)
//!                     │  accept4 + round-robin
//!                     ▼
//!        task queue ──► worker Reactor ──► epoll ──► Connection
//!        (eventfd wake)      │                          │
//!                            └──── TimerHeap ◄──────────┘
//! ```
//!
//! Threading model: a `Connection` is created, mutated, and destroyed only
//! on its owning reactor's thread. The only cross-thread traffic is the
//! mutex-guarded task queue each reactor drains after its dispatch pass.

pub mod acceptor;
pub mod channel;
pub mod config;
pub mod connection;
pub mod fs;
pub mod http;
pub mod mask;
pub mod mime;
pub mod pool;
pub mod poller;
pub mod reactor;
pub mod timer;
pub mod wakeup;

pub use acceptor::Server;
pub use config::ServerConfig;
pub use fs::{DiskSource, FileSource};
pub use pool::ReactorPool;
pub use reactor::{Reactor, ReactorHandle, Task};
