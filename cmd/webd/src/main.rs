//! # webd — multi-reactor static-file HTTP server
//!
//! ## Usage
//!
//!     webd [-t workers] [-p port] [-l /path/to/logfile]
//!
//! Defaults: 4 workers, port 80, log to ./WebServer.log. An explicit log
//! path must be absolute. Files are served relative to the working
//! directory.
//!
//! Env defaults (overridden by flags): `WEBD_WORKERS`, `WEBD_PORT`.
//! Logging: `WEBD_LOG_LEVEL`, `WEBD_LOG_FLUSH`.

use std::path::Path;
use std::process;

use webd_core::env::env_get;
use webd_core::util::ignore_sigpipe;
use webd_core::{log_error, log_info, wlog};
use webd_server::{Reactor, Server, ServerConfig};

fn main() {
    // Phase 1: env defaults.
    let mut workers: usize = env_get("WEBD_WORKERS", 4);
    let mut port: u16 = env_get("WEBD_PORT", 80);
    let mut log_path = String::from("./WebServer.log");

    // Phase 2: flags override.
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-t" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(n) => workers = n,
                    None => usage_and_exit("-t expects a worker count"),
                }
            }
            "-p" => {
                i += 1;
                match args.get(i).and_then(|s| s.parse().ok()) {
                    Some(p) => port = p,
                    None => usage_and_exit("-p expects a port number"),
                }
            }
            "-l" => {
                i += 1;
                match args.get(i) {
                    Some(path) if path.len() >= 2 && path.starts_with('/') => {
                        log_path = path.clone();
                    }
                    _ => usage_and_exit("log path should start with \"/\""),
                }
            }
            _ => {}
        }
        i += 1;
    }

    wlog::init();
    if let Err(e) = wlog::set_log_file(Path::new(&log_path)) {
        eprintln!("webd: cannot open log file {}: {}", log_path, e);
        process::exit(1);
    }

    ignore_sigpipe();

    let mut main_loop = match Reactor::new() {
        Ok(reactor) => reactor,
        Err(e) => {
            log_error!("webd: reactor setup failed: {}", e);
            process::exit(1);
        }
    };

    let cfg = ServerConfig::new().port(port).workers(workers);
    let server = match Server::start(&main_loop, cfg) {
        Ok(server) => server,
        Err(e) => {
            log_error!("webd: startup failed: {}", e);
            process::exit(1);
        }
    };

    log_info!(
        "webd: serving on 0.0.0.0:{} with {} workers, log {}",
        server.port(),
        workers,
        log_path
    );

    main_loop.run();
    server.shutdown();
}

fn usage_and_exit(msg: &str) -> ! {
    eprintln!("webd: {}", msg);
    eprintln!("usage: webd [-t workers] [-p port] [-l /absolute/log/path]");
    process::exit(1);
}
