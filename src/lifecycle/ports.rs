//! Port probing and port-ownership verification
//!
//! Two distinct questions: "is something listening on the port?" (a TCP
//! connect probe) and "is this specific PID the listener?" (an `lsof`
//! query). The second is the anti-PID-reuse guard: a recycled PID that
//! happens to be alive must never be treated as our server, and must never
//! be signaled by `stop`.

use std::net::{TcpStream, ToSocketAddrs};
use std::process::Command;
use std::time::Duration;

const CONNECT_PROBE_TIMEOUT: Duration = Duration::from_millis(250);

/// Whether anything is accepting connections on `host:port`.
pub(crate) fn is_port_listening(host: &str, port: u16) -> bool {
    let Ok(addrs) = (host, port).to_socket_addrs() else {
        return false;
    };
    for addr in addrs {
        if TcpStream::connect_timeout(&addr, CONNECT_PROBE_TIMEOUT).is_ok() {
            return true;
        }
    }
    false
}

/// Whether the OS reports `pid` as a listener on `port`.
///
/// Closed check via `lsof -nP -t -iTCP:<port> -sTCP:LISTEN`: the PID must
/// appear in the listener list. Anything else - lsof missing, command
/// failure, no match - is `false`.
pub(crate) fn pid_owns_port(pid: u32, port: u16) -> bool {
    let output = Command::new("lsof")
        .args(["-nP", "-t", &format!("-iTCP:{}", port), "-sTCP:LISTEN"])
        .output();

    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout)
            .lines()
            .any(|line| line.trim().parse::<u32>() == Ok(pid)),
        _ => false,
    }
}
