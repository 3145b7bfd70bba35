//! Consumer-process detection
//!
//! The grace-period shutdown only fires when no client process remains.
//! Detection is a `pgrep -u <uid> -x <name>` query for the current user.
//!
//! Known coarseness: the name match can catch unrelated processes that
//! share it (e.g. a desktop app named like the CLI). That only delays
//! shutdown by a grace window; it is documented rather than corrected.

use std::process::Command;

/// Process name the grace loop looks for.
pub const DEFAULT_PEER_PROCESS: &str = "claude";

/// Whether any process with exactly `name` is alive for the current user.
#[cfg(unix)]
pub fn has_peer(name: &str) -> bool {
    let uid = nix::unistd::Uid::current().as_raw().to_string();
    match Command::new("pgrep").args(["-u", &uid, "-x", name]).output() {
        Ok(out) => out.status.success() && !out.stdout.is_empty(),
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn has_peer(_name: &str) -> bool {
    false
}
