//! Singleton lifecycle controller
//!
//! Exactly one proxy process may serve a given host:port per state
//! directory. The controller enforces that with three artifacts under the
//! state directory:
//!
//! - `lock/`  - a directory used as the cross-process mutex; `mkdir` is the
//!   only atomic primitive needed
//! - `proxy.pid` - PID of the detached server, written by the winning
//!   starter after the spawn
//! - `proxy.log` - the detached server's combined stdout/stderr, appended
//!
//! Every artifact is untrusted on the next start: a crash can leave all
//! three behind, so `start` runs stale-lock recovery first, and `stop`
//! never signals a PID unless the OS confirms it still owns the port
//! (PID-reuse guard).

mod peers;
mod pidfile;
mod ports;

pub use peers::{has_peer, DEFAULT_PEER_PROCESS};

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use crate::config::Config;

/// Poll interval for readiness and shutdown loops.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `stop` waits between SIGTERM and SIGKILL.
const TERM_GRACE: Duration = Duration::from_secs(3);

/// Outcome of a successful `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// This call spawned the server.
    Started { pid: u32 },
    /// A server was already up (or another starter won the race).
    AlreadyRunning { pid: Option<u32> },
}

/// Point-in-time singleton status for diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct SingletonStatus {
    pub listening: bool,
    pub pid: Option<u32>,
    pub owns_port: bool,
}

/// Removes the lock directory when the starter is done, on every exit path.
struct LockGuard(PathBuf);

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir(&self.0);
    }
}

/// The singleton controller for one host:port + state directory.
pub struct Singleton {
    host: String,
    port: u16,
    state_dir: PathBuf,
    start_wait: Duration,
    stop_grace: Duration,
}

impl Singleton {
    pub fn new(config: &Config) -> Self {
        Self {
            host: config.proxy.host.clone(),
            port: config.proxy.port,
            state_dir: config.lifecycle.state_dir.clone(),
            start_wait: Duration::from_secs(config.lifecycle.start_wait_seconds),
            stop_grace: Duration::from_secs(config.lifecycle.stop_grace_seconds),
        }
    }

    fn pid_path(&self) -> PathBuf {
        self.state_dir.join("proxy.pid")
    }

    fn lock_path(&self) -> PathBuf {
        self.state_dir.join("lock")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("proxy.log")
    }

    /// Ensure a proxy is running, spawning a detached server if needed.
    ///
    /// Concurrent callers race on an atomic `mkdir`; the loser waits for
    /// the winner's server to come up instead of spawning a second one.
    pub async fn start(&self) -> Result<StartOutcome> {
        fs::create_dir_all(&self.state_dir).with_context(|| {
            format!("failed to create state dir {}", self.state_dir.display())
        })?;

        self.recover_stale_lock();

        // Fast path: someone is already listening.
        if ports::is_port_listening(&self.host, self.port) {
            return self.classify_existing_listener();
        }

        // Acquire the lock; mkdir failing with AlreadyExists means another
        // starter holds it.
        match fs::create_dir(self.lock_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(
                    component = "lifecycle",
                    "Another starter holds the lock; waiting for the port"
                );
                self.wait_for_port().await.with_context(|| {
                    format!(
                        "another starter held the lock but port {} never came up",
                        self.port
                    )
                })?;
                let pid = pidfile::read_pidfile(&self.pid_path()).ok();
                return Ok(StartOutcome::AlreadyRunning { pid });
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to create lock dir {}", self.lock_path().display())
                })
            }
        }
        let _lock = LockGuard(self.lock_path());

        // Double-check under the lock: a racing starter may have won
        // between our probe and our mkdir.
        if ports::is_port_listening(&self.host, self.port) {
            return self.classify_existing_listener();
        }

        let pid = self.spawn_server()?;
        pidfile::write_pidfile(&self.pid_path(), pid)
            .with_context(|| format!("failed to write {}", self.pid_path().display()))?;

        self.wait_for_port().await.with_context(|| {
            format!(
                "proxy did not start listening on {}:{} within {}s; see {}",
                self.host,
                self.port,
                self.start_wait.as_secs(),
                self.log_path().display()
            )
        })?;

        tracing::info!(component = "lifecycle", pid, "Proxy server started");
        Ok(StartOutcome::Started { pid })
    }

    /// Stop the server after a quiet window with no consumer processes.
    ///
    /// Polls `has_peer` once per second for the configured grace window;
    /// any positive tick aborts the shutdown. Returns whether the server
    /// was stopped.
    pub async fn stop_if_no_peers<F>(&self, has_peer: F) -> Result<bool>
    where
        F: Fn() -> bool,
    {
        for _ in 0..self.stop_grace.as_secs() {
            if has_peer() {
                tracing::debug!(
                    component = "lifecycle",
                    "Peer process still present; leaving proxy running"
                );
                return Ok(false);
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        self.stop().await?;
        Ok(true)
    }

    /// Stop the server: SIGTERM, a bounded poll, then SIGKILL.
    ///
    /// Never signals a PID that does not currently own the port - the PID
    /// file may be stale and the PID recycled. The PID file is always
    /// removed.
    pub async fn stop(&self) -> Result<()> {
        let pid = pidfile::read_pidfile(&self.pid_path()).unwrap_or(0);

        if pid > 0 && ports::pid_owns_port(pid, self.port) {
            self.terminate(pid).await;
        } else if pid > 0 {
            tracing::info!(
                component = "lifecycle",
                pid,
                port = self.port,
                "PID does not own the port; treating as already gone"
            );
        }

        pidfile::delete_pidfile(&self.pid_path())
            .with_context(|| format!("failed to remove {}", self.pid_path().display()))?;
        Ok(())
    }

    /// Current singleton state, for `status` output.
    pub fn status(&self) -> SingletonStatus {
        let listening = ports::is_port_listening(&self.host, self.port);
        let pid = pidfile::read_pidfile(&self.pid_path()).ok();
        let owns_port = pid.is_some_and(|p| ports::pid_owns_port(p, self.port));
        SingletonStatus {
            listening,
            pid,
            owns_port,
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────

    /// Remove a lock (and PID file) left behind by a crashed starter.
    ///
    /// The lock is stale when nothing is listening and the recorded PID is
    /// dead, or when the PID is alive but the OS says it is not the
    /// listener (a reused PID).
    fn recover_stale_lock(&self) {
        if !self.lock_path().exists() {
            return;
        }

        let listening = ports::is_port_listening(&self.host, self.port);
        let pid = pidfile::read_pidfile(&self.pid_path()).ok();
        let alive = pid.is_some_and(pidfile::pid_exists);
        let owns_port = pid.is_some_and(|p| ports::pid_owns_port(p, self.port));

        let stale = (!listening && !alive) || (alive && !owns_port);
        if stale {
            tracing::warn!(
                component = "lifecycle",
                ?pid,
                listening,
                "Removing stale lock directory"
            );
            let _ = fs::remove_dir_all(self.lock_path());
            let _ = pidfile::delete_pidfile(&self.pid_path());
        }
    }

    /// The port is listening: decide between "ours, already running" and
    /// "someone else's".
    fn classify_existing_listener(&self) -> Result<StartOutcome> {
        let pid = pidfile::read_pidfile(&self.pid_path()).unwrap_or(0);
        if pid > 0 && pidfile::pid_exists(pid) && ports::pid_owns_port(pid, self.port) {
            tracing::info!(component = "lifecycle", pid, "Proxy already running");
            return Ok(StartOutcome::AlreadyRunning { pid: Some(pid) });
        }
        bail!(
            "port {} is in use by another process (not the recorded proxy)",
            self.port
        );
    }

    /// Spawn the server as a detached child: own process group, stdin
    /// ignored, stdout/stderr appended to `proxy.log`, environment
    /// inherited.
    fn spawn_server(&self) -> Result<u32> {
        let exe = std::env::current_exe().context("failed to resolve current executable")?;

        let log = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_path())
            .with_context(|| format!("failed to open {}", self.log_path().display()))?;
        let log_err = log
            .try_clone()
            .context("failed to duplicate log file descriptor")?;

        let mut cmd = std::process::Command::new(exe);
        cmd.arg("serve")
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err));

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // New process group: the child survives the parent's exit and
            // never receives the parent's terminal signals.
            cmd.process_group(0);
        }

        let child = cmd.spawn().context("failed to spawn proxy server")?;
        let pid = child.id();
        if pid == 0 {
            bail!("spawn returned pid 0");
        }
        // Detach: dropping the handle closes the parent's copies of the log
        // descriptor; the child keeps its own.
        drop(child);
        Ok(pid)
    }

    async fn wait_for_port(&self) -> Result<()> {
        let deadline = std::time::Instant::now() + self.start_wait;
        while std::time::Instant::now() < deadline {
            if ports::is_port_listening(&self.host, self.port) {
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        bail!(
            "port {} not listening after {}s",
            self.port,
            self.start_wait.as_secs()
        )
    }

    /// SIGTERM, poll for exit, escalate to SIGKILL if the process is still
    /// the port owner. EPERM and ESRCH both mean "nothing left to do".
    #[cfg(unix)]
    async fn terminate(&self, pid: u32) {
        use nix::errno::Errno;
        use nix::sys::signal::{self, Signal};
        use nix::unistd::Pid;

        let nix_pid = Pid::from_raw(pid as i32);

        match signal::kill(nix_pid, Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => return,
            Err(e) => {
                tracing::warn!(
                    component = "lifecycle",
                    pid,
                    "SIGTERM failed ({}); treating as already gone",
                    e
                );
                return;
            }
        }

        let ticks = TERM_GRACE.as_millis() / POLL_INTERVAL.as_millis();
        for _ in 0..ticks {
            tokio::time::sleep(POLL_INTERVAL).await;
            if !pidfile::pid_exists(pid) {
                return;
            }
        }

        if ports::pid_owns_port(pid, self.port) {
            tracing::warn!(
                component = "lifecycle",
                pid,
                "Process survived SIGTERM; sending SIGKILL"
            );
            if let Err(e) = signal::kill(nix_pid, Signal::SIGKILL) {
                if e != Errno::ESRCH {
                    tracing::warn!(component = "lifecycle", pid, "SIGKILL failed: {}", e);
                }
            }
        }
    }

    #[cfg(not(unix))]
    async fn terminate(&self, _pid: u32) {}
}
