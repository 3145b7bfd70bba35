//! Atomic PID file I/O
//!
//! Format: single-line text file holding the server PID.
//!
//! # Safety guarantees
//! - Atomic writes via temp file + rename
//! - Reads treat the file as untrusted: garbage parses to an error, not a PID
//! - Deletion is idempotent

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Write the PID file atomically: write `<name>.tmp`, then rename over the
/// final path (atomic on Unix).
pub(crate) fn write_pidfile(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let temp_path = temp_sibling(path);
    fs::write(&temp_path, format!("{}\n", pid))?;
    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Read and parse the PID file.
pub(crate) fn read_pidfile(path: &Path) -> io::Result<u32> {
    let content = fs::read_to_string(path)?;
    content
        .lines()
        .next()
        .and_then(|line| line.trim().parse::<u32>().ok())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing or invalid PID"))
}

/// Delete the PID file (idempotent - no error if missing).
pub(crate) fn delete_pidfile(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "proxy.pid".into());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Check if a PID exists (without verifying what it runs).
///
/// Uses `kill` with the null signal, which checks deliverability without
/// sending anything. EPERM means the process exists but is not ours.
#[cfg(unix)]
pub(crate) fn pid_exists(pid: u32) -> bool {
    use nix::sys::signal;
    use nix::unistd::Pid;

    match signal::kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::errno::Errno::ESRCH) => false,
        Err(_) => true,
    }
}

#[cfg(not(unix))]
pub(crate) fn pid_exists(_pid: u32) -> bool {
    false
}
