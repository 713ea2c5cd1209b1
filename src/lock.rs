//! Advisory lock on the data directory.
//!
//! The daemon holds it for its lifetime, a CLI `add` for a single write. The lock
//! file records the current holder so a refused process can report who has it.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

const LOCK_FILE: &str = "content-search.lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Holder {
    Daemon,
    Cli,
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Holder::Daemon => write!(f, "daemon"),
            Holder::Cli => write!(f, "cli"),
        }
    }
}

/// Exclusive lock released on drop.
pub struct DataLock {
    file: File,
}

impl DataLock {
    /// Take the lock without waiting. Fails with `WouldBlock` naming the current
    /// holder when another process has it.
    pub fn acquire(dir: &Path, holder: Holder) -> io::Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;

        if let Err(err) = try_lock(&file) {
            if err.kind() != io::ErrorKind::WouldBlock {
                return Err(err);
            }

            let mut owner = String::new();
            let _ = file.read_to_string(&mut owner);
            let owner = match owner.trim() {
                "" => "another process",
                owner => owner,
            };
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("content store at {} is locked by {owner}", dir.display()),
            ));
        }

        file.set_len(0)?;
        write!(file, "{holder} (pid {})", std::process::id())?;
        file.flush()?;

        log::debug!("acquired data lock as {holder}");

        Ok(Self { file })
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> io::Result<()> {
    // SAFETY: the descriptor is owned by `file`, which outlives the call
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn unlock(file: &File) {
    // SAFETY: see `try_lock`
    unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_UN) };
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

impl Drop for DataLock {
    fn drop(&mut self) {
        let _ = self.file.set_len(0);
        unlock(&self.file);
    }
}
