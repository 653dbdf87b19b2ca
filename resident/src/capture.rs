//! Scoped redirection of the process-wide stdout/stderr file descriptors.
//!
//! [`Capture::begin`] points fds 1 and 2 at anonymous temporary files;
//! [`Capture::finish`] puts the originals back and returns what was written.
//! Dropping a [`Capture`] without finishing also restores the originals, so
//! an early return or a panic in the captured code cannot leave the process
//! writing into a dead sink.
//!
//! Capture works at the fd level, so it sees `print!`, direct writes to
//! [`io::stdout`], and output from child processes that inherit the fds.

#![allow(unsafe_code)]

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::{AsFd, AsRawFd, OwnedFd, RawFd};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Held for the lifetime of a [`Capture`]; only one may exist per process.
static ACTIVE: Mutex<()> = Mutex::new(());

/// Bytes written to stdout and stderr while a [`Capture`] was active.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Captured {
    /// Standard output.
    pub stdout: Vec<u8>,
    /// Standard error.
    pub stderr: Vec<u8>,
}

/// Active redirection of both standard streams.
#[derive(Debug)]
pub struct Capture {
    /// Redirection of fd 1.
    stdout: Redirect,
    /// Redirection of fd 2.
    stderr: Redirect,
    /// Released after both redirects are restored (fields drop in order).
    _active: MutexGuard<'static, ()>,
}

impl Capture {
    /// Starts capturing stdout and stderr.
    ///
    /// Blocks if another capture is active in this process.
    pub fn begin() -> io::Result<Self> {
        let active = ACTIVE.lock().unwrap_or_else(PoisonError::into_inner);

        flush_std();
        let stdout = Redirect::begin(
            io::stdout().as_fd().try_clone_to_owned()?,
            libc::STDOUT_FILENO,
        )?;
        let stderr = Redirect::begin(
            io::stderr().as_fd().try_clone_to_owned()?,
            libc::STDERR_FILENO,
        )?;

        Ok(Self {
            stdout,
            stderr,
            _active: active,
        })
    }

    /// Restores the original streams and returns the captured bytes.
    pub fn finish(mut self) -> io::Result<Captured> {
        flush_std();
        Ok(Captured {
            stdout: self.stdout.take()?,
            stderr: self.stderr.take()?,
        })
    }
}

/// One redirected descriptor.
#[derive(Debug)]
struct Redirect {
    /// Descriptor being redirected (1 or 2).
    target: RawFd,
    /// Duplicate of the original descriptor.
    saved: OwnedFd,
    /// Temporary file receiving writes.
    sink: File,
    /// Whether `saved` has been put back on `target`.
    restored: bool,
}

impl Redirect {
    /// Points `target` at a fresh temporary file.
    fn begin(saved: OwnedFd, target: RawFd) -> io::Result<Self> {
        let sink = tempfile::tempfile()?;
        dup2(sink.as_raw_fd(), target)?;
        Ok(Self {
            target,
            saved,
            sink,
            restored: false,
        })
    }

    /// Puts the original descriptor back. Idempotent.
    fn restore(&mut self) -> io::Result<()> {
        if !self.restored {
            dup2(self.saved.as_raw_fd(), self.target)?;
            self.restored = true;
        }
        Ok(())
    }

    /// Restores the descriptor and reads back everything the sink received.
    fn take(&mut self) -> io::Result<Vec<u8>> {
        self.restore()?;
        let mut buf = Vec::new();
        self.sink.seek(SeekFrom::Start(0))?;
        self.sink.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Drop for Redirect {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}

/// Pushes Rust's buffered stdout/stderr to their current descriptors.
fn flush_std() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// `dup2(2)`, retried on `EINTR`.
fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: both descriptors are open for the duration of the call;
        // dup2 does not take ownership of either.
        if unsafe { libc::dup2(src, dst) } >= 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
