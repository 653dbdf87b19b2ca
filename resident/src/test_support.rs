//! Helpers shared by unit tests.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tempfile::TempDir;

/// Serializes tests that mutate or redirect process-wide state
/// (environment variables, fds 1 and 2).
static SERIAL: Mutex<()> = Mutex::new(());

/// Holds off other process-wide tests until the guard is dropped.
pub(crate) fn serial() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates a temp dir without racing environment mutation.
///
/// Must not be called while holding [`serial`].
pub(crate) fn tempdir() -> TempDir {
    let _serial = serial();
    tempfile::tempdir().unwrap()
}
