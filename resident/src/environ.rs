//! Per-call replacement of the server's environment variables.

#![allow(unsafe_code)]

use std::collections::BTreeMap;
use std::env;
use std::ffi::OsString;

/// The server environment while a client's variables are installed.
///
/// [`EnvScope::apply`] replaces the whole process environment with the
/// client's snapshot; dropping the scope restores the server's own
/// variables. Entry points therefore see exactly the caller's environment,
/// never the server's startup environment or a previous call's.
///
/// Mutating the environment is only sound while no other thread reads it.
/// The server runs every call on a single thread, which upholds this.
#[derive(Debug)]
#[must_use = "the client environment is removed when the scope is dropped"]
pub struct EnvScope {
    /// The server's environment before the call.
    saved: Vec<(OsString, OsString)>,
}

impl EnvScope {
    /// Installs `vars` as the complete process environment.
    ///
    /// Entries the OS cannot represent are skipped with a warning.
    pub fn apply(vars: &BTreeMap<String, String>) -> Self {
        let saved: Vec<_> = env::vars_os().collect();
        clear();
        for (key, value) in vars {
            if is_valid(key, value) {
                // SAFETY: calls are serialized on one thread (see type docs).
                unsafe { env::set_var(key, value) };
            } else {
                tracing::warn!(
                    key = %key.escape_debug(),
                    "skipping unrepresentable environment variable"
                );
            }
        }
        Self { saved }
    }
}

impl Drop for EnvScope {
    fn drop(&mut self) {
        clear();
        for (key, value) in &self.saved {
            // SAFETY: as in `apply`; these pairs came from `vars_os`.
            unsafe { env::set_var(key, value) };
        }
    }
}

/// Removes every variable from the process environment.
fn clear() {
    for (key, _) in env::vars_os() {
        // SAFETY: as in `EnvScope::apply`.
        unsafe { env::remove_var(key) };
    }
}

/// `set_var` panics on these; a malformed request must not crash the server.
fn is_valid(key: &str, value: &str) -> bool {
    !key.is_empty() && !key.contains(['=', '\0']) && !value.contains('\0')
}
