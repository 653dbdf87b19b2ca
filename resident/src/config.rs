//! Endpoint and logging configuration shared by servers and clients.

use std::env;
use std::path::PathBuf;

/// Environment variable overriding the socket path.
pub const SOCKET_ENV: &str = "RESIDENT_SOCKET";

/// Environment variable holding a `tracing` filter directive.
pub const LOG_ENV: &str = "RESIDENT_LOG";

/// File name of the default socket.
pub const SOCKET_NAME: &str = "resident.sock";

/// Resolves the socket path.
///
/// Precedence: `explicit` (e.g. a `--socket` flag), then
/// [`SOCKET_ENV`], then [`default_socket_path`].
pub fn socket_path(explicit: Option<PathBuf>) -> PathBuf {
    explicit
        .or_else(|| {
            env::var_os(SOCKET_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        })
        .unwrap_or_else(default_socket_path)
}

/// `$XDG_RUNTIME_DIR/resident.sock`, falling back to the system temp dir.
pub fn default_socket_path() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(env::temp_dir)
        .join(SOCKET_NAME)
}

#[cfg(test)]
mod tests {
    #![allow(unsafe_code)]

    use super::*;
    use crate::test_support::serial;

    #[test]
    fn explicit_path_wins() {
        let _serial = serial();
        let path = socket_path(Some(PathBuf::from("/run/custom.sock")));
        assert_eq!(path, PathBuf::from("/run/custom.sock"));
    }

    #[test]
    fn env_then_default() {
        let _serial = serial();
        let previous = env::var_os(SOCKET_ENV);

        // SAFETY: the serial guard keeps other tests away from the environment.
        unsafe { env::set_var(SOCKET_ENV, "/tmp/from-env.sock") };
        assert_eq!(socket_path(None), PathBuf::from("/tmp/from-env.sock"));

        unsafe { env::set_var(SOCKET_ENV, "") };
        assert_eq!(socket_path(None), default_socket_path());

        unsafe { env::remove_var(SOCKET_ENV) };
        let default = socket_path(None);
        assert!(default.ends_with(SOCKET_NAME));

        if let Some(previous) = previous {
            unsafe { env::set_var(SOCKET_ENV, previous) };
        }
    }
}
