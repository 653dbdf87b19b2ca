//! Error types for resident operations.

use std::path::PathBuf;

use crate::registry::RegistryError;

/// Alias for `Result<T, resident::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by the transport, server and client.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No server is listening on the endpoint.
    #[error("no server listening on {}", path.display())]
    Unavailable {
        /// Socket path that was tried.
        path: PathBuf,
        /// Error from the final connection attempt.
        #[source]
        source: std::io::Error,
    },

    /// Another live server already owns the endpoint.
    #[error("another server is already listening on {}", path.display())]
    AddrInUse {
        /// Socket path held by the other server.
        path: PathBuf,
    },

    /// The server closed the connection without sending a response.
    #[error("server closed the connection before responding")]
    Disconnected,

    /// Entry-point registration failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Any other I/O error from the socket, codec or output capture.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
