//! Unix domain socket endpoint shared by the server and its clients.

use std::io;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};

use crate::{Error, Result};

/// Server side of the endpoint.
///
/// The socket file is unlinked by [`Listener::close`] or on drop.
#[derive(Debug)]
pub struct Listener {
    /// Bound socket.
    inner: UnixListener,
    /// Filesystem path of the socket.
    path: PathBuf,
    /// Whether the socket file has already been removed.
    closed: bool,
}

impl Listener {
    /// Binds the endpoint at `path`, replacing a stale socket file left by a
    /// crashed server.
    ///
    /// Fails with [`Error::AddrInUse`] if a live server still answers on it.
    pub async fn bind(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Ok(meta) = std::fs::symlink_metadata(&path) {
            if !meta.file_type().is_socket() {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a socket", path.display()),
                )));
            }
            if UnixStream::connect(&path).await.is_ok() {
                return Err(Error::AddrInUse { path });
            }
            tracing::debug!(path = %path.display(), "removing stale socket");
            std::fs::remove_file(&path)?;
        } else if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let inner = UnixListener::bind(&path)?;
        Ok(Self {
            inner,
            path,
            closed: false,
        })
    }

    /// Waits for the next client connection.
    pub async fn accept(&self) -> io::Result<UnixStream> {
        let (stream, _addr) = self.inner.accept().await?;
        Ok(stream)
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlinks the socket file so new clients fail fast instead of queueing
    /// on a listener that will never accept them. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to remove socket");
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connects to the server at `path`.
///
/// A missing socket file or a refused connection both mean no server is
/// listening and map to [`Error::Unavailable`].
pub async fn connect(path: impl AsRef<Path>) -> Result<UnixStream> {
    let path = path.as_ref();
    UnixStream::connect(path).await.map_err(|source| match source.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => Error::Unavailable {
            path: path.to_path_buf(),
            source,
        },
        _ => Error::Io(source),
    })
}

/// Connects to the server, retrying while it is unavailable.
///
/// Makes up to `attempts` tries (at least one), sleeping `backoff * n`
/// after the n-th failure, and calls `waiting` before each sleep.
pub async fn connect_with_retry(
    path: impl AsRef<Path>,
    attempts: u32,
    backoff: Duration,
    mut waiting: impl FnMut(u32),
) -> Result<UnixStream> {
    let path = path.as_ref();
    let mut tried = 0;
    loop {
        tried += 1;
        match connect(path).await {
            Err(Error::Unavailable { .. }) if tried < attempts => {
                waiting(tried);
                tokio::time::sleep(backoff * tried).await;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tempdir;

    #[tokio::test]
    async fn connect_without_server_is_unavailable() {
        let dir = tempdir();
        let path = dir.path().join("absent.sock");
        assert!(matches!(
            connect(&path).await,
            Err(Error::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn bind_accept_connect() {
        let dir = tempdir();
        let path = dir.path().join("nested/dir/s.sock");

        let listener = Listener::bind(&path).await.unwrap();
        assert!(path.exists());
        let (accepted, connected) = tokio::join!(listener.accept(), connect(&path));
        accepted.unwrap();
        connected.unwrap();

        drop(listener);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn stale_socket_is_replaced() {
        let dir = tempdir();
        let path = dir.path().join("s.sock");

        // A bound-then-forgotten std listener leaves the file with nobody
        // accepting once it is dropped.
        drop(std::os::unix::net::UnixListener::bind(&path).unwrap());
        assert!(path.exists());

        let listener = Listener::bind(&path).await.unwrap();
        assert_eq!(listener.path(), path);
    }

    #[tokio::test]
    async fn live_server_keeps_endpoint() {
        let dir = tempdir();
        let path = dir.path().join("s.sock");

        let _first = Listener::bind(&path).await.unwrap();
        assert!(matches!(
            Listener::bind(&path).await,
            Err(Error::AddrInUse { .. })
        ));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn refuses_to_replace_regular_file() {
        let dir = tempdir();
        let path = dir.path().join("not-a-socket");
        std::fs::write(&path, "keep me").unwrap();

        assert!(matches!(Listener::bind(&path).await, Err(Error::Io(_))));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "keep me");
    }

    #[tokio::test]
    async fn close_makes_endpoint_unavailable() {
        let dir = tempdir();
        let path = dir.path().join("s.sock");

        let mut listener = Listener::bind(&path).await.unwrap();
        listener.close();
        listener.close();
        assert!(matches!(
            connect(&path).await,
            Err(Error::Unavailable { .. })
        ));
    }

    #[tokio::test]
    async fn retry_gives_up_after_attempts() {
        let dir = tempdir();
        let path = dir.path().join("absent.sock");

        let mut waits = Vec::new();
        let result =
            connect_with_retry(&path, 3, Duration::from_millis(1), |n| waits.push(n)).await;
        assert!(matches!(result, Err(Error::Unavailable { .. })));
        assert_eq!(waits, vec![1, 2]);
    }
}
