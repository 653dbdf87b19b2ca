//! Client side of a single call to a resident server.

use std::env;
use std::io;
use std::path::Path;
use std::time::Duration;

use resident_proto::{Request, Response};
use tokio::net::UnixStream;

use crate::{Error, Result, transport};

/// A connection to a running server, good for exactly one call.
#[derive(Debug)]
pub struct Client {
    /// The underlying Unix socket stream.
    stream: UnixStream,
}

impl Client {
    /// Connects to the server listening at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let stream = transport::connect(path).await?;
        Ok(Self { stream })
    }

    /// Connects, waiting for a server that is still starting up.
    ///
    /// See [`transport::connect_with_retry`].
    pub async fn connect_with_retry(
        path: impl AsRef<Path>,
        attempts: u32,
        backoff: Duration,
        waiting: impl FnMut(u32),
    ) -> Result<Self> {
        let stream = transport::connect_with_retry(path, attempts, backoff, waiting).await?;
        Ok(Self { stream })
    }

    /// Sends `req` and waits for the response.
    ///
    /// Blocks for as long as the entry point runs. A server that closes the
    /// connection without answering yields [`Error::Disconnected`].
    pub async fn call(mut self, req: &Request) -> Result<Response> {
        resident_proto::send(&mut self.stream, req).await?;
        match resident_proto::recv(&mut self.stream).await {
            Ok(resp) => Ok(resp),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::ConnectionReset
                ) =>
            {
                Err(Error::Disconnected)
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Builds a request for `function` carrying this process's environment.
///
/// Variables whose name or value is not valid UTF-8 cannot travel on the
/// wire and are left out with a warning.
pub fn request_from_process<I, A>(function: impl Into<String>, args: I) -> Request
where
    I: IntoIterator<Item = A>,
    A: Into<String>,
{
    let env = env::vars_os().filter_map(|(key, value)| {
        match (key.into_string(), value.into_string()) {
            (Ok(key), Ok(value)) => Some((key, value)),
            (key, _) => {
                tracing::warn!(
                    key = ?key.unwrap_or_else(|k| k.to_string_lossy().into_owned()),
                    "not forwarding non-UTF-8 environment variable"
                );
                None
            }
        }
    });
    Request::new(function).args(args).env(env)
}

#[cfg(test)]
mod tests {
    use resident_proto::{ErrorCode, PROTOCOL_VERSION};

    use super::*;
    use crate::test_support::{serial, tempdir};
    use crate::transport::Listener;

    #[test]
    fn request_carries_process_environment() {
        let _serial = serial();
        let req = request_from_process("echo", ["a", "b c"]);

        assert_eq!(req.version, PROTOCOL_VERSION);
        assert_eq!(req.function, "echo");
        assert_eq!(req.args, vec!["a", "b c"]);
        if let Ok(path) = env::var("PATH") {
            assert_eq!(req.env.get("PATH"), Some(&path));
        }
    }

    #[tokio::test]
    async fn call_roundtrip_against_raw_listener() {
        let dir = tempdir();
        let path = dir.path().join("s.sock");
        let listener = Listener::bind(&path).await.unwrap();

        let server = async {
            let mut stream = listener.accept().await.unwrap();
            let req: Request = resident_proto::recv(&mut stream).await.unwrap();
            let reply = Response::error(ErrorCode::UnknownEntryPoint, req.function);
            resident_proto::send(&mut stream, &reply).await.unwrap();
        };
        let client = async {
            let client = Client::connect(&path).await.unwrap();
            client.call(&Request::new("nope")).await.unwrap()
        };

        let ((), resp) = tokio::join!(server, client);
        let info = resp.error_info().unwrap();
        assert_eq!(info.code, ErrorCode::UnknownEntryPoint);
        assert_eq!(info.message, "nope");
    }

    #[tokio::test]
    async fn hangup_without_response_is_disconnected() {
        let dir = tempdir();
        let path = dir.path().join("s.sock");
        let listener = Listener::bind(&path).await.unwrap();

        let server = async {
            let mut stream = listener.accept().await.unwrap();
            let _: Request = resident_proto::recv(&mut stream).await.unwrap();
            drop(stream);
        };
        let client = async {
            let client = Client::connect(&path).await.unwrap();
            client.call(&Request::new("anything")).await
        };

        let ((), result) = tokio::join!(server, client);
        assert!(matches!(result, Err(Error::Disconnected)));
    }
}
