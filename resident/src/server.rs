//! Accept loop and per-connection dispatch.
//!
//! The server services one connection at a time: read one [`Request`],
//! run the entry point with the caller's environment and with stdout/stderr
//! captured, write one [`Response`], close. Entry points therefore never run
//! concurrently and may mutate the server state freely.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use resident_proto::{ErrorCode, ErrorInfo, Outcome, PROTOCOL_VERSION, Request, Response};
use tokio::io::{AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::UnixStream;
use tokio::signal::unix::{SignalKind, signal};

use crate::Result;
use crate::capture::Capture;
use crate::environ::EnvScope;
use crate::registry::{Call, Registry};
use crate::transport::Listener;

/// Appended to the caller's stderr when its call stops the server.
const SHUTDOWN_NOTICE: &[u8] = b"server shutting down\n";

/// Why [`Server::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Shutdown {
    /// A client called `exit`, or an entry point requested shutdown.
    Requested,
    /// An entry point failed; the failure was reported to its caller.
    Fault,
    /// SIGINT or SIGTERM.
    Signal,
}

impl Shutdown {
    /// Returns `true` if the server stopped because of a failed call.
    pub fn is_fault(self) -> bool {
        matches!(self, Self::Fault)
    }
}

/// What the accept loop does after a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    /// Accept the next connection.
    Continue,
    /// Stop accepting and return from [`Server::run`].
    Stop(Shutdown),
}

/// A bound server owning its registry and state.
#[derive(Debug)]
pub struct Server<S> {
    /// Endpoint clients connect to.
    listener: Listener,
    /// Entry points, fixed for the server's lifetime.
    registry: Registry<S>,
    /// State shared by every call.
    state: S,
}

impl<S> Server<S> {
    /// Binds the endpoint at `path`.
    ///
    /// A stale socket file is replaced; a live server on the same path is
    /// an error.
    pub async fn bind(path: impl AsRef<Path>, registry: Registry<S>, state: S) -> Result<Self> {
        let listener = Listener::bind(path).await?;
        tracing::info!(path = %listener.path().display(), "created socket");
        Ok(Self {
            listener,
            registry,
            state,
        })
    }

    /// Path of the socket file.
    pub fn path(&self) -> &Path {
        self.listener.path()
    }

    /// Serves connections until shutdown is requested, an entry point
    /// fails, or the process receives SIGINT/SIGTERM.
    ///
    /// The socket file is removed before this returns.
    pub async fn run(mut self) -> Result<Shutdown> {
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        tracing::info!(entry_points = self.registry.len(), "listening");

        loop {
            let stream = tokio::select! {
                accepted = self.listener.accept() => accepted?,
                _ = terminate.recv() => break,
                _ = interrupt.recv() => break,
            };
            if let Flow::Stop(reason) = self.serve(stream).await {
                return Ok(reason);
            }
        }

        tracing::info!("received signal, shutting down");
        self.listener.close();
        Ok(Shutdown::Signal)
    }

    /// Handles one connection from request to response.
    async fn serve(&mut self, stream: UnixStream) -> Flow {
        let (reader, writer) = stream.into_split();
        let mut r = BufReader::new(reader);
        let mut w = BufWriter::new(writer);

        let (mut resp, flow) = match resident_proto::recv::<Request, _>(&mut r).await {
            Ok(req) => self.dispatch(&req),
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::debug!("client disconnected before sending a request");
                return Flow::Continue;
            }
            Err(e) => {
                tracing::warn!(error = %e, "malformed request");
                (
                    Response::error(ErrorCode::Protocol, format!("malformed request: {e}")),
                    Flow::Continue,
                )
            }
        };

        if let Flow::Stop(reason) = flow {
            tracing::info!(?reason, "shutting down");
            self.listener.close();
            resp.stderr.extend_from_slice(SHUTDOWN_NOTICE);
        }
        if let Err(e) = respond(&mut w, &resp).await {
            tracing::warn!(error = %e, "failed to send response");
        }
        flow
    }

    /// Executes a decoded request.
    fn dispatch(&mut self, req: &Request) -> (Response, Flow) {
        if req.version != PROTOCOL_VERSION {
            let msg = format!(
                "client speaks protocol v{}, server speaks v{PROTOCOL_VERSION}",
                req.version
            );
            tracing::warn!("{msg}");
            return (Response::error(ErrorCode::Protocol, msg), Flow::Continue);
        }
        if req.is_exit() {
            return (Response::stopped(), Flow::Stop(Shutdown::Requested));
        }

        let entry = match self.registry.resolve(&req.function) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(function = %req.function, "unknown entry point");
                return (
                    Response::error(ErrorCode::UnknownEntryPoint, e.to_string()),
                    Flow::Continue,
                );
            }
        };

        tracing::debug!(function = %req.function, args = req.args.len(), "invoking");
        // Outside the capture: skipped-variable warnings belong to the log.
        let env = EnvScope::apply(&req.env);
        let capture = match Capture::begin() {
            Ok(capture) => capture,
            Err(e) => {
                tracing::error!(error = %e, "failed to redirect output");
                return (
                    Response::error(ErrorCode::Internal, format!("failed to capture output: {e}")),
                    Flow::Continue,
                );
            }
        };

        let mut call = Call::new(&req.function, &req.args);
        let result = panic::catch_unwind(AssertUnwindSafe(|| entry(&mut self.state, &mut call)));

        let finished = capture.finish();
        drop(env);
        let output = match finished {
            Ok(output) => output,
            Err(e) => {
                // fds 1/2 may still point at the sink; nothing later is trustworthy.
                tracing::error!(error = %e, "failed to restore output");
                return (
                    Response::error(ErrorCode::Internal, format!("failed to restore output: {e}")),
                    Flow::Stop(Shutdown::Fault),
                );
            }
        };

        let function = call.function();
        let fault = match result {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(format!("`{function}` failed: {e:#}")),
            Err(payload) => Some(format!(
                "`{function}` panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        tracing::debug!(
            function,
            stdout = output.stdout.len(),
            stderr = output.stderr.len(),
            "call completed"
        );

        let mut resp = Response::ok(output.stdout, output.stderr);
        match fault {
            Some(message) => {
                tracing::error!(function, "{message}");
                resp.outcome = Outcome::Error(ErrorInfo::new(ErrorCode::CalleeFault, message));
                (resp, Flow::Stop(Shutdown::Fault))
            }
            None if call.shutdown_requested() => (resp, Flow::Stop(Shutdown::Requested)),
            None => (resp, Flow::Continue),
        }
    }
}

/// Writes `resp`, replacing it with an error if it cannot be framed.
async fn respond<W>(w: &mut W, resp: &Response) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match resident_proto::send(w, resp).await {
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            let fallback =
                Response::error(ErrorCode::Internal, format!("response not deliverable: {e}"));
            resident_proto::send(w, &fallback).await?;
        }
        result => result?,
    }
    w.flush().await
}

/// Best-effort text of a panic payload.
fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
