//! Protocol message types for client↔server calls.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol revision carried in every [`Request`].
pub const PROTOCOL_VERSION: u16 = 1;

/// Reserved function name that asks the server to shut down gracefully.
///
/// Recognized by the server before registry lookup; it can never be
/// registered as an entry point.
pub const EXIT_FUNCTION: &str = "exit";

/// A single call sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Must equal [`PROTOCOL_VERSION`] for the server to accept the call.
    pub version: u16,
    /// Name of the entry point to invoke.
    pub function: String,
    /// Positional arguments, in order.
    pub args: Vec<String>,
    /// The caller's environment, applied server-side for this call only.
    pub env: BTreeMap<String, String>,
}

impl Request {
    /// Creates a request for `function` with no arguments and an empty
    /// environment.
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            function: function.into(),
            args: Vec::new(),
            env: BTreeMap::new(),
        }
    }

    /// Sets the positional arguments.
    #[must_use]
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the environment snapshot.
    #[must_use]
    pub fn env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Returns `true` if this is the reserved shutdown call.
    pub fn is_exit(&self) -> bool {
        self.function == EXIT_FUNCTION
    }
}

/// The server's answer to a [`Request`].
///
/// Captured stdout and stderr are carried as separate byte buffers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Everything the entry point wrote to standard output.
    pub stdout: Vec<u8>,
    /// Everything the entry point wrote to standard error.
    pub stderr: Vec<u8>,
    /// How the call ended.
    pub outcome: Outcome,
}

impl Response {
    /// A successful response carrying captured output.
    pub fn ok(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            stdout,
            stderr,
            outcome: Outcome::Ok,
        }
    }

    /// Acknowledges a shutdown request.
    pub fn stopped() -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            outcome: Outcome::Stopped,
        }
    }

    /// An error response without captured output.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: Vec::new(),
            outcome: Outcome::Error(ErrorInfo::new(code, message)),
        }
    }

    /// Returns the error detail, if the call failed.
    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match &self.outcome {
            Outcome::Error(info) => Some(info),
            Outcome::Ok | Outcome::Stopped => None,
        }
    }
}

/// Terminal status of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Outcome {
    /// The entry point returned normally.
    Ok,
    /// The server accepted a shutdown request and will not accept further
    /// connections.
    Stopped,
    /// The call failed.
    Error(ErrorInfo),
}

/// Structured error carried in [`Outcome::Error`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Failure category.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl ErrorInfo {
    /// Creates a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Failure categories a server can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The request frame could not be decoded or had the wrong version.
    /// Nothing was executed.
    Protocol,
    /// No entry point is registered under the requested name.
    UnknownEntryPoint,
    /// The entry point returned an error or panicked. The server stops
    /// after reporting it.
    CalleeFault,
    /// The server failed outside the entry point (e.g. output capture).
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protocol => "protocol error",
            Self::UnknownEntryPoint => "unknown entry point",
            Self::CalleeFault => "entry point failed",
            Self::Internal => "internal server error",
        })
    }
}
