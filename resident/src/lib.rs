//! Call functions inside a long-running, stateful process from short-lived
//! clients.
//!
//! A server registers named entry points, binds a Unix socket and then
//! services one call at a time. Each call runs with the caller's environment
//! and with stdout/stderr captured; the captured bytes travel back to the
//! client, which re-emits them and exits. State held by the server survives
//! from one call to the next, so a shell script can drive in-memory logic as
//! if it were a series of ordinary commands.
//!
//! # Quick start
//!
//! ```no_run
//! use std::io::Write;
//!
//! use resident::{Call, Registry, Server};
//!
//! #[derive(Default)]
//! struct State {
//!     thing: Option<String>,
//! }
//!
//! # async fn serve() -> resident::Result<()> {
//! let mut registry = Registry::new();
//! registry.register("set_thing", |s: &mut State, call: &mut Call<'_>| {
//!     s.thing = Some(call.arg(0)?.to_owned());
//!     Ok(())
//! })?;
//! registry.register("get_thing", |s: &mut State, _: &mut Call<'_>| {
//!     writeln!(std::io::stdout(), "{}", s.thing.as_deref().unwrap_or(""))?;
//!     Ok(())
//! })?;
//!
//! let server = Server::bind("/tmp/demo.sock", registry, State::default()).await?;
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

mod capture;
mod client;
pub mod config;
mod environ;
mod error;
mod registry;
mod server;
pub mod telemetry;
#[cfg(test)]
mod test_support;
pub mod transport;

pub use capture::{Capture, Captured};
pub use client::{Client, request_from_process};
pub use environ::EnvScope;
pub use error::{Error, Result};
pub use registry::{Call, EntryPoint, Registry, RegistryError, UnknownEntryPoint};
pub use resident_proto::{
    EXIT_FUNCTION, ErrorCode, ErrorInfo, Outcome, PROTOCOL_VERSION, Request, Response,
};
pub use server::{Server, Shutdown};
