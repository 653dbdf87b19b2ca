//! Command-line client for a resident server.
//!
//! `resident <entry-point> [ARGS...]` sends one call, re-emits the captured
//! output on its own stdout/stderr and exits with a status describing how
//! the call went.

#![allow(clippy::print_stderr, clippy::missing_docs_in_private_items)]

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use resident::{Client, ErrorCode, Outcome, Response, config};

/// Exit statuses, following `sysexits.h` where one fits.
mod status {
    /// The entry point returned an error or panicked.
    pub const CALLEE_FAULT: i32 = 1;
    /// No server is listening, or it went away mid-call.
    pub const UNAVAILABLE: i32 = 69;
    /// The server failed outside the entry point.
    pub const INTERNAL: i32 = 70;
    /// Request or response could not be decoded.
    pub const PROTOCOL: i32 = 76;
    /// The entry point is not registered (as a shell's "command not found").
    pub const UNKNOWN_ENTRY_POINT: i32 = 127;
}

/// Delay unit between connection attempts; the n-th retry waits n units.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Covers a server started in the background just before the first call,
/// giving up after about 4.5 s of waiting.
const DEFAULT_CONNECT_ATTEMPTS: u32 = 10;

#[derive(Parser)]
#[command(
    name = "resident",
    version,
    about = "Call an entry point in a running resident server"
)]
#[command(trailing_var_arg = true)]
struct Cli {
    /// Server socket [default: $RESIDENT_SOCKET, else $XDG_RUNTIME_DIR/resident.sock].
    #[arg(long, short = 's', value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Connection attempts while waiting for a server to come up.
    #[arg(
        long,
        value_name = "N",
        default_value_t = DEFAULT_CONNECT_ATTEMPTS,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    connect_attempts: u32,

    /// Print a completion script for SHELL and exit.
    #[arg(long, value_name = "SHELL", hide = true)]
    completions: Option<Shell>,

    /// Entry point name followed by its arguments.
    #[arg(
        required_unless_present = "completions",
        num_args = 1..,
        allow_hyphen_values = true,
        value_name = "ENTRY_POINT [ARGS]"
    )]
    call: Vec<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    resident::telemetry::init("warn");
    let code = match Cli::parse().run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("resident: {e:#}");
            failure_status(&e)
        }
    };
    std::process::exit(code);
}

impl Cli {
    async fn run(self) -> Result<i32> {
        if let Some(shell) = self.completions {
            clap_complete::generate(shell, &mut Self::command(), "resident", &mut io::stdout());
            return Ok(0);
        }

        let (function, args) = self.call.split_first().context("entry point required")?;
        let path = config::socket_path(self.socket);
        let req = resident::request_from_process(function.as_str(), args.iter().cloned());

        let client = Client::connect_with_retry(&path, self.connect_attempts, RETRY_BACKOFF, |n| {
            eprintln!(
                "resident: waiting for {} (attempt {n} of {})",
                path.display(),
                self.connect_attempts
            );
        })
        .await?;
        let resp = client.call(&req).await?;

        emit(&resp).context("failed to relay output")?;
        Ok(match &resp.outcome {
            Outcome::Ok | Outcome::Stopped => 0,
            Outcome::Error(info) => {
                eprintln!("resident: {}", info.message);
                error_status(info.code)
            }
            _ => status::INTERNAL,
        })
    }
}

/// Writes captured stdout, then captured stderr.
fn emit(resp: &Response) -> io::Result<()> {
    let mut out = io::stdout().lock();
    out.write_all(&resp.stdout)?;
    out.flush()?;
    let mut err = io::stderr().lock();
    err.write_all(&resp.stderr)?;
    err.flush()
}

fn error_status(code: ErrorCode) -> i32 {
    match code {
        ErrorCode::CalleeFault => status::CALLEE_FAULT,
        ErrorCode::UnknownEntryPoint => status::UNKNOWN_ENTRY_POINT,
        ErrorCode::Protocol => status::PROTOCOL,
        _ => status::INTERNAL,
    }
}

fn failure_status(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<resident::Error>() {
        Some(resident::Error::Unavailable { .. } | resident::Error::Disconnected) => {
            status::UNAVAILABLE
        }
        Some(resident::Error::Io(io)) if io.kind() == io::ErrorKind::InvalidData => {
            status::PROTOCOL
        }
        _ => status::INTERNAL,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_after_entry_point_are_verbatim() {
        let cli = Cli::try_parse_from(["resident", "-s", "/x.sock", "echo", "-n", "--socket", "y"])
            .unwrap();
        assert_eq!(cli.socket, Some(PathBuf::from("/x.sock")));
        assert_eq!(cli.call, vec!["echo", "-n", "--socket", "y"]);
        assert_eq!(cli.connect_attempts, DEFAULT_CONNECT_ATTEMPTS);
    }

    #[test]
    fn entry_point_is_required() {
        assert!(Cli::try_parse_from(["resident"]).is_err());
        assert!(Cli::try_parse_from(["resident", "--connect-attempts", "0", "x"]).is_err());
    }

    #[test]
    fn statuses_are_distinct() {
        let codes = [
            error_status(ErrorCode::CalleeFault),
            error_status(ErrorCode::UnknownEntryPoint),
            error_status(ErrorCode::Protocol),
            error_status(ErrorCode::Internal),
            status::UNAVAILABLE,
        ];
        for (i, a) in codes.iter().enumerate() {
            assert_ne!(*a, 0);
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn transport_failures_map_to_unavailable() {
        let unavailable = anyhow::Error::from(resident::Error::Unavailable {
            path: PathBuf::from("/nowhere.sock"),
            source: io::Error::from(io::ErrorKind::NotFound),
        });
        assert_eq!(failure_status(&unavailable), status::UNAVAILABLE);

        let gone = anyhow::Error::from(resident::Error::Disconnected);
        assert_eq!(failure_status(&gone), status::UNAVAILABLE);

        let garbled = anyhow::Error::from(resident::Error::Io(io::Error::from(
            io::ErrorKind::InvalidData,
        )));
        assert_eq!(failure_status(&garbled), status::PROTOCOL);
    }
}
