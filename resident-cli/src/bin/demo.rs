//! resident-demo: example server holding a little state between calls.
//!
//! ```sh
//! resident-demo &
//! resident set_thing bar
//! resident get_thing      # prints "bar"
//! resident exit
//! ```

#![allow(
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::missing_docs_in_private_items
)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use resident::{Call, Registry, RegistryError, Server, Shutdown, config};

#[derive(Parser)]
#[command(
    name = "resident-demo",
    version,
    about = "Example resident server with a few stateful entry points"
)]
struct Args {
    /// Socket to listen on [default: $RESIDENT_SOCKET, else $XDG_RUNTIME_DIR/resident.sock].
    #[arg(long, short = 's', value_name = "PATH")]
    socket: Option<PathBuf>,
}

/// Everything the demo remembers between calls.
#[derive(Debug, Default)]
struct DemoState {
    thing: Option<String>,
    counter: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    resident::telemetry::init("info");
    match serve(Args::parse()).await {
        Ok(shutdown) if shutdown.is_fault() => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            eprintln!("resident-demo: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn serve(args: Args) -> Result<Shutdown> {
    let path = config::socket_path(args.socket);
    let server = Server::bind(&path, registry()?, DemoState::default())
        .await
        .with_context(|| format!("cannot listen on {}", path.display()))?;
    Ok(server.run().await?)
}

fn registry() -> Result<Registry<DemoState>, RegistryError> {
    Registry::new()
        .with("set_thing", set_thing)?
        .with("get_thing", get_thing)?
        .with("echo", echo)?
        .with("getenv", getenv)?
        .with("warn", warn)?
        .with("count", count)?
        .with("fail", fail)?
        .with("stop", stop)
}

fn set_thing(state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    state.thing = Some(call.arg(0)?.to_owned());
    Ok(())
}

fn get_thing(state: &mut DemoState, _call: &mut Call<'_>) -> Result<()> {
    let thing = state
        .thing
        .as_deref()
        .context("THING has not been set; call set_thing first")?;
    println!("{thing}");
    Ok(())
}

/// Prints the arguments joined by single spaces.
fn echo(_state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    println!("{}", call.args().join(" "));
    Ok(())
}

/// Prints a variable from the caller's environment (empty if unset).
fn getenv(_state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    let value = std::env::var(call.arg(0)?).unwrap_or_default();
    println!("{value}");
    Ok(())
}

fn warn(_state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    eprintln!("{}", call.args().join(" "));
    Ok(())
}

fn count(state: &mut DemoState, _call: &mut Call<'_>) -> Result<()> {
    state.counter += 1;
    println!("{}", state.counter);
    Ok(())
}

fn fail(_state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    eprintln!("about to fail");
    anyhow::bail!("requested failure ({} argument(s))", call.args().len())
}

fn stop(_state: &mut DemoState, call: &mut Call<'_>) -> Result<()> {
    println!("stopping");
    call.request_shutdown();
    Ok(())
}
