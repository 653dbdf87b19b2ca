//! Name → callable table of externally invocable entry points.
//!
//! A [`Registry`] is filled once during server startup and then handed to
//! [`Server::bind`](crate::Server::bind), which owns it for the rest of the
//! process. Entry points receive the server's state by `&mut` and a
//! [`Call`] describing the current invocation.

use std::collections::BTreeMap;
use std::fmt;

use resident_proto::EXIT_FUNCTION;

/// Boxed entry-point callable operating on server state `S`.
pub type EntryPoint<S> = Box<dyn Fn(&mut S, &mut Call<'_>) -> anyhow::Result<()> + Send>;

/// Errors raised while registering entry points.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum RegistryError {
    /// An entry point with this name is already registered.
    #[error("entry point `{0}` is already registered")]
    Duplicate(String),
    /// The name is reserved for protocol-level control calls.
    #[error("`{0}` is reserved and cannot be registered")]
    Reserved(String),
    /// Entry-point names must be non-empty.
    #[error("entry point name must not be empty")]
    InvalidName,
}

/// Lookup failure for a name nobody registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntryPoint {
    /// The name that was requested.
    pub name: String,
    /// Names that are registered, sorted.
    pub known: Vec<String>,
}

impl fmt::Display for UnknownEntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\" is not a registered entry point.", self.name)?;
        if self.known.is_empty() {
            return f.write_str("\n\nNo entry points are registered.");
        }
        f.write_str("\n\nCurrently registered entry points are:")?;
        for name in &self.known {
            write!(f, "\n  • {name}")?;
        }
        Ok(())
    }
}

impl std::error::Error for UnknownEntryPoint {}

/// Process-wide table of entry points.
pub struct Registry<S> {
    /// Entry points keyed by name.
    entries: BTreeMap<String, EntryPoint<S>>,
}

impl<S> Registry<S> {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Registers `f` under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut S, &mut Call<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(RegistryError::InvalidName);
        }
        if name == EXIT_FUNCTION {
            return Err(RegistryError::Reserved(name));
        }
        if self.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate(name));
        }
        self.entries.insert(name, Box::new(f));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<F>(mut self, name: impl Into<String>, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(&mut S, &mut Call<'_>) -> anyhow::Result<()> + Send + 'static,
    {
        self.register(name, f)?;
        Ok(self)
    }

    /// Looks up the entry point registered under `name`.
    pub fn resolve(&self, name: &str) -> Result<&EntryPoint<S>, UnknownEntryPoint> {
        self.entries.get(name).ok_or_else(|| UnknownEntryPoint {
            name: name.to_owned(),
            known: self.names().map(str::to_owned).collect(),
        })
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of registered entry points.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S> Default for Registry<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> fmt::Debug for Registry<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("entries", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Context for a single entry-point invocation.
#[derive(Debug)]
pub struct Call<'a> {
    /// Name the client asked for.
    function: &'a str,
    /// Positional arguments from the client.
    args: &'a [String],
    /// Set when the entry point asks the server to stop.
    shutdown: bool,
}

impl<'a> Call<'a> {
    /// Creates the context for calling `function` with `args`.
    pub fn new(function: &'a str, args: &'a [String]) -> Self {
        Self {
            function,
            args,
            shutdown: false,
        }
    }

    /// Name of the invoked entry point.
    pub fn function(&self) -> &'a str {
        self.function
    }

    /// All positional arguments.
    pub fn args(&self) -> &'a [String] {
        self.args
    }

    /// The positional argument at `index`, or an error naming the entry
    /// point if the client supplied too few.
    pub fn arg(&self, index: usize) -> anyhow::Result<&'a str> {
        self.args.get(index).map(String::as_str).ok_or_else(|| {
            anyhow::anyhow!(
                "`{}` expects at least {} argument(s), got {}",
                self.function,
                index + 1,
                self.args.len()
            )
        })
    }

    /// Asks the server to stop accepting connections once this call's
    /// response has been sent.
    pub fn request_shutdown(&mut self) {
        self.shutdown = true;
    }

    /// Whether [`request_shutdown`](Self::request_shutdown) was called.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut u32, _: &mut Call<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn resolve_runs_registered_callable() {
        let mut reg = Registry::new();
        reg.register("bump", |n: &mut u32, call: &mut Call<'_>| {
            *n += call.arg(0)?.parse::<u32>()?;
            Ok(())
        })
        .unwrap();

        let mut state = 1;
        let args = vec!["41".to_owned()];
        let f = reg.resolve("bump").unwrap();
        f(&mut state, &mut Call::new("bump", &args)).unwrap();
        assert_eq!(state, 42);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut reg = Registry::new();
        reg.register("a", noop).unwrap();
        assert_eq!(
            reg.register("a", noop),
            Err(RegistryError::Duplicate("a".into()))
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn reserved_and_empty_names_are_rejected() {
        let mut reg = Registry::<u32>::new();
        assert_eq!(
            reg.register("exit", noop),
            Err(RegistryError::Reserved("exit".into()))
        );
        assert_eq!(reg.register("", noop), Err(RegistryError::InvalidName));
        assert!(reg.is_empty());
    }

    #[test]
    fn unknown_name_lists_known_entry_points() {
        let reg = Registry::new()
            .with("set_thing", noop)
            .and_then(|r| r.with("get_thing", noop))
            .unwrap();

        let Err(err) = reg.resolve("not_a_function") else {
            panic!("expected lookup failure");
        };
        assert_eq!(err.known, vec!["get_thing", "set_thing"]);
        let text = err.to_string();
        assert!(text.contains("\"not_a_function\" is not a registered entry point"));
        assert!(text.contains("  • get_thing\n  • set_thing"));
    }

    #[test]
    fn unknown_name_on_empty_registry() {
        let reg = Registry::<u32>::new();
        let Err(err) = reg.resolve("x") else {
            panic!("expected lookup failure");
        };
        assert!(err.to_string().ends_with("No entry points are registered."));
    }

    #[test]
    fn missing_argument_names_the_entry_point() {
        let args: Vec<String> = Vec::new();
        let call = Call::new("set_thing", &args);
        let err = call.arg(0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "`set_thing` expects at least 1 argument(s), got 0"
        );
    }

    #[test]
    fn shutdown_flag() {
        let args: Vec<String> = Vec::new();
        let mut call = Call::new("stop", &args);
        assert!(!call.shutdown_requested());
        call.request_shutdown();
        assert!(call.shutdown_requested());
    }
}
