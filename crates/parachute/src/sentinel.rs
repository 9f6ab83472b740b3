//! # Sentinel Classifier
//!
//! Some panics are not faults but instructions: "abort this handler and let
//! the transport hang up". The classifier recognizes them so the invoker can
//! re-raise them instead of converting them into an error response.
//!
//! The registry is explicit. `Sentinels::default()` knows `AbortHandler`;
//! transports that define their own abort signals register them alongside it.

use std::any::Any;
use std::fmt;

/// The abort sentinel.
///
/// A handler raising this payload wants the stream reset without any further
/// response, e.g. because the response it was writing can no longer be
/// trusted. It is never handed to a recovery policy.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AbortHandler;

impl fmt::Display for AbortHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("abort handler")
    }
}

/// Aborts the current handler, resetting its stream.
pub fn abort_handler() -> ! {
    std::panic::panic_any(AbortHandler)
}

/// Decides whether a payload matches one sentinel.
pub type Matcher = fn(&(dyn Any + Send)) -> bool;

#[derive(Clone)]
struct Sentinel {
    name: &'static str,
    matches: Matcher,
}

/// A registry of payloads that must propagate past the recovery guard.
#[derive(Clone)]
pub struct Sentinels {
    entries: Vec<Sentinel>,
}

fn is_type<T: Any>(payload: &(dyn Any + Send)) -> bool {
    payload.is::<T>()
}

impl Sentinels {
    /// A registry that recognizes nothing; every panic is recovered.
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// Registers every payload of type `T` as a sentinel.
    pub fn with<T: Any + Send>(mut self) -> Self {
        self.register::<T>();
        self
    }

    pub fn register<T: Any + Send>(&mut self) {
        self.register_matcher(std::any::type_name::<T>(), is_type::<T>);
    }

    /// Registers a sentinel recognized by value rather than by type alone.
    pub fn register_matcher(&mut self, name: &'static str, matches: Matcher) {
        self.entries.push(Sentinel { name, matches });
    }

    /// Whether the payload was raised to reach the transport.
    ///
    /// Pure and total: any payload, including `()`, yields an answer.
    pub fn must_propagate(&self, payload: &(dyn Any + Send)) -> bool {
        self.entries.iter().any(|sentinel| (sentinel.matches)(payload))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|sentinel| sentinel.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Sentinels {
    fn default() -> Self {
        Self::empty().with::<AbortHandler>()
    }
}

impl fmt::Debug for Sentinels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}
