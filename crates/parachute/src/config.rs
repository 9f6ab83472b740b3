//! # Configuration
//!
//! Process-wide settings shared by every call a server runs. A `Config` is
//! immutable once built, so calls read it concurrently without locking.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::recover::DefaultPolicy;
use crate::recover::RecoverPolicy;
use crate::sentinel::Matcher;
use crate::sentinel::Sentinels;

pub const DEFAULT_STREAM_BUFFER: usize = 64;

struct ConfigInner {
    policy: Box<dyn RecoverPolicy>,
    sentinels: Sentinels,
    stream_buffer: usize,
}

/// Cheaply clonable, read-only server configuration.
#[derive(Clone)]
pub struct Config {
    inner: Arc<ConfigInner>,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn policy(&self) -> &dyn RecoverPolicy {
        &*self.inner.policy
    }

    pub fn sentinels(&self) -> &Sentinels {
        &self.inner.sentinels
    }

    /// Frames buffered per direction on in-memory connections.
    pub fn stream_buffer(&self) -> usize {
        self.inner.stream_buffer
    }
}

impl Default for Config {
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("sentinels", &self.inner.sentinels)
            .field("stream_buffer", &self.inner.stream_buffer)
            .finish_non_exhaustive()
    }
}

/// Fluent builder for `Config`.
pub struct ConfigBuilder {
    policy: Option<Box<dyn RecoverPolicy>>,
    sentinels: Sentinels,
    stream_buffer: usize,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            policy: None,
            sentinels: Sentinels::default(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
        }
    }

    /// Sets the recovery policy. Without one, `DefaultPolicy` applies.
    pub fn recover(mut self, policy: impl RecoverPolicy) -> Self {
        self.policy = Some(Box::new(policy));
        self
    }

    /// Adds a payload type that must propagate instead of being recovered.
    pub fn sentinel<T: Any + Send>(mut self) -> Self {
        self.sentinels.register::<T>();
        self
    }

    pub fn sentinel_matcher(mut self, name: &'static str, matches: Matcher) -> Self {
        self.sentinels.register_matcher(name, matches);
        self
    }

    /// Replaces the whole sentinel registry, including the default entry.
    pub fn sentinels(mut self, sentinels: Sentinels) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn stream_buffer(mut self, frames: usize) -> Self {
        self.stream_buffer = frames.max(1);
        self
    }

    pub fn build(self) -> Config {
        Config {
            inner: Arc::new(ConfigInner {
                policy: self.policy.unwrap_or_else(|| Box::new(DefaultPolicy)),
                sentinels: self.sentinels,
                stream_buffer: self.stream_buffer,
            }),
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
