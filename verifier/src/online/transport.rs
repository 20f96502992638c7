use crate::error::TransportError;
use fixlab_common::{FixMessage, SessionKey};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Callback invoked by the transport from an unspecified worker thread.
/// Implementations must only filter and enqueue.
pub type ReceiveCallback = Arc<dyn Fn(FixMessage) + Send + Sync>;

/// Session endpoints and free-form properties handed to a transport at
/// connect time. Property names follow the conventional FIX engine keys
/// (`host`, `port`, `beginString`, `resetSeqNum`, ...).
#[derive(Debug, Clone)]
pub struct TransportSessionConfig {
    pub entry_session: SessionKey,
    pub exit_session: SessionKey,
    pub properties: BTreeMap<String, String>,
}

impl TransportSessionConfig {
    pub fn new(entry_session: SessionKey, exit_session: SessionKey) -> Self {
        Self {
            entry_session,
            exit_session,
            properties: BTreeMap::new(),
        }
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn property_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.property(key).unwrap_or(default)
    }
}

/// Abstract FIX transport driven by the online runner. `close` must be
/// idempotent; `send` may block.
pub trait Transport: Send {
    fn connect(&mut self, config: &TransportSessionConfig) -> Result<(), TransportError>;
    fn on_receive(&mut self, callback: ReceiveCallback);
    fn send(&mut self, message: &FixMessage) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Constructor for a named transport implementation.
pub type TransportFactory = Box<dyn Fn() -> Box<dyn Transport> + Send + Sync>;

/// Explicit registry of transport factories. Replaces reflective class
/// loading: callers register constructors under a name and the CLI looks
/// them up per run.
#[derive(Default)]
pub struct TransportRegistry {
    factories: BTreeMap<String, TransportFactory>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, factory: TransportFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| TransportError::UnknownFactory(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}
