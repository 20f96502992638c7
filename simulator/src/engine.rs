//! Abstraction over the FIX engine driving the simulator's endpoints.
//! The simulator never owns a concrete engine; it polls a backend for
//! events and talks to acquired sessions through `EngineSession`.

use crate::error::SimResult;
use fixlab_common::SessionKey;
use std::sync::Arc;

/// Verdict returned to the engine for one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    /// Frame fully handled; the engine advances.
    Continue,
    /// Backpressure: the engine must redeliver the same frame on a later
    /// poll. A backend that cannot redeliver loses the frame.
    Abort,
}

/// Engine-level handle to one acquired FIX session.
///
/// `try_send` follows the engine convention: a positive value is the
/// stream position of the accepted message, anything `<= 0` signals
/// backpressure or failure. `prepare` yields the sequence number the
/// next outbound message must carry (`max(1, last_sent + 1)`) without
/// advancing it; a successful `try_send` advances it.
pub trait EngineSession: Send + Sync {
    /// The (localCompId, remoteCompId) identity of the session.
    fn session_key(&self) -> SessionKey;

    fn is_connected(&self) -> bool;

    fn prepare(&self) -> u32;

    fn try_send(&self, payload: &[u8], msg_seq_num: u32, packed_type: u64) -> i64;
}

/// Events a backend surfaces during `poll`.
pub enum EngineEvent {
    /// The library client finished connecting to the engine.
    LibraryConnected,
    /// A session was accepted and handed to this runtime.
    SessionAcquired(Arc<dyn EngineSession>),
    /// A previously acquired session reconnected or became writable.
    SessionReadable(SessionKey),
    SessionDisconnected(SessionKey),
    /// One inbound application frame. The handler's verdict controls
    /// redelivery.
    Inbound {
        session: SessionKey,
        payload: Vec<u8>,
    },
}

/// Receiver of engine events during a poll.
pub trait EventHandler {
    fn on_event(&mut self, event: EngineEvent) -> RouteAction;
}

/// One engine runtime bound to a listen address. `poll` is non-blocking
/// and returns the number of work items processed; `close` tears down
/// library, engine and media driver in that order.
pub trait EngineBackend: Send {
    fn start(&mut self) -> SimResult<()>;

    fn poll(&mut self, fragment_limit: usize, handler: &mut dyn EventHandler) -> usize;

    fn close(&mut self) -> SimResult<()>;
}

/// Listen address a runtime binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBinding {
    pub host: String,
    pub port: u16,
}

/// Creates one backend per runtime the topology needs.
pub trait BackendFactory: Send + Sync {
    fn create(&self, binding: &RuntimeBinding) -> SimResult<Box<dyn EngineBackend>>;
}
