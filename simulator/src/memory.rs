//! In-process engine backend. Stands in for a real FIX engine in tests
//! and when the simulator is embedded next to the online runner: callers
//! open sessions, inject inbound frames and observe outbound payloads
//! through a shared hub, while the simulator polls it like any engine.

use crate::engine::{
    BackendFactory, EngineBackend, EngineEvent, EngineSession, EventHandler, RouteAction,
    RuntimeBinding,
};
use crate::error::SimResult;
use fixlab_common::SessionKey;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Listener invoked with every payload accepted by `try_send`.
pub type OutboundListener = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One in-memory FIX session.
pub struct MemorySession {
    id: Uuid,
    key: SessionKey,
    connected: AtomicBool,
    last_sent_seq: AtomicU32,
    /// Remaining `try_send` calls to reject with backpressure.
    backpressure_remaining: AtomicI64,
    sent: Mutex<Vec<SentRecord>>,
    listener: Mutex<Option<OutboundListener>>,
    inbound: Mutex<VecDeque<Vec<u8>>>,
}

/// One accepted outbound payload.
#[derive(Debug, Clone)]
pub struct SentRecord {
    pub payload: Vec<u8>,
    pub msg_seq_num: u32,
    pub packed_type: u64,
}

impl MemorySession {
    fn new(key: SessionKey) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            connected: AtomicBool::new(true),
            last_sent_seq: AtomicU32::new(0),
            backpressure_remaining: AtomicI64::new(0),
            sent: Mutex::new(Vec::new()),
            listener: Mutex::new(None),
            inbound: Mutex::new(VecDeque::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Payloads accepted so far, oldest first.
    pub fn sent(&self) -> Vec<SentRecord> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Reject the next `count` sends with backpressure.
    pub fn push_back_next_sends(&self, count: i64) {
        self.backpressure_remaining.store(count, Ordering::SeqCst);
    }

    pub fn set_outbound_listener(&self, listener: OutboundListener) {
        *self.listener.lock() = Some(listener);
    }
}

impl EngineSession for MemorySession {
    fn session_key(&self) -> SessionKey {
        self.key.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn prepare(&self) -> u32 {
        self.last_sent_seq.load(Ordering::SeqCst).saturating_add(1).max(1)
    }

    fn try_send(&self, payload: &[u8], msg_seq_num: u32, packed_type: u64) -> i64 {
        if !self.is_connected() {
            return 0;
        }
        if self.backpressure_remaining.fetch_sub(1, Ordering::SeqCst) > 0 {
            return 0;
        }
        self.last_sent_seq.store(msg_seq_num, Ordering::SeqCst);
        let record = SentRecord {
            payload: payload.to_vec(),
            msg_seq_num,
            packed_type,
        };
        self.sent.lock().push(record);
        if let Some(listener) = self.listener.lock().as_ref() {
            listener(payload);
        }
        payload.len() as i64
    }
}

/// Control event queued for delivery on the next poll.
enum Control {
    Acquired(Arc<MemorySession>),
    Readable(SessionKey),
    Disconnected(SessionKey),
}

struct HubState {
    library_announced: bool,
    sessions: Vec<Arc<MemorySession>>,
    controls: VecDeque<Control>,
}

/// Shared control surface of one in-memory engine runtime.
#[derive(Clone)]
pub struct MemoryEngineHub {
    state: Arc<Mutex<HubState>>,
}

impl MemoryEngineHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(HubState {
                library_announced: false,
                sessions: Vec::new(),
                controls: VecDeque::new(),
            })),
        }
    }

    /// Accept a new session with the given identity; the simulator sees
    /// a `SessionAcquired` on its next poll.
    pub fn open_session(&self, key: SessionKey) -> Arc<MemorySession> {
        let session = Arc::new(MemorySession::new(key));
        let mut state = self.state.lock();
        state.sessions.push(Arc::clone(&session));
        state.controls.push_back(Control::Acquired(Arc::clone(&session)));
        session
    }

    pub fn disconnect(&self, session: &Arc<MemorySession>) {
        session.connected.store(false, Ordering::SeqCst);
        self.state
            .lock()
            .controls
            .push_back(Control::Disconnected(session.session_key()));
    }

    pub fn reconnect(&self, session: &Arc<MemorySession>) {
        session.connected.store(true, Ordering::SeqCst);
        self.state
            .lock()
            .controls
            .push_back(Control::Readable(session.session_key()));
    }

    /// Queue an inbound frame on a session; it reaches the handler on a
    /// later poll and stays at the head while the handler aborts.
    pub fn inject(&self, session: &Arc<MemorySession>, payload: &[u8]) {
        session.inbound.lock().push_back(payload.to_vec());
    }
}

impl Default for MemoryEngineHub {
    fn default() -> Self {
        Self::new()
    }
}

/// The backend half of the hub, owned by one simulator runtime.
pub struct MemoryEngine {
    hub: MemoryEngineHub,
    started: bool,
}

impl MemoryEngine {
    pub fn new(hub: MemoryEngineHub) -> Self {
        Self {
            hub,
            started: false,
        }
    }
}

impl EngineBackend for MemoryEngine {
    fn start(&mut self) -> SimResult<()> {
        self.started = true;
        Ok(())
    }

    fn poll(&mut self, fragment_limit: usize, handler: &mut dyn EventHandler) -> usize {
        if !self.started {
            return 0;
        }
        let mut work = 0usize;

        // Library handshake and control events come before traffic.
        let controls: Vec<Control> = {
            let mut state = self.hub.state.lock();
            if !state.library_announced {
                state.library_announced = true;
                drop(state);
                handler.on_event(EngineEvent::LibraryConnected);
                work += 1;
                self.hub.state.lock().controls.drain(..).collect()
            } else {
                state.controls.drain(..).collect()
            }
        };
        for control in controls {
            let event = match control {
                Control::Acquired(session) => EngineEvent::SessionAcquired(session),
                Control::Readable(key) => EngineEvent::SessionReadable(key),
                Control::Disconnected(key) => EngineEvent::SessionDisconnected(key),
            };
            handler.on_event(event);
            work += 1;
        }

        // Inbound frames, bounded by the fragment limit. An aborted
        // frame stays at the head of its session queue for redelivery.
        let sessions: Vec<Arc<MemorySession>> = self.hub.state.lock().sessions.clone();
        for session in sessions {
            while work < fragment_limit.max(1) {
                let Some(payload) = session.inbound.lock().front().cloned() else {
                    break;
                };
                let action = handler.on_event(EngineEvent::Inbound {
                    session: session.session_key(),
                    payload,
                });
                match action {
                    RouteAction::Continue => {
                        session.inbound.lock().pop_front();
                        work += 1;
                    }
                    RouteAction::Abort => return work,
                }
            }
        }
        work
    }

    fn close(&mut self) -> SimResult<()> {
        self.started = false;
        Ok(())
    }
}

/// Factory keeping one hub per listen binding, so each runtime polls
/// only its own endpoint's traffic. Tests and the embedded simulator
/// path reach sessions through `hub_for`.
#[derive(Clone, Default)]
pub struct MemoryEngineFactory {
    hubs: Arc<Mutex<std::collections::HashMap<(String, u16), MemoryEngineHub>>>,
}

impl MemoryEngineFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// The hub serving `host:port`, created on first use.
    pub fn hub_for(&self, host: &str, port: u16) -> MemoryEngineHub {
        self.hubs
            .lock()
            .entry((host.to_string(), port))
            .or_insert_with(MemoryEngineHub::new)
            .clone()
    }
}

impl BackendFactory for MemoryEngineFactory {
    fn create(&self, binding: &RuntimeBinding) -> SimResult<Box<dyn EngineBackend>> {
        let hub = self.hub_for(&binding.host, binding.port);
        Ok(Box::new(MemoryEngine::new(hub)))
    }
}
