//! Endpoint runtimes: the state machine each engine runtime walks
//! through and the background poll task that drives it.

use crate::engine::{EngineBackend, EngineEvent, EventHandler, RouteAction};
use crate::error::{ErrorCell, SimulatorError};
use crate::registry::SessionRegistry;
use crate::router::Router;
use fixlab_common::SessionKey;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Idle park between polls that returned no work.
const IDLE_PARK: Duration = Duration::from_millis(1);

/// Lifecycle of one engine runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Init,
    Starting,
    AwaitingSession,
    SessionOwned,
    Stopped,
}

/// Which endpoint identities a runtime serves. Single-port topology
/// shares one runtime between both roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeRole {
    Entry,
    Exit,
    Both,
}

impl RuntimeRole {
    pub fn covers_entry(self) -> bool {
        matches!(self, Self::Entry | Self::Both)
    }

    pub fn covers_exit(self) -> bool {
        matches!(self, Self::Exit | Self::Both)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Both => "shared",
        }
    }
}

/// State shared between a runtime's poll task and the simulator.
#[derive(Debug)]
pub struct RuntimeShared {
    role: RuntimeRole,
    state: Mutex<RuntimeState>,
    library_connected: AtomicBool,
}

impl RuntimeShared {
    pub fn new(role: RuntimeRole) -> Self {
        Self {
            role,
            state: Mutex::new(RuntimeState::Init),
            library_connected: AtomicBool::new(false),
        }
    }

    pub fn role(&self) -> RuntimeRole {
        self.role
    }

    pub fn state(&self) -> RuntimeState {
        *self.state.lock()
    }

    pub fn is_library_connected(&self) -> bool {
        self.library_connected.load(Ordering::SeqCst)
    }

    /// Validated transition; invalid ones are logged and refused.
    pub fn transition_to(&self, to: RuntimeState) -> bool {
        use RuntimeState::*;
        let mut state = self.state.lock();
        let valid = matches!(
            (*state, to),
            (Init, Starting)
                | (Starting, AwaitingSession)
                | (AwaitingSession, SessionOwned)
                | (SessionOwned, AwaitingSession)
                | (Init, Stopped)
                | (Starting, Stopped)
                | (AwaitingSession, Stopped)
                | (SessionOwned, Stopped)
        );
        if valid {
            debug!(role = self.role.label(), from = ?*state, to = ?to, "Runtime state change");
            *state = to;
        } else {
            warn!(role = self.role.label(), from = ?*state, to = ?to, "Invalid runtime transition");
        }
        valid
    }
}

/// Translates engine events into registry/router operations for one
/// runtime.
pub struct RuntimeHandler {
    role: RuntimeRole,
    entry_key: SessionKey,
    exit_key: SessionKey,
    registry: Arc<SessionRegistry>,
    router: Arc<Router>,
    shared: Arc<RuntimeShared>,
}

impl RuntimeHandler {
    pub fn new(
        role: RuntimeRole,
        entry_key: SessionKey,
        exit_key: SessionKey,
        registry: Arc<SessionRegistry>,
        router: Arc<Router>,
        shared: Arc<RuntimeShared>,
    ) -> Self {
        Self {
            role,
            entry_key,
            exit_key,
            registry,
            router,
            shared,
        }
    }

    fn owned_key(&self, key: &SessionKey) -> bool {
        (self.role.covers_entry() && *key == self.entry_key)
            || (self.role.covers_exit() && *key == self.exit_key)
    }
}

impl EventHandler for RuntimeHandler {
    fn on_event(&mut self, event: EngineEvent) -> RouteAction {
        match event {
            EngineEvent::LibraryConnected => {
                info!(role = self.role.label(), "Library connected");
                self.shared.transition_to(RuntimeState::AwaitingSession);
                self.shared.library_connected.store(true, Ordering::SeqCst);
                RouteAction::Continue
            }
            EngineEvent::SessionAcquired(session) => {
                let key = session.session_key();
                if self.role.covers_entry() && key == self.entry_key {
                    info!(session = %key, "Entry session acquired");
                    self.registry.set_entry(session);
                    if self.shared.state() == RuntimeState::AwaitingSession {
                        self.shared.transition_to(RuntimeState::SessionOwned);
                    }
                } else if self.role.covers_exit() && key == self.exit_key {
                    info!(session = %key, "Exit session acquired");
                    self.registry.set_exit(session);
                    if self.shared.state() == RuntimeState::AwaitingSession {
                        self.shared.transition_to(RuntimeState::SessionOwned);
                    }
                    self.router.on_exit_ready();
                } else {
                    info!(session = %key, "Observing non-matching session");
                    self.registry.observe_only(key);
                }
                RouteAction::Continue
            }
            EngineEvent::SessionReadable(key) => {
                if self.role.covers_exit() && key == self.exit_key {
                    debug!(session = %key, "Exit session readable, flushing");
                    if self.shared.state() == RuntimeState::AwaitingSession {
                        self.shared.transition_to(RuntimeState::SessionOwned);
                    }
                    self.router.on_exit_ready();
                }
                RouteAction::Continue
            }
            EngineEvent::SessionDisconnected(key) => {
                if self.owned_key(&key) {
                    warn!(session = %key, "Owned session disconnected");
                    if self.shared.state() == RuntimeState::SessionOwned {
                        self.shared.transition_to(RuntimeState::AwaitingSession);
                    }
                }
                RouteAction::Continue
            }
            EngineEvent::Inbound { session, payload } => {
                if self.role.covers_entry() && session == self.entry_key {
                    self.router.on_entry_message(&payload)
                } else {
                    // Observe-only and exit-side traffic is consumed
                    // silently.
                    self.registry.record_observed_frame(&session);
                    RouteAction::Continue
                }
            }
        }
    }
}

/// One runtime with its detached poll task.
pub struct EndpointRuntime {
    pub shared: Arc<RuntimeShared>,
    handle: Option<JoinHandle<()>>,
}

impl EndpointRuntime {
    /// Start the poll loop on a blocking thread. The task owns the
    /// backend, closes it after the loop exits, and parks ~1 ms when a
    /// poll returns no work.
    pub fn spawn(
        mut backend: Box<dyn EngineBackend>,
        mut handler: RuntimeHandler,
        shared: Arc<RuntimeShared>,
        running: Arc<AtomicBool>,
        fragment_limit: usize,
        errors: Arc<ErrorCell>,
    ) -> Self {
        shared.transition_to(RuntimeState::Starting);
        let task_shared = Arc::clone(&shared);
        let handle = tokio::task::spawn_blocking(move || {
            while running.load(Ordering::SeqCst) {
                let work = backend.poll(fragment_limit, &mut handler);
                if work == 0 {
                    std::thread::sleep(IDLE_PARK);
                }
            }
            if let Err(error) = backend.close() {
                errors.record(SimulatorError::Shutdown(error.to_string()));
            }
            task_shared.transition_to(RuntimeState::Stopped);
        });
        Self {
            shared,
            handle: Some(handle),
        }
    }

    pub fn take_handle(&mut self) -> Option<JoinHandle<()>> {
        self.handle.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let shared = RuntimeShared::new(RuntimeRole::Entry);
        assert!(shared.transition_to(RuntimeState::Starting));
        assert!(shared.transition_to(RuntimeState::AwaitingSession));
        assert!(shared.transition_to(RuntimeState::SessionOwned));
        assert!(shared.transition_to(RuntimeState::AwaitingSession));
        assert!(shared.transition_to(RuntimeState::SessionOwned));
        assert!(shared.transition_to(RuntimeState::Stopped));
    }

    #[test]
    fn test_invalid_transition_refused() {
        let shared = RuntimeShared::new(RuntimeRole::Entry);
        assert!(!shared.transition_to(RuntimeState::SessionOwned));
        assert_eq!(shared.state(), RuntimeState::Init);
    }

    #[test]
    fn test_role_coverage() {
        assert!(RuntimeRole::Both.covers_entry());
        assert!(RuntimeRole::Both.covers_exit());
        assert!(RuntimeRole::Entry.covers_entry());
        assert!(!RuntimeRole::Entry.covers_exit());
        assert!(!RuntimeRole::Exit.covers_entry());
    }
}
