//! Transport backed by the embedded simulator's in-memory engine: sends
//! become inbound frames on the simulator's entry session, and payloads
//! the simulator emits on its exit session are delivered through the
//! receive callback.

use fixlab_common::codec::{encode, EncodeContext};
use fixlab_common::FixMessage;
use fixlab_simulator::config::SimulatorConfig;
use fixlab_simulator::memory::{MemoryEngineFactory, MemoryEngineHub, MemorySession};
use fixlab_verifier::error::TransportError;
use fixlab_verifier::online::{ReceiveCallback, Transport, TransportSessionConfig};
use std::sync::Arc;
use tracing::debug;

pub struct SimulatorTransport {
    factory: MemoryEngineFactory,
    sim_config: SimulatorConfig,
    callback: Option<ReceiveCallback>,
    entry_hub: Option<MemoryEngineHub>,
    entry: Option<Arc<MemorySession>>,
    next_seq: u32,
    closed: bool,
}

impl SimulatorTransport {
    pub fn new(factory: MemoryEngineFactory, sim_config: SimulatorConfig) -> Self {
        Self {
            factory,
            sim_config,
            callback: None,
            entry_hub: None,
            entry: None,
            next_seq: 0,
            closed: false,
        }
    }
}

impl Transport for SimulatorTransport {
    fn connect(&mut self, _config: &TransportSessionConfig) -> Result<(), TransportError> {
        let entry_endpoint = &self.sim_config.entry;
        let exit_endpoint = &self.sim_config.exit;

        let entry_hub = self
            .factory
            .hub_for(&entry_endpoint.listen_host, entry_endpoint.listen_port);
        let exit_hub = self
            .factory
            .hub_for(&exit_endpoint.listen_host, exit_endpoint.listen_port);

        let entry = entry_hub.open_session(entry_endpoint.session_key());
        let exit = exit_hub.open_session(exit_endpoint.session_key());
        if let Some(callback) = &self.callback {
            let callback = Arc::clone(callback);
            exit.set_outbound_listener(Arc::new(move |payload| {
                callback(FixMessage::parse(payload));
            }));
        }

        debug!(
            entry = %entry_endpoint.session_key(),
            exit = %exit_endpoint.session_key(),
            "Connected to embedded simulator"
        );
        self.entry_hub = Some(entry_hub);
        self.entry = Some(entry);
        self.closed = false;
        Ok(())
    }

    fn on_receive(&mut self, callback: ReceiveCallback) {
        self.callback = Some(callback);
    }

    fn send(&mut self, message: &FixMessage) -> Result<(), TransportError> {
        let (Some(hub), Some(entry)) = (&self.entry_hub, &self.entry) else {
            return Err(TransportError::Send("Transport not connected".to_string()));
        };
        self.next_seq += 1;
        // Frames arrive at the simulator as its remote counter-party.
        let ctx = EncodeContext::new(
            self.sim_config.begin_string.clone(),
            self.sim_config.entry.remote_comp_id.clone(),
            self.sim_config.entry.local_comp_id.clone(),
            self.next_seq,
        );
        let encoded = encode(message, &ctx).map_err(|e| TransportError::Send(e.to_string()))?;
        hub.inject(entry, &encoded.payload);
        Ok(())
    }

    fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.entry = None;
        self.entry_hub = None;
        self.closed = true;
        Ok(())
    }
}
