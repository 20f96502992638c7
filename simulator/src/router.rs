//! Routing pipeline for entry-inbound frames: parse, admit, mutate,
//! then deliver to the exit session or hold in the bounded pending
//! queue. Backpressure propagates to the engine as `Abort`, which
//! redelivers the inbound frame.

use crate::config::{ObservabilityConfig, RoutingConfig, SimulatorConfig};
use crate::engine::{EngineSession, RouteAction};
use crate::error::{ErrorCell, SimulatorError};
use crate::mutation::MutationEngine;
use crate::registry::SessionRegistry;
use fixlab_common::codec::{encode, EncodeContext, SOH};
use fixlab_common::types::{is_admin_msg_type, tags};
use fixlab_common::FixMessage;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One message waiting for the exit session.
struct QueuedMessage {
    msg_type: String,
    fields: BTreeMap<u32, String>,
}

enum SendOutcome {
    Sent,
    Backpressure,
    /// Undeliverable (encode failure); recorded and discarded.
    Dropped,
}

pub struct Router {
    begin_string: String,
    exit_local_comp_id: String,
    exit_remote_comp_id: String,
    routing: RoutingConfig,
    observability: ObservabilityConfig,
    mutation: Option<MutationEngine>,
    registry: Arc<SessionRegistry>,
    errors: Arc<ErrorCell>,
    /// The routing lock: guards the pending queue across the poll
    /// thread(s), the exit-ready hook and the stop path.
    pending: Mutex<VecDeque<QueuedMessage>>,
    queue_depth: AtomicUsize,
    max_outbound_length: usize,
}

impl Router {
    pub fn new(
        config: &SimulatorConfig,
        mutation: Option<MutationEngine>,
        registry: Arc<SessionRegistry>,
        errors: Arc<ErrorCell>,
    ) -> Self {
        Self {
            begin_string: config.begin_string.clone(),
            exit_local_comp_id: config.exit.local_comp_id.clone(),
            exit_remote_comp_id: config.exit.remote_comp_id.clone(),
            routing: config.routing.clone(),
            observability: config.observability.clone(),
            mutation,
            registry,
            errors,
            pending: Mutex::new(VecDeque::new()),
            queue_depth: AtomicUsize::new(0),
            max_outbound_length: 8192,
        }
    }

    /// Observable queue depth; updated under the routing lock, read
    /// relaxed by diagnostics.
    pub fn queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    /// Handle one frame received on the entry session.
    pub fn on_entry_message(&self, payload: &[u8]) -> RouteAction {
        let normalized = normalize_delimiters(payload);
        let message = FixMessage::parse(&normalized);

        let Some(msg_type) = message.msg_type().map(str::to_string) else {
            warn!("Dropping entry frame without MsgType");
            return RouteAction::Continue;
        };
        if self.observability.log_inbound_outbound {
            debug!(msg_type, "Entry inbound");
        }
        if self.observability.log_fix_payloads {
            debug!(payload = %render_payload(&normalized), "Entry inbound payload");
        }

        if self.routing.drop_admin_messages && is_admin_msg_type(&msg_type) {
            debug!(msg_type, "Dropping admin message");
            return RouteAction::Continue;
        }
        if !self.routing.enabled_msg_types.is_empty()
            && !self.routing.enabled_msg_types.iter().any(|t| t == &msg_type)
        {
            debug!(msg_type, "Dropping message type not enabled for routing");
            return RouteAction::Continue;
        }

        let mut fields = message.into_fields();
        if let Some(engine) = &self.mutation {
            if let Err(error) = engine.apply(&msg_type, &mut fields) {
                self.errors.record(error.into());
                return RouteAction::Continue;
            }
        }
        if fields.get(&tags::MSG_TYPE).map_or(true, String::is_empty) {
            self.errors.record(SimulatorError::Protocol(
                "Mutation removed MsgType from routed message".to_string(),
            ));
            return RouteAction::Continue;
        }

        match self.registry.exit_if_connected() {
            Some(exit) => {
                if !self.flush_pending(exit.as_ref()) {
                    return RouteAction::Abort;
                }
                match self.send_to_exit(exit.as_ref(), &msg_type, &fields) {
                    SendOutcome::Sent => RouteAction::Continue,
                    SendOutcome::Backpressure => RouteAction::Abort,
                    SendOutcome::Dropped => RouteAction::Continue,
                }
            }
            None => {
                if self.routing.fail_if_exit_not_logged_on {
                    warn!(msg_type, "Exit session not logged on, dropping message");
                    self.errors.record(SimulatorError::ExitNotLoggedOn);
                    return RouteAction::Continue;
                }
                let mut pending = self.pending.lock();
                if pending.len() >= self.routing.max_queue_depth {
                    self.errors.record(SimulatorError::QueueOverflow {
                        depth: pending.len(),
                    });
                    return RouteAction::Abort;
                }
                pending.push_back(QueuedMessage { msg_type, fields });
                self.queue_depth.store(pending.len(), Ordering::Relaxed);
                debug!(depth = pending.len(), "Queued message while exit is away");
                RouteAction::Continue
            }
        }
    }

    /// Flush hook: the exit session connected or became writable again.
    pub fn on_exit_ready(&self) {
        if let Some(exit) = self.registry.exit_if_connected() {
            self.flush_pending(exit.as_ref());
        }
    }

    /// Drain the pending queue in FIFO order. Returns false when a send
    /// backpressured; the head message stays queued.
    fn flush_pending(&self, exit: &dyn EngineSession) -> bool {
        let mut pending = self.pending.lock();
        loop {
            let outcome = match pending.front() {
                None => return true,
                Some(front) => self.send_to_exit(exit, &front.msg_type, &front.fields),
            };
            match outcome {
                SendOutcome::Sent | SendOutcome::Dropped => {
                    pending.pop_front();
                    self.queue_depth.store(pending.len(), Ordering::Relaxed);
                }
                SendOutcome::Backpressure => return false,
            }
        }
    }

    fn send_to_exit(
        &self,
        exit: &dyn EngineSession,
        msg_type: &str,
        fields: &BTreeMap<u32, String>,
    ) -> SendOutcome {
        if self.routing.artificial_delay_ms > 0 {
            std::thread::sleep(Duration::from_millis(self.routing.artificial_delay_ms));
        }

        let message = FixMessage::from(fields.clone());
        let seq = exit.prepare();
        let mut ctx = EncodeContext::new(
            self.begin_string.clone(),
            self.exit_local_comp_id.clone(),
            self.exit_remote_comp_id.clone(),
            seq,
        );
        ctx.max_outbound_length = self.max_outbound_length;

        let encoded = match encode(&message, &ctx) {
            Ok(encoded) => encoded,
            Err(error) => {
                self.errors
                    .record(SimulatorError::Protocol(error.to_string()));
                return SendOutcome::Dropped;
            }
        };

        let code = exit.try_send(&encoded.payload, seq, encoded.packed_type);
        if code > 0 {
            if self.observability.log_inbound_outbound {
                debug!(msg_type, seq, "Exit outbound");
            }
            if self.observability.log_fix_payloads {
                debug!(payload = %render_payload(&encoded.payload), "Exit outbound payload");
            }
            SendOutcome::Sent
        } else {
            debug!(msg_type, seq, code, "Exit send backpressured");
            SendOutcome::Backpressure
        }
    }
}

/// Normalize any recognized field delimiter to SOH.
fn normalize_delimiters(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len());
    let mut i = 0;
    while i < payload.len() {
        match payload[i] {
            b'|' => {
                out.push(SOH);
                i += 1;
            }
            b'^' if payload.get(i + 1) == Some(&b'A') => {
                out.push(SOH);
                i += 2;
            }
            byte => {
                out.push(byte);
                i += 1;
            }
        }
    }
    out
}

fn render_payload(payload: &[u8]) -> String {
    payload
        .iter()
        .map(|&b| if b == SOH { '|' } else { b as char })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEngineHub, MemorySession};
    use crate::mutation::RuleSpec;
    use fixlab_common::codec::checksum_of;
    use fixlab_common::SessionKey;

    fn test_config() -> SimulatorConfig {
        serde_yaml::from_str(
            r#"
provider: artio
enabled: true
entry:
  listen_port: 9880
  local_comp_id: FIX_GATEWAY
  remote_comp_id: ENTRY_RACOMPID
exit:
  listen_port: 9881
  local_comp_id: FIX_GATEWAY
  remote_comp_id: EXIT_RACOMPID
routing:
  enabled_msg_types: ["D"]
  max_queue_depth: 2
"#,
        )
        .unwrap()
    }

    fn mutation_engine() -> MutationEngine {
        let specs: Vec<RuleSpec> = serde_yaml::from_str(
            r#"
- name: order-tagging
  when:
    msg_types: ["D"]
  actions:
    - action: PREFIX
      tag: 11
      value: "RA-"
    - action: SET
      tag: 9001
      value: "RAPID_ADDITION"
"#,
        )
        .unwrap();
        MutationEngine::compile(&specs, false).unwrap()
    }

    fn router_with_exit(
        config: &SimulatorConfig,
        mutation: Option<MutationEngine>,
    ) -> (Router, std::sync::Arc<MemorySession>, Arc<ErrorCell>) {
        let hub = MemoryEngineHub::new();
        let exit = hub.open_session(SessionKey::new("FIX_GATEWAY", "EXIT_RACOMPID"));
        let registry = Arc::new(SessionRegistry::new());
        registry.set_exit(exit.clone());
        let errors = Arc::new(ErrorCell::new());
        let router = Router::new(config, mutation, registry, Arc::clone(&errors));
        (router, exit, errors)
    }

    #[test]
    fn test_route_with_mutation() {
        let config = test_config();
        let (router, exit, errors) = router_with_exit(&config, Some(mutation_engine()));

        let action = router.on_entry_message(
            b"35=D|11=ORDER-001|55=IBM|54=1|60=20260228-12:00:00.000",
        );
        assert_eq!(action, RouteAction::Continue);
        assert!(!errors.is_set());

        let sent = exit.sent();
        assert_eq!(sent.len(), 1);
        let parsed = FixMessage::parse(&sent[0].payload);
        assert_eq!(parsed.msg_type(), Some("D"));
        assert_eq!(parsed.get(11), Some("RA-ORDER-001"));
        assert_eq!(parsed.get(9001), Some("RAPID_ADDITION"));
        assert_eq!(parsed.get(49), Some("FIX_GATEWAY"));
        assert_eq!(parsed.get(56), Some("EXIT_RACOMPID"));
        assert_eq!(parsed.get(34), Some("1"));

        // Framing recomputed on the way out.
        let declared: String = sent[0].payload[sent[0].payload.len() - 4..sent[0].payload.len() - 1]
            .iter()
            .map(|&b| b as char)
            .collect();
        let recomputed = checksum_of(&sent[0].payload).unwrap();
        assert_eq!(declared, format!("{recomputed:03}"));
    }

    #[test]
    fn test_admin_and_disabled_types_dropped() {
        let config = test_config();
        let (router, exit, _errors) = router_with_exit(&config, None);

        assert_eq!(router.on_entry_message(b"35=A|98=0"), RouteAction::Continue);
        assert_eq!(router.on_entry_message(b"35=8|11=X"), RouteAction::Continue);
        assert_eq!(exit.sent_count(), 0);
    }

    #[test]
    fn test_missing_msg_type_dropped() {
        let config = test_config();
        let (router, exit, _errors) = router_with_exit(&config, None);
        assert_eq!(router.on_entry_message(b"11=X|55=IBM"), RouteAction::Continue);
        assert_eq!(exit.sent_count(), 0);
    }

    #[test]
    fn test_queue_then_overflow() {
        let config = test_config();
        let registry = Arc::new(SessionRegistry::new());
        let errors = Arc::new(ErrorCell::new());
        let router = Router::new(&config, None, registry, Arc::clone(&errors));

        assert_eq!(router.on_entry_message(b"35=D|11=1"), RouteAction::Continue);
        assert_eq!(router.on_entry_message(b"35=D|11=2"), RouteAction::Continue);
        assert_eq!(router.queue_depth(), 2);
        // Third hits max_queue_depth=2.
        assert_eq!(router.on_entry_message(b"35=D|11=3"), RouteAction::Abort);
        assert!(errors.is_set());
        assert_eq!(router.queue_depth(), 2);
    }

    #[test]
    fn test_flush_preserves_fifo_on_reconnect() {
        let config = test_config();
        let hub = MemoryEngineHub::new();
        let exit = hub.open_session(SessionKey::new("FIX_GATEWAY", "EXIT_RACOMPID"));
        let registry = Arc::new(SessionRegistry::new());
        let errors = Arc::new(ErrorCell::new());
        let router = Router::new(&config, None, Arc::clone(&registry), errors);

        // Exit away: messages queue in arrival order.
        router.on_entry_message(b"35=D|11=first");
        router.on_entry_message(b"35=D|11=second");
        assert_eq!(exit.sent_count(), 0);

        registry.set_exit(exit.clone());
        router.on_exit_ready();

        let sent = exit.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(FixMessage::parse(&sent[0].payload).get(11), Some("first"));
        assert_eq!(FixMessage::parse(&sent[1].payload).get(11), Some("second"));
        assert_eq!(router.queue_depth(), 0);
    }

    #[test]
    fn test_backpressure_keeps_head_and_aborts() {
        let config = test_config();
        let (router, exit, _errors) = router_with_exit(&config, None);

        exit.push_back_next_sends(1);
        assert_eq!(router.on_entry_message(b"35=D|11=X"), RouteAction::Abort);
        assert_eq!(exit.sent_count(), 0);
        // Redelivery succeeds once the pressure clears.
        assert_eq!(router.on_entry_message(b"35=D|11=X"), RouteAction::Continue);
        assert_eq!(exit.sent_count(), 1);
    }

    #[test]
    fn test_queued_head_survives_failed_flush() {
        let config = test_config();
        let hub = MemoryEngineHub::new();
        let exit = hub.open_session(SessionKey::new("FIX_GATEWAY", "EXIT_RACOMPID"));
        let registry = Arc::new(SessionRegistry::new());
        let errors = Arc::new(ErrorCell::new());
        let router = Router::new(&config, None, Arc::clone(&registry), errors);

        router.on_entry_message(b"35=D|11=queued");
        registry.set_exit(exit.clone());

        exit.push_back_next_sends(1);
        // Flush fails, the queued message stays at the head, the new
        // inbound is pushed back to the engine.
        assert_eq!(router.on_entry_message(b"35=D|11=next"), RouteAction::Abort);
        assert_eq!(router.queue_depth(), 1);

        assert_eq!(router.on_entry_message(b"35=D|11=next"), RouteAction::Continue);
        let sent = exit.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(FixMessage::parse(&sent[0].payload).get(11), Some("queued"));
        assert_eq!(FixMessage::parse(&sent[1].payload).get(11), Some("next"));
    }

    #[test]
    fn test_fail_if_exit_not_logged_on() {
        let mut config = test_config();
        config.routing.fail_if_exit_not_logged_on = true;
        let registry = Arc::new(SessionRegistry::new());
        let errors = Arc::new(ErrorCell::new());
        let router = Router::new(&config, None, registry, Arc::clone(&errors));

        assert_eq!(router.on_entry_message(b"35=D|11=X"), RouteAction::Continue);
        assert_eq!(router.queue_depth(), 0);
        assert!(errors.is_set());
    }

    #[test]
    fn test_strict_mutation_failure_drops_message() {
        let config = test_config();
        let specs: Vec<RuleSpec> = serde_yaml::from_str(
            r#"
- name: needs-41
  actions:
    - action: PREFIX
      tag: 41
      value: "RA-"
"#,
        )
        .unwrap();
        let engine = MutationEngine::compile(&specs, true).unwrap();
        let (router, exit, errors) = router_with_exit(&config, Some(engine));

        assert_eq!(router.on_entry_message(b"35=D|11=X"), RouteAction::Continue);
        assert_eq!(exit.sent_count(), 0);
        assert!(errors.is_set());
    }

    #[test]
    fn test_exit_sequence_numbers_advance() {
        let config = test_config();
        let (router, exit, _errors) = router_with_exit(&config, None);
        router.on_entry_message(b"35=D|11=a");
        router.on_entry_message(b"35=D|11=b");
        let sent = exit.sent();
        assert_eq!(sent[0].msg_seq_num, 1);
        assert_eq!(sent[1].msg_seq_num, 2);
    }
}
