//! Online verification: inject entry messages into a live gateway over a
//! transport and collect the exit messages it emits, under a wall-clock
//! deadline and a bounded receive queue.

mod queue;
mod transport;

pub use queue::{receive_queue, QueueConsumer, QueueProducer};
pub use transport::{
    ReceiveCallback, Transport, TransportFactory, TransportRegistry, TransportSessionConfig,
};

use crate::compare::{CompareConfig, DiffReport};
use crate::error::{VerifyError, VerifyResult};
use crate::filter::MsgTypeFilter;
use crate::link::{discover, link_streams, LinkReport, LinkerConfig};
use crate::matching::match_streams;
use fixlab_common::types::entry::number_entries;
use fixlab_common::LogEntry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Granularity of the receive wait; the deadline is re-checked and the
/// cancellation flag observed at least this often.
const POLL_SLICE: Duration = Duration::from_millis(50);

/// Cooperative cancellation flag shared with whoever supervises the run.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Configuration of one online run.
#[derive(Debug, Clone)]
pub struct OnlineConfig {
    pub session: TransportSessionConfig,
    pub receive_timeout: Duration,
    pub queue_capacity: usize,
    pub filter: MsgTypeFilter,
    pub linker: LinkerConfig,
    pub compare: CompareConfig,
}

impl OnlineConfig {
    pub fn new(session: TransportSessionConfig) -> Self {
        Self {
            session,
            receive_timeout: Duration::from_millis(5_000),
            queue_capacity: 1_024,
            filter: MsgTypeFilter::allow_all(),
            linker: LinkerConfig::default(),
            compare: CompareConfig::default(),
        }
    }

    fn validate(&self) -> VerifyResult<()> {
        if self.queue_capacity == 0 {
            return Err(VerifyError::Config(
                "Online queue capacity must be positive".to_string(),
            ));
        }
        if self.receive_timeout.is_zero() {
            return Err(VerifyError::Config(
                "Online receive timeout must be positive".to_string(),
            ));
        }
        self.linker.validate()
    }
}

/// Outcome of one online run.
#[derive(Debug)]
pub struct OnlineRunResult {
    pub sent: usize,
    pub received: usize,
    pub dropped: u64,
    pub timed_out: bool,
    pub matched: usize,
    pub unmatched_expected: usize,
    pub unmatched_actual: usize,
    pub ambiguous: usize,
    pub report: DiffReport,
    pub link_report: LinkReport,
}

impl OnlineRunResult {
    pub fn passed(&self) -> bool {
        self.unmatched_expected == 0
            && self.unmatched_actual == 0
            && self.ambiguous == 0
            && self.dropped == 0
            && self.report.failed_messages() == 0
            && !self.timed_out
    }
}

/// Drive one online run: link, connect, send, drain, close, match.
///
/// The transport callback thread only filters and enqueues; this thread
/// owns everything else and never holds a lock across the wait. A
/// cancellation observed during the drain counts as a timeout; the
/// transport is still closed and matching still runs over whatever
/// arrived.
pub fn run_online(
    transport: &mut dyn Transport,
    entry: &[LogEntry],
    expected: &[LogEntry],
    config: &OnlineConfig,
    cancel: &CancelToken,
) -> VerifyResult<OnlineRunResult> {
    config.validate()?;

    let strategy = discover(entry, expected, &config.linker);
    let link_report = link_streams(entry, expected, strategy.clone(), &config.linker);

    let (producer, consumer) = receive_queue(config.queue_capacity, config.filter.clone());
    transport.on_receive(Arc::new(move |message| producer.offer(message)));

    let driven = drive(transport, entry, expected, config, cancel, &consumer);
    let close_result = transport.close();

    let (sent, received, timed_out) = driven?;
    if let Err(close_error) = close_result {
        // Cleanup failure after a successful run is the primary error.
        return Err(close_error.into());
    }

    let received_count = received.len();
    let actual = number_entries(received);
    let outcome = match_streams(
        expected,
        &actual,
        strategy,
        &config.linker,
        &config.compare,
        "online:",
    );

    let result = OnlineRunResult {
        sent,
        received: received_count,
        dropped: consumer.dropped(),
        timed_out,
        matched: outcome.matched,
        unmatched_expected: outcome.unmatched_expected,
        unmatched_actual: outcome.unmatched_actual,
        ambiguous: outcome.ambiguous,
        report: outcome.report,
        link_report,
    };
    info!(
        sent = result.sent,
        received = result.received,
        dropped = result.dropped,
        timed_out = result.timed_out,
        matched = result.matched,
        "Online run complete"
    );
    Ok(result)
}

/// Connect, send and drain. Close is the caller's responsibility so it
/// also runs when this fails; a send failure is fatal and suppresses the
/// subsequent close error.
fn drive(
    transport: &mut dyn Transport,
    entry: &[LogEntry],
    expected: &[LogEntry],
    config: &OnlineConfig,
    cancel: &CancelToken,
    consumer: &QueueConsumer,
) -> VerifyResult<(usize, Vec<fixlab_common::FixMessage>, bool)> {
    transport.connect(&config.session)?;

    let mut sent = 0usize;
    for item in entry {
        if !config.filter.accepts(&item.message) {
            continue;
        }
        transport.send(&item.message)?;
        sent += 1;
    }

    let deadline = Instant::now() + config.receive_timeout;
    let mut received = Vec::with_capacity(expected.len());
    let mut timed_out = false;
    while received.len() < expected.len() {
        if cancel.is_cancelled() {
            warn!("Online run cancelled, treating as timeout");
            timed_out = true;
            break;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            timed_out = true;
            break;
        }
        if let Some(message) = consumer.poll(remaining.min(POLL_SLICE)) {
            received.push(message);
        }
    }

    Ok((sent, received, timed_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use fixlab_common::{FixMessage, SessionKey};
    use std::sync::Mutex;

    fn entry_stream(payloads: &[&[u8]]) -> Vec<LogEntry> {
        number_entries(payloads.iter().map(|p| FixMessage::parse(p)).collect::<Vec<_>>())
    }

    fn session_config() -> TransportSessionConfig {
        TransportSessionConfig::new(
            SessionKey::new("CLIENT", "GW"),
            SessionKey::new("GW", "EXCHANGE"),
        )
    }

    /// Responds to each send with a scripted list of messages, delivered
    /// synchronously through the receive callback.
    struct ScriptedTransport {
        responses: Mutex<Vec<FixMessage>>,
        callback: Option<ReceiveCallback>,
        connected: bool,
        closes: usize,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<FixMessage>) -> Self {
            Self {
                responses: Mutex::new(responses),
                callback: None,
                connected: false,
                closes: 0,
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn connect(&mut self, _config: &TransportSessionConfig) -> Result<(), TransportError> {
            self.connected = true;
            Ok(())
        }

        fn on_receive(&mut self, callback: ReceiveCallback) {
            self.callback = Some(callback);
        }

        fn send(&mut self, _message: &FixMessage) -> Result<(), TransportError> {
            if let Some(callback) = &self.callback {
                for response in self.responses.lock().unwrap().drain(..) {
                    callback(response);
                }
            }
            Ok(())
        }

        fn close(&mut self) -> Result<(), TransportError> {
            self.connected = false;
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn test_online_happy_path() {
        let entry = entry_stream(&[b"8=FIX.4.4\x0135=D\x0111=ORD-1\x0155=MSFT\x0110=001\x01"]);
        let expected = entry_stream(&[b"35=D\x0111=ORD-1\x0155=MSFT\x0110=011\x01"]);
        let response = FixMessage::parse(b"35=D\x0111=ORD-1\x0155=MSFT\x0110=099\x01");

        let mut transport = ScriptedTransport::new(vec![response]);
        let mut config = OnlineConfig::new(session_config());
        config.receive_timeout = Duration::from_millis(500);
        config.queue_capacity = 8;

        let result =
            run_online(&mut transport, &entry, &expected, &config, &CancelToken::new()).unwrap();
        assert_eq!(result.sent, 1);
        assert_eq!(result.received, 1);
        assert_eq!(result.dropped, 0);
        assert_eq!(result.matched, 1);
        assert!(!result.timed_out);
        assert!(result.passed());
        assert_eq!(transport.closes, 1);
    }

    #[test]
    fn test_online_timeout_when_gateway_silent() {
        let entry = entry_stream(&[b"35=D\x0111=A\x01"]);
        let expected = entry_stream(&[b"35=D\x0111=A\x01"]);
        let mut transport = ScriptedTransport::new(vec![]);
        let mut config = OnlineConfig::new(session_config());
        config.receive_timeout = Duration::from_millis(80);

        let result =
            run_online(&mut transport, &entry, &expected, &config, &CancelToken::new()).unwrap();
        assert!(result.timed_out);
        assert_eq!(result.received, 0);
        assert_eq!(result.unmatched_expected, 1);
        assert!(!result.passed());
        assert_eq!(transport.closes, 1);
    }

    #[test]
    fn test_cancellation_treated_as_timeout() {
        let entry = entry_stream(&[b"35=D\x0111=A\x01"]);
        let expected = entry_stream(&[b"35=D\x0111=A\x01"]);
        let mut transport = ScriptedTransport::new(vec![]);
        let mut config = OnlineConfig::new(session_config());
        config.receive_timeout = Duration::from_secs(60);

        let cancel = CancelToken::new();
        cancel.cancel();
        let start = Instant::now();
        let result = run_online(&mut transport, &entry, &expected, &config, &cancel).unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(result.timed_out);
        assert_eq!(transport.closes, 1);
    }

    #[test]
    fn test_overflow_increments_dropped() {
        let entry = entry_stream(&[b"35=D\x0111=A\x01"]);
        let expected = entry_stream(&[b"35=D\x0111=A\x01"]);
        let responses = vec![
            FixMessage::parse(b"35=D\x0111=A\x01"),
            FixMessage::parse(b"35=D\x0111=B\x01"),
            FixMessage::parse(b"35=D\x0111=C\x01"),
        ];
        let mut transport = ScriptedTransport::new(responses);
        let mut config = OnlineConfig::new(session_config());
        config.receive_timeout = Duration::from_millis(200);
        config.queue_capacity = 1;

        let result =
            run_online(&mut transport, &entry, &expected, &config, &CancelToken::new()).unwrap();
        // All three responses land before the drain starts; one fits.
        assert_eq!(result.dropped, 2);
        assert!(!result.passed());
    }

    #[test]
    fn test_receive_filter_applies() {
        let entry = entry_stream(&[b"35=D\x0111=A\x01"]);
        let expected = entry_stream(&[b"35=D\x0111=A\x01"]);
        let responses = vec![
            FixMessage::parse(b"35=0\x01112=hb\x01"),
            FixMessage::parse(b"35=D\x0111=A\x01"),
        ];
        let mut transport = ScriptedTransport::new(responses);
        let mut config = OnlineConfig::new(session_config());
        config.receive_timeout = Duration::from_millis(500);
        config.filter = MsgTypeFilter::new(["D"]);

        let result =
            run_online(&mut transport, &entry, &expected, &config, &CancelToken::new()).unwrap();
        assert_eq!(result.received, 1);
        assert!(result.passed());
    }

    #[test]
    fn test_zero_capacity_is_config_error() {
        let entry = entry_stream(&[]);
        let expected = entry_stream(&[]);
        let mut transport = ScriptedTransport::new(vec![]);
        let mut config = OnlineConfig::new(session_config());
        config.queue_capacity = 0;
        assert!(matches!(
            run_online(&mut transport, &entry, &expected, &config, &CancelToken::new()),
            Err(VerifyError::Config(_))
        ));
    }
}
