//! Realtime subscription session.
//!
//! A [`RealtimeSession`] owns one live broker connection, its state flag,
//! and the notification log — there is no process-global connection state;
//! consumers hold the session and observe it. A background driver task
//! dials the transport, performs the STOMP handshake, subscribes to the
//! five fixed topics once (and only once) the broker reports CONNECTED,
//! and fans incoming messages out to per-topic broadcast channels.
//!
//! Failure handling is deliberately asymmetric:
//!
//! - **Broker-level errors** (STOMP ERROR frames) consume bounded
//!   reconnection attempts at a fixed delay. Exhausting the budget is an
//!   observable terminal state ([`ConnectionState::Exhausted`]) with a
//!   [`SessionEvent::RetriesExhausted`] event, never a silent stop.
//! - **Transport-level failures** never touch the attempt counter;
//!   recovery is governed solely by the transport's own reconnect delay.

use crate::frame::{Command, Frame};
use crate::log::MessageLog;
use crate::reconnect::ReconnectPolicy;
use crate::topic::{Notification, Topic};
use crate::transport::{BrokerLink, BrokerTransport, WebSocketTransport};
use crate::RealtimeError;
use chrono::Utc;
use freightline_core::config::RealtimeConfig;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none in progress.
    Idle,
    /// Dialing and handshaking with the broker.
    Connecting,
    /// Handshake complete; subscriptions are live.
    Connected,
    /// The connection closed cleanly.
    Disconnected,
    /// The connection failed.
    Errored,
    /// Reconnection attempts are exhausted; terminal until the next
    /// explicit `connect()`.
    Exhausted,
}

/// Events published on the session's broadcast channel.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A push message arrived (also delivered on its topic channel).
    Message(Notification),
    /// The reconnection budget is spent; no further attempts will be made.
    RetriesExhausted {
        /// Attempts made before giving up.
        attempts: u32,
    },
}

/// Owned realtime subscription session with explicit lifecycle.
pub struct RealtimeSession {
    shared: Arc<Shared>,
    shutdown_tx: watch::Sender<bool>,
    driver: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    config: RealtimeConfig,
    host: String,
    transport: Arc<dyn BrokerTransport>,
    state_tx: watch::Sender<ConnectionState>,
    state_rx: watch::Receiver<ConnectionState>,
    log: Mutex<MessageLog>,
    policy: Mutex<ReconnectPolicy>,
    events_tx: broadcast::Sender<SessionEvent>,
    topic_txs: HashMap<Topic, broadcast::Sender<Notification>>,
}

impl RealtimeSession {
    /// Session over a WebSocket transport built from `config`.
    pub fn new(config: RealtimeConfig) -> Result<Self, RealtimeError> {
        let transport = Arc::new(WebSocketTransport::new(&config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Session over an injected transport (tests, alternative stacks).
    pub fn with_transport(config: RealtimeConfig, transport: Arc<dyn BrokerTransport>) -> Self {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (shutdown_tx, _) = watch::channel(false);
        let topic_txs = Topic::ALL
            .iter()
            .map(|topic| (*topic, broadcast::channel(EVENT_CHANNEL_CAPACITY).0))
            .collect();
        let host = Url::parse(&config.endpoint)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        let log = MessageLog::new(config.log_capacity);
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts);

        Self {
            shared: Arc::new(Shared {
                config,
                host,
                transport,
                state_tx,
                state_rx,
                log: Mutex::new(log),
                policy: Mutex::new(policy),
                events_tx,
                topic_txs,
            }),
            shutdown_tx,
            driver: parking_lot::Mutex::new(None),
        }
    }

    /// Open the broker connection.
    ///
    /// Idempotent: while a connection is live or in progress this is a
    /// no-op, so calling twice cannot open two connections or duplicate
    /// subscriptions. Must be called from within a Tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();

        if matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Connected
        ) {
            debug!("realtime session already active");
            return;
        }
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!("realtime driver already running");
            return;
        }

        self.shutdown_tx.send_replace(false);
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shutdown_tx.subscribe();
        *driver = Some(tokio::spawn(run_driver(shared, shutdown_rx)));
    }

    /// Close the connection and return to [`ConnectionState::Idle`].
    /// Safe to call when already idle.
    pub async fn disconnect(&self) {
        let handle = { self.driver.lock().take() };
        if let Some(handle) = handle {
            self.shutdown_tx.send_replace(true);
            let _ = handle.await;
        }
        self.shared.set_state(ConnectionState::Idle);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_rx.borrow()
    }

    /// Watch channel following every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_rx.clone()
    }

    /// Subscribe to all session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Subscribe to the `{topic}-updated` notification stream of one topic.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Notification> {
        self.shared.topic_txs[&topic].subscribe()
    }

    /// The last `count` notifications in arrival order; `None` means the
    /// default window of ten.
    pub async fn recent_messages(&self, count: Option<usize>) -> Vec<Notification> {
        let count = count.unwrap_or(MessageLog::DEFAULT_RECENT);
        self.shared.log.lock().await.recent(count)
    }

    /// Empty the notification log unconditionally.
    pub async fn clear_messages(&self) {
        self.shared.log.lock().await.clear();
    }

    /// Reconnection attempts claimed since the last successful connect.
    pub async fn reconnect_attempts(&self) -> u32 {
        self.shared.policy.lock().await.attempts()
    }
}

impl Drop for RealtimeSession {
    fn drop(&mut self) {
        // No live connection may outlive the owning session.
        if let Some(handle) = self.driver.lock().take() {
            handle.abort();
        }
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let changed = self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        if changed {
            debug!(state = ?next, "realtime session state changed");
            let _ = self.events_tx.send(SessionEvent::StateChanged(next));
        }
    }

    fn dispatch(&self, notification: Notification) {
        debug!(
            event = %notification.event_name(),
            bytes = notification.payload.len(),
            "dispatching notification"
        );
        if let Some(tx) = self.topic_txs.get(&notification.topic) {
            let _ = tx.send(notification.clone());
        }
        let _ = self.events_tx.send(SessionEvent::Message(notification));
    }
}

async fn run_driver(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let retry_delay = shared.config.retry_delay();

    'dial: loop {
        if *shutdown.borrow() {
            break;
        }
        shared.set_state(ConnectionState::Connecting);

        let dialed = tokio::select! {
            result = shared.transport.connect() => result,
            _ = shutdown.wait_for(|stop| *stop) => break,
        };

        let mut link = match dialed {
            Ok(link) => link,
            Err(err) => {
                warn!(error = %err, "broker dial failed");
                shared.set_state(ConnectionState::Errored);
                if recover_transport(&shared, &mut shutdown).await {
                    continue 'dial;
                }
                break;
            }
        };

        if let Err(err) = link
            .send(Frame::connect(&shared.host, shared.config.heartbeat_ms))
            .await
        {
            warn!(error = %err, "broker handshake send failed");
            shared.set_state(ConnectionState::Errored);
            link.close().await;
            if recover_transport(&shared, &mut shutdown).await {
                continue 'dial;
            }
            break;
        }

        // Read loop. Subscriptions are issued only once the broker reports
        // CONNECTED.
        loop {
            let incoming = tokio::select! {
                frame = link.next_frame() => frame,
                _ = async { let _ = shutdown.wait_for(|stop| *stop).await; } => {
                    let _ = link.send(Frame::disconnect()).await;
                    link.close().await;
                    break 'dial;
                }
            };

            match incoming {
                Some(Ok(frame)) => match frame.command {
                    Command::Connected => {
                        info!(host = %shared.host, "broker connection established");
                        shared.set_state(ConnectionState::Connected);
                        shared.policy.lock().await.reset();
                        if let Err(err) = subscribe_all(link.as_mut()).await {
                            warn!(error = %err, "topic subscription failed");
                            shared.set_state(ConnectionState::Errored);
                            link.close().await;
                            if recover_transport(&shared, &mut shutdown).await {
                                continue 'dial;
                            }
                            break 'dial;
                        }
                    }
                    Command::Message => handle_message(&shared, frame).await,
                    Command::Error => {
                        let err = RealtimeError::Protocol {
                            message: frame.header("message").unwrap_or("").to_string(),
                            detail: frame.body.clone(),
                        };
                        error!(error = %err, "broker reported an error");
                        shared.set_state(ConnectionState::Errored);
                        link.close().await;

                        let attempt = shared.policy.lock().await.next_attempt();
                        match attempt {
                            Some(attempt) => {
                                info!(
                                    attempt,
                                    max = shared.config.max_reconnect_attempts,
                                    "scheduling reconnection"
                                );
                                if sleep_unless_shutdown(retry_delay, &mut shutdown).await {
                                    continue 'dial;
                                }
                                break 'dial;
                            }
                            None => {
                                let attempts = shared.config.max_reconnect_attempts;
                                error!(attempts, "reconnection attempts exhausted; giving up");
                                shared.set_state(ConnectionState::Exhausted);
                                let _ = shared
                                    .events_tx
                                    .send(SessionEvent::RetriesExhausted { attempts });
                                return;
                            }
                        }
                    }
                    Command::Receipt => debug!("broker receipt acknowledged"),
                    other => debug!(command = ?other, "ignoring unexpected broker frame"),
                },
                Some(Err(err)) => {
                    warn!(error = %err, "broker link failed");
                    shared.set_state(ConnectionState::Errored);
                    link.close().await;
                    if recover_transport(&shared, &mut shutdown).await {
                        continue 'dial;
                    }
                    break 'dial;
                }
                None => {
                    info!("broker connection closed");
                    shared.set_state(ConnectionState::Disconnected);
                    link.close().await;
                    if recover_transport(&shared, &mut shutdown).await {
                        continue 'dial;
                    }
                    break 'dial;
                }
            }
        }
    }

    if *shutdown.borrow() {
        shared.set_state(ConnectionState::Idle);
    }
}

async fn subscribe_all(link: &mut dyn BrokerLink) -> Result<(), RealtimeError> {
    for (index, topic) in Topic::ALL.iter().enumerate() {
        link.send(Frame::subscribe(&format!("sub-{index}"), topic.destination()))
            .await?;
        info!(destination = topic.destination(), "subscribed to topic");
    }
    Ok(())
}

async fn handle_message(shared: &Shared, frame: Frame) {
    let topic = match frame.header("destination") {
        Some(destination) => match Topic::from_destination(destination) {
            Some(topic) => topic,
            None => {
                debug!(destination, "message on unknown destination; dropping");
                return;
            }
        },
        None => {
            debug!("broker message without destination; dropping");
            return;
        }
    };

    let notification = Notification {
        topic,
        payload: frame.body,
        received_at: Utc::now(),
    };
    shared.log.lock().await.push(notification.clone());
    shared.dispatch(notification);
}

/// Socket-level recovery: wait out the transport's own reconnect delay.
/// Returns whether the driver should dial again. The session's bounded
/// retry budget is never consulted here.
async fn recover_transport(shared: &Shared, shutdown: &mut watch::Receiver<bool>) -> bool {
    match shared.transport.reconnect_delay() {
        Some(delay) => sleep_unless_shutdown(delay, shutdown).await,
        None => false,
    }
}

/// Returns `true` when the delay elapsed, `false` on shutdown.
async fn sleep_unless_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown.wait_for(|stop| *stop) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::time::{sleep, timeout};

    enum Step {
        Yield(Frame),
        Fail(&'static str),
    }

    enum After {
        Pend,
        End,
    }

    struct MockLink {
        steps: VecDeque<Step>,
        after: After,
        sent: Arc<StdMutex<Vec<Frame>>>,
    }

    #[async_trait]
    impl BrokerLink for MockLink {
        async fn send(&mut self, frame: Frame) -> Result<(), RealtimeError> {
            self.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<Result<Frame, RealtimeError>> {
            match self.steps.pop_front() {
                Some(Step::Yield(frame)) => Some(Ok(frame)),
                Some(Step::Fail(msg)) => Some(Err(RealtimeError::Transport(msg.to_string()))),
                None => match self.after {
                    After::Pend => std::future::pending().await,
                    After::End => None,
                },
            }
        }

        async fn close(&mut self) {}
    }

    struct ScriptedTransport {
        links: StdMutex<VecDeque<(Vec<Step>, After)>>,
        sent: Arc<StdMutex<Vec<Frame>>>,
        dials: AtomicU32,
        reconnect_delay: Option<Duration>,
    }

    impl ScriptedTransport {
        fn new(
            links: Vec<(Vec<Step>, After)>,
            reconnect_delay: Option<Duration>,
        ) -> Arc<Self> {
            Arc::new(Self {
                links: StdMutex::new(links.into_iter().collect()),
                sent: Arc::new(StdMutex::new(Vec::new())),
                dials: AtomicU32::new(0),
                reconnect_delay,
            })
        }

        fn dials(&self) -> u32 {
            self.dials.load(Ordering::SeqCst)
        }

        fn sent_commands(&self) -> Vec<Command> {
            self.sent.lock().unwrap().iter().map(|f| f.command).collect()
        }
    }

    #[async_trait]
    impl BrokerTransport for ScriptedTransport {
        async fn connect(&self) -> Result<Box<dyn BrokerLink>, RealtimeError> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            let next = self.links.lock().unwrap().pop_front();
            match next {
                Some((steps, after)) => Ok(Box::new(MockLink {
                    steps: steps.into_iter().collect(),
                    after,
                    sent: Arc::clone(&self.sent),
                })),
                None => Err(RealtimeError::Transport("no scripted link left".to_string())),
            }
        }

        fn reconnect_delay(&self) -> Option<Duration> {
            self.reconnect_delay
        }
    }

    fn fast_config() -> RealtimeConfig {
        RealtimeConfig {
            retry_delay_ms: 5,
            transport_reconnect_delay_ms: None,
            ..RealtimeConfig::default()
        }
    }

    fn connected() -> Frame {
        Frame::new(Command::Connected, vec![("version", "1.2")], "")
    }

    async fn wait_for_state(session: &RealtimeSession, target: ConnectionState) {
        let mut rx = session.watch_state();
        timeout(Duration::from_secs(2), rx.wait_for(|s| *s == target))
            .await
            .expect("timed out waiting for state")
            .expect("state channel closed");
    }

    #[tokio::test]
    async fn connect_twice_opens_one_connection_and_one_subscription_set() {
        let transport = ScriptedTransport::new(
            vec![(vec![Step::Yield(connected())], After::Pend)],
            None,
        );
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        session.connect();
        session.connect();
        wait_for_state(&session, ConnectionState::Connected).await;
        session.connect();
        sleep(Duration::from_millis(30)).await;

        assert_eq!(transport.dials(), 1);
        let commands = transport.sent_commands();
        assert_eq!(
            commands.iter().filter(|c| **c == Command::Connect).count(),
            1
        );
        assert_eq!(
            commands.iter().filter(|c| **c == Command::Subscribe).count(),
            Topic::ALL.len()
        );
    }

    #[tokio::test]
    async fn no_subscription_exists_before_the_broker_confirms() {
        let transport = ScriptedTransport::new(vec![(vec![], After::Pend)], None);
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        session.connect();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(session.state(), ConnectionState::Connecting);
        let commands = transport.sent_commands();
        assert!(commands.contains(&Command::Connect));
        assert!(!commands.contains(&Command::Subscribe));
    }

    #[tokio::test]
    async fn messages_land_in_the_log_and_on_topic_channels() {
        let mut steps = vec![Step::Yield(connected())];
        for n in 1..=5 {
            steps.push(Step::Yield(Frame::message(
                "/topic/shipments",
                format!("m{n}"),
            )));
        }
        let transport = ScriptedTransport::new(vec![(steps, After::Pend)], None);
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        let mut shipments = session.subscribe(Topic::Shipments);
        session.connect();

        for expected in ["m1", "m2", "m3", "m4", "m5"] {
            let notification = timeout(Duration::from_secs(2), shipments.recv())
                .await
                .expect("timed out")
                .expect("channel closed");
            assert_eq!(notification.payload, expected);
            assert_eq!(notification.topic, Topic::Shipments);
            assert_eq!(notification.event_name(), "shipments-updated");
        }

        let tail: Vec<_> = session
            .recent_messages(Some(3))
            .await
            .into_iter()
            .map(|n| n.payload)
            .collect();
        assert_eq!(tail, vec!["m3", "m4", "m5"]);

        // Default window covers all five.
        assert_eq!(session.recent_messages(None).await.len(), 5);

        session.clear_messages().await;
        assert!(session.recent_messages(None).await.is_empty());
    }

    #[tokio::test]
    async fn protocol_errors_retry_to_the_ceiling_then_go_terminal() {
        let links = (0..7)
            .map(|_| {
                (
                    vec![Step::Yield(Frame::error("broker unavailable", ""))],
                    After::Pend,
                )
            })
            .collect();
        let transport = ScriptedTransport::new(links, None);
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        let mut events = session.events();
        session.connect();

        let attempts = loop {
            let event = timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for exhaustion")
                .expect("event channel closed");
            if let SessionEvent::RetriesExhausted { attempts } = event {
                break attempts;
            }
        };

        assert_eq!(attempts, 5);
        assert_eq!(session.state(), ConnectionState::Exhausted);
        // Initial dial plus exactly five reconnections; the sixth error
        // schedules nothing further.
        assert_eq!(transport.dials(), 6);
        sleep(Duration::from_millis(50)).await;
        assert_eq!(transport.dials(), 6);
    }

    #[tokio::test]
    async fn transport_failures_never_touch_the_retry_budget() {
        let transport =
            ScriptedTransport::new(vec![(vec![Step::Fail("socket reset")], After::Pend)], None);
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        session.connect();
        wait_for_state(&session, ConnectionState::Errored).await;
        sleep(Duration::from_millis(30)).await;

        // Recovery disabled at the transport: the driver stops without
        // consuming a single bounded attempt.
        assert_eq!(transport.dials(), 1);
        assert_eq!(session.reconnect_attempts().await, 0);
        assert_eq!(session.state(), ConnectionState::Errored);
    }

    #[tokio::test]
    async fn clean_close_recovers_on_the_transport_delay() {
        let transport = ScriptedTransport::new(
            vec![
                (vec![], After::End),
                (vec![Step::Yield(connected())], After::Pend),
            ],
            Some(Duration::from_millis(5)),
        );
        let mut config = fast_config();
        config.transport_reconnect_delay_ms = Some(5);
        let session = RealtimeSession::with_transport(config, Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        session.connect();
        wait_for_state(&session, ConnectionState::Connected).await;

        assert_eq!(transport.dials(), 2);
        assert_eq!(session.reconnect_attempts().await, 0);
    }

    #[tokio::test]
    async fn disconnect_returns_to_idle_and_is_repeatable() {
        let transport = ScriptedTransport::new(
            vec![(vec![Step::Yield(connected())], After::Pend)],
            None,
        );
        let session =
            RealtimeSession::with_transport(fast_config(), Arc::clone(&transport) as Arc<dyn BrokerTransport>);

        // Safe before any connect.
        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Idle);

        session.connect();
        wait_for_state(&session, ConnectionState::Connected).await;
        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Idle);

        // The driver sent a protocol-level goodbye on the way out.
        assert!(transport.sent_commands().contains(&Command::Disconnect));

        session.disconnect().await;
        assert_eq!(session.state(), ConnectionState::Idle);
    }
}
