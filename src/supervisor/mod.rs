//! Connection supervisor: owns the active channel and its state machine.
//!
//! All state transitions, timer firings, and line ingestion run on one
//! actor task; the public [`ConnectionSupervisor`] handle messages it over
//! an mpsc command queue. Long-running work (port open, enumeration,
//! writes, persistence) is awaited, never blocking: open attempts run as
//! spawned tasks whose outcome re-enters the loop as an event, so a
//! `connect()` received while one is in flight is a true no-op.

mod state;

pub use state::{ConnectionState, ConnectionStatus};

use crate::channel::{ChannelError, ChannelEvent, ChannelFactory, ChannelWriter, OpenChannel};
use crate::config::ConnectionConfig;
use crate::discovery::{best_switch_target, pick_best, DiscoveryError, PortCandidate, PortDiscovery};
use crate::error::BridgeError;
use crate::events::{Event, EventSink, ReconnectPhase};
use crate::persistence::PersistenceGateway;
use crate::pipeline::IngestionPipeline;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Period of the connection health check, independent of the reconnect
/// delay.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Capacity of the handle-to-actor command queue.
const COMMAND_QUEUE_CAPACITY: usize = 32;

enum Command {
    Connect,
    Disconnect,
    ForceReconnect,
    SendData {
        data: Vec<u8>,
        reply: oneshot::Sender<Result<usize, BridgeError>>,
    },
    Status {
        reply: oneshot::Sender<ConnectionStatus>,
    },
    PortInfo {
        reply: oneshot::Sender<Result<Vec<PortCandidate>, BridgeError>>,
    },
    ScanNow,
    SetDynamicSwitching(bool),
    Close,
}

/// Why an open attempt was started.
#[derive(Debug)]
enum OpenPurpose {
    /// Initial connect or scheduled reconnect.
    Connect,
    /// Hot switch away from `old_port`.
    Switch { old_port: String },
}

#[derive(Debug)]
enum OpenFailure {
    Discovery(DiscoveryError),
    Channel(ChannelError),
}

impl std::fmt::Display for OpenFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Discovery(e) => e.fmt(f),
            Self::Channel(e) => e.fmt(f),
        }
    }
}

struct OpenOutcome {
    purpose: OpenPurpose,
    port: Option<String>,
    result: Result<OpenChannel, OpenFailure>,
}

enum Flow {
    Continue,
    Stop,
}

/// Handle to a running supervisor actor. Cheap to clone; all clones talk
/// to the same connection.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    cmd_tx: mpsc::Sender<Command>,
}

impl ConnectionSupervisor {
    /// Spawn the supervisor actor with its collaborators.
    ///
    /// The actor holds no global state: discovery, transport, persistence,
    /// and the event sink are all injected here.
    pub fn spawn(
        config: ConnectionConfig,
        discovery: Arc<dyn PortDiscovery>,
        factory: Arc<dyn ChannelFactory>,
        gateway: Arc<dyn PersistenceGateway>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let config = Arc::new(config);
        let pipeline = IngestionPipeline::new(Arc::clone(&config), gateway, Arc::clone(&sink));
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);

        let dynamic_switching = config.enable_dynamic_port_switching;
        let actor = Actor {
            config,
            discovery,
            factory,
            pipeline,
            sink,
            cmd_rx,
            state: ConnectionState::Disconnected,
            intentional_disconnect: false,
            dynamic_switching,
            reconnect_attempts: 0,
            connect_in_flight: false,
            current_port: None,
            line_rx: None,
            writer: None,
            reader_task: None,
            open_rx: None,
            reconnect_deadline: None,
            scan_interval: None,
            health_interval: None,
            last_data_at: None,
            last_data_instant: None,
        };
        tokio::spawn(actor.run());

        Self { cmd_tx }
    }

    /// Begin connecting. No-op if an attempt is already in flight or a
    /// channel is open.
    pub async fn connect(&self) -> Result<(), BridgeError> {
        self.send(Command::Connect).await
    }

    /// Disconnect intentionally: cancels every timer, closes the channel,
    /// and suppresses auto-reconnect. Idempotent.
    pub async fn disconnect(&self) -> Result<(), BridgeError> {
        self.send(Command::Disconnect).await
    }

    /// Reset the retry budget and reconnect from scratch.
    pub async fn force_reconnect(&self) -> Result<(), BridgeError> {
        self.send(Command::ForceReconnect).await
    }

    /// Write bytes to the active channel.
    ///
    /// Fails with [`BridgeError::NotConnected`] when no channel is open;
    /// no bytes are written in that case.
    pub async fn send_data(&self, data: impl Into<Vec<u8>>) -> Result<usize, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SendData {
            data: data.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| BridgeError::SupervisorGone)?
    }

    /// Read-only snapshot of the connection. No side effects.
    pub async fn status(&self) -> Result<ConnectionStatus, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Status { reply }).await?;
        rx.await.map_err(|_| BridgeError::SupervisorGone)
    }

    /// Scored list of every port the platform currently exposes.
    pub async fn port_info(&self) -> Result<Vec<PortCandidate>, BridgeError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::PortInfo { reply }).await?;
        rx.await.map_err(|_| BridgeError::SupervisorGone)?
    }

    /// One-shot manual trigger of the better-port scan.
    pub async fn scan_for_better_ports(&self) -> Result<(), BridgeError> {
        self.send(Command::ScanNow).await
    }

    /// Enable or disable live port switching.
    pub async fn set_dynamic_port_switching(&self, enabled: bool) -> Result<(), BridgeError> {
        self.send(Command::SetDynamicSwitching(enabled)).await
    }

    /// Final, non-resumable disconnect. The actor exits; every later call
    /// on any handle clone fails with [`BridgeError::SupervisorGone`].
    pub async fn close(&self) -> Result<(), BridgeError> {
        self.send(Command::Close).await
    }

    async fn send(&self, command: Command) -> Result<(), BridgeError> {
        self.cmd_tx
            .send(command)
            .await
            .map_err(|_| BridgeError::SupervisorGone)
    }
}

struct Actor {
    config: Arc<ConnectionConfig>,
    discovery: Arc<dyn PortDiscovery>,
    factory: Arc<dyn ChannelFactory>,
    pipeline: IngestionPipeline,
    sink: Arc<dyn EventSink>,

    cmd_rx: mpsc::Receiver<Command>,

    state: ConnectionState,
    /// Set by disconnect()/close(); checked by every close-handler to
    /// suppress auto-reconnect.
    intentional_disconnect: bool,
    dynamic_switching: bool,
    reconnect_attempts: u32,
    /// Guard serializing open attempts: connects and switches alike.
    connect_in_flight: bool,

    current_port: Option<String>,
    line_rx: Option<mpsc::Receiver<ChannelEvent>>,
    writer: Option<Box<dyn ChannelWriter>>,
    reader_task: Option<JoinHandle<()>>,

    open_rx: Option<oneshot::Receiver<OpenOutcome>>,

    reconnect_deadline: Option<Instant>,
    scan_interval: Option<Interval>,
    health_interval: Option<Interval>,

    last_data_at: Option<DateTime<Utc>>,
    last_data_instant: Option<Instant>,
}

impl Actor {
    async fn run(mut self) {
        loop {
            tokio::select! {
                maybe_cmd = self.cmd_rx.recv() => {
                    match maybe_cmd {
                        Some(cmd) => {
                            if matches!(self.handle_command(cmd).await, Flow::Stop) {
                                break;
                            }
                        }
                        // Every handle dropped: shut down like close().
                        None => break,
                    }
                }

                outcome = outcome_or_pending(&mut self.open_rx) => {
                    self.open_rx = None;
                    match outcome {
                        Ok(outcome) => self.handle_open_outcome(outcome).await,
                        // The open task panicked or was dropped; treat as a
                        // failed attempt.
                        Err(_) => {
                            self.handle_open_outcome(OpenOutcome {
                                purpose: OpenPurpose::Connect,
                                port: None,
                                result: Err(OpenFailure::Channel(ChannelError::open(
                                    "open task aborted",
                                ))),
                            })
                            .await;
                        }
                    }
                }

                event = recv_or_pending(&mut self.line_rx) => {
                    match event {
                        Some(ChannelEvent::Line(line)) => self.handle_line(line).await,
                        Some(ChannelEvent::Closed(error)) => self.handle_channel_closed(error).await,
                        None => self.handle_channel_closed(None).await,
                    }
                }

                _ = sleep_or_pending(self.reconnect_deadline) => {
                    self.handle_reconnect_fire().await;
                }

                _ = tick_or_pending(&mut self.scan_interval) => {
                    self.handle_scan_tick().await;
                }

                _ = tick_or_pending(&mut self.health_interval) => {
                    self.handle_health_tick();
                }
            }
        }

        // Final teardown; nothing observes the state after this.
        self.teardown_channel().await;
    }

    async fn handle_command(&mut self, command: Command) -> Flow {
        match command {
            Command::Connect => {
                self.intentional_disconnect = false;
                if self.connect_in_flight
                    || matches!(
                        self.state,
                        ConnectionState::Connecting
                            | ConnectionState::Connected
                            | ConnectionState::SwitchingPorts
                    )
                {
                    debug!("connect ignored: attempt already in flight or channel open");
                    return Flow::Continue;
                }
                // An explicit connect supersedes a pending retry timer.
                self.reconnect_deadline = None;
                self.spawn_connect();
            }

            Command::Disconnect => {
                self.intentional_disconnect = true;
                self.cancel_timers();
                self.teardown_channel().await;
                self.current_port = None;
                self.set_state(ConnectionState::Disconnected, "disconnected by request");
            }

            Command::ForceReconnect => {
                self.intentional_disconnect = false;
                self.cancel_timers();
                self.reconnect_attempts = 0;
                self.teardown_channel().await;
                self.current_port = None;
                if !self.connect_in_flight {
                    self.spawn_connect();
                }
            }

            Command::SendData { data, reply } => {
                let result = self.write_data(&data).await;
                let _ = reply.send(result);
            }

            Command::Status { reply } => {
                let _ = reply.send(ConnectionStatus {
                    state: self.state,
                    is_connected: self.state == ConnectionState::Connected,
                    current_port: self.current_port.clone(),
                    reconnect_attempts: self.reconnect_attempts,
                    max_reconnect_attempts: self.config.max_reconnect_attempts,
                    last_data_received_at: self.last_data_at,
                });
            }

            Command::PortInfo { reply } => {
                let result = self
                    .discovery
                    .list()
                    .await
                    .map_err(BridgeError::Discovery);
                let _ = reply.send(result);
            }

            Command::ScanNow => {
                self.handle_scan_tick().await;
            }

            Command::SetDynamicSwitching(enabled) => {
                self.dynamic_switching = enabled;
                if !enabled {
                    self.scan_interval = None;
                } else if self.state == ConnectionState::Connected && self.scan_interval.is_none() {
                    self.scan_interval = Some(self.new_interval(self.config.port_scan_interval()));
                }
            }

            Command::Close => {
                self.intentional_disconnect = true;
                self.cancel_timers();
                self.teardown_channel().await;
                self.current_port = None;
                self.set_state(ConnectionState::Disconnected, "closed");
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    async fn write_data(&mut self, data: &[u8]) -> Result<usize, BridgeError> {
        let (Some(writer), Some(port)) = (self.writer.as_mut(), self.current_port.clone()) else {
            return Err(BridgeError::NotConnected);
        };
        match writer.write(data).await {
            Ok(written) => {
                self.sink.emit(Event::DataSent {
                    data: String::from_utf8_lossy(data).into_owned(),
                    port,
                    timestamp: Utc::now(),
                });
                Ok(written)
            }
            Err(e) => {
                self.sink.emit(Event::Error {
                    message: format!("write failed: {e}"),
                });
                Err(BridgeError::Channel(e))
            }
        }
    }

    /// Begin a plain connect attempt (initial or scheduled retry).
    fn spawn_connect(&mut self) {
        self.set_state(ConnectionState::Connecting, "opening serial port");
        self.spawn_open_task(OpenPurpose::Connect, self.config.port_path.clone());
    }

    /// Start an open attempt as a spawned task. The outcome re-enters the
    /// event loop through `open_rx`, keeping the loop free to process
    /// commands while the port opens. Callers set the visible state first.
    fn spawn_open_task(&mut self, purpose: OpenPurpose, target: Option<String>) {
        self.connect_in_flight = true;

        let (tx, rx) = oneshot::channel();
        self.open_rx = Some(rx);

        let discovery = Arc::clone(&self.discovery);
        let factory = Arc::clone(&self.factory);
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            let (port, result) = open_attempt(discovery, factory, config, target).await;
            let _ = tx.send(OpenOutcome {
                purpose,
                port,
                result,
            });
        });
    }

    async fn handle_open_outcome(&mut self, outcome: OpenOutcome) {
        self.connect_in_flight = false;

        // disconnect() or close() arrived while the open was in flight:
        // discard whatever the attempt produced.
        if self.intentional_disconnect {
            if let Ok(channel) = outcome.result {
                channel.close().await;
            }
            return;
        }

        match outcome.result {
            Ok(channel) => {
                let port = channel.path.clone();
                self.install_channel(channel);
                self.reconnect_attempts = 0;
                if let OpenPurpose::Switch { old_port } = outcome.purpose {
                    info!(old = %old_port, new = %port, "switched to better port");
                    self.sink.emit(Event::PortSwitched {
                        old_port,
                        new_port: port.clone(),
                    });
                }
                self.set_state(ConnectionState::Connected, &format!("connected to {port}"));
            }
            Err(failure) => {
                let message = match &outcome.port {
                    Some(port) => format!("{failure} ({port})"),
                    None => failure.to_string(),
                };
                warn!(error = %message, "open attempt failed");
                self.sink.emit(Event::Error {
                    message: message.clone(),
                });
                self.set_state(ConnectionState::Error, &message);
                self.maybe_schedule_reconnect();
            }
        }
    }

    async fn handle_line(&mut self, line: String) {
        self.last_data_at = Some(Utc::now());
        self.last_data_instant = Some(Instant::now());
        let port = self.current_port.clone().unwrap_or_default();
        self.pipeline.handle_line(&line, &port).await;
    }

    async fn handle_channel_closed(&mut self, error: Option<ChannelError>) {
        let port = self.current_port.take().unwrap_or_default();
        self.teardown_channel().await;

        if let Some(e) = error {
            self.sink.emit(Event::Error {
                message: format!("connection error on {port}: {e}"),
            });
        }
        warn!(port = %port, attempts = self.reconnect_attempts, "connection lost");
        self.sink.emit(Event::ConnectionLost {
            port,
            reconnect_attempts: self.reconnect_attempts,
        });
        self.set_state(ConnectionState::Disconnected, "connection lost");

        if !self.intentional_disconnect && self.config.auto_reconnect {
            self.maybe_schedule_reconnect();
        }
    }

    /// Arm the fixed-delay retry timer, or give up once the budget is
    /// spent. The attempt counter is incremented when the timer fires, not
    /// here.
    fn maybe_schedule_reconnect(&mut self) {
        if self.intentional_disconnect || !self.config.auto_reconnect {
            return;
        }
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            warn!(
                attempts = self.reconnect_attempts,
                "reconnect budget exhausted"
            );
            self.sink.emit(Event::ReconnectStatus {
                status: ReconnectPhase::GaveUp,
                attempts: self.reconnect_attempts,
                max_attempts: self.config.max_reconnect_attempts,
            });
            self.set_state(ConnectionState::Error, "reconnect attempts exhausted");
            return;
        }

        self.reconnect_deadline = Some(Instant::now() + self.config.reconnect_delay());
        self.sink.emit(Event::ReconnectStatus {
            status: ReconnectPhase::Scheduled,
            attempts: self.reconnect_attempts,
            max_attempts: self.config.max_reconnect_attempts,
        });
        self.set_state(
            ConnectionState::Reconnecting,
            &format!("retrying in {}ms", self.config.reconnect_delay_ms),
        );
    }

    async fn handle_reconnect_fire(&mut self) {
        self.reconnect_deadline = None;
        if self.connect_in_flight {
            return;
        }
        self.reconnect_attempts += 1;
        info!(
            attempt = self.reconnect_attempts,
            max = self.config.max_reconnect_attempts,
            "reconnect attempt firing"
        );
        self.sink.emit(Event::ReconnectStatus {
            status: ReconnectPhase::Attempting,
            attempts: self.reconnect_attempts,
            max_attempts: self.config.max_reconnect_attempts,
        });
        self.spawn_connect();
    }

    async fn handle_scan_tick(&mut self) {
        // Skip the tick outright while a connect or switch is in flight.
        if self.connect_in_flight || self.state != ConnectionState::Connected {
            return;
        }
        let Some(current) = self.current_port.clone() else {
            return;
        };

        let candidates = match self.discovery.list().await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.sink.emit(Event::Error {
                    message: format!("port scan failed: {e}"),
                });
                return;
            }
        };

        let Some(target) = best_switch_target(&candidates, &current) else {
            return;
        };
        let target_path = target.path.clone();
        info!(current = %current, candidate = %target_path, "better port found");

        self.set_state(
            ConnectionState::SwitchingPorts,
            &format!("switching from {current} to {target_path}"),
        );
        // Fully close the old channel before the new open starts: two
        // channels are never open concurrently.
        self.teardown_channel().await;
        self.current_port = None;

        self.spawn_open_task(OpenPurpose::Switch { old_port: current }, Some(target_path));
    }

    fn handle_health_tick(&mut self) {
        if self.state != ConnectionState::Connected {
            return;
        }
        let Some(last) = self.last_data_instant else {
            return;
        };
        let silent = last.elapsed();
        if silent >= self.config.stale_data_timeout() {
            let port = self.current_port.clone().unwrap_or_default();
            warn!(port = %port, silent_ms = silent.as_millis() as u64, "no data past staleness threshold");
            self.sink.emit(Event::StaleData {
                port,
                silent_for_ms: silent.as_millis() as u64,
            });
        }
    }

    fn install_channel(&mut self, channel: OpenChannel) {
        self.current_port = Some(channel.path);
        self.line_rx = Some(channel.lines);
        self.writer = Some(channel.writer);
        self.reader_task = channel.reader_task;
        // Opening counts as activity for staleness purposes.
        self.last_data_at = Some(Utc::now());
        self.last_data_instant = Some(Instant::now());

        self.health_interval = Some(self.new_interval(HEALTH_CHECK_INTERVAL));
        if self.dynamic_switching {
            self.scan_interval = Some(self.new_interval(self.config.port_scan_interval()));
        }
    }

    fn new_interval(&self, period: Duration) -> Interval {
        // interval_at so the first tick lands one full period out.
        let mut interval = interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        interval
    }

    fn cancel_timers(&mut self) {
        self.reconnect_deadline = None;
        self.scan_interval = None;
        self.health_interval = None;
    }

    /// Drop both halves of the active channel and its timers. The read
    /// task is aborted first so no event can arrive mid-teardown.
    async fn teardown_channel(&mut self) {
        self.line_rx = None;
        if let Some(task) = self.reader_task.take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.scan_interval = None;
        self.health_interval = None;
    }

    /// Transition the state machine. The event is emitted after internal
    /// side effects, so observers never see a half-applied transition.
    fn set_state(&mut self, state: ConnectionState, message: &str) {
        if self.state == state {
            return;
        }
        debug!(from = %self.state, to = %state, message, "state transition");
        self.state = state;
        self.sink.emit(Event::StatusChanged {
            state,
            message: message.to_string(),
            timestamp: Utc::now(),
        });
    }
}

// select! helpers: a disabled source is modeled as a forever-pending
// future, so arms need no preconditions and borrow only their own field.

async fn outcome_or_pending(
    rx: &mut Option<oneshot::Receiver<OpenOutcome>>,
) -> Result<OpenOutcome, oneshot::error::RecvError> {
    match rx {
        Some(rx) => rx.await,
        None => std::future::pending().await,
    }
}

async fn recv_or_pending(rx: &mut Option<mpsc::Receiver<ChannelEvent>>) -> Option<ChannelEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick_or_pending(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Resolve the target port (explicit or discovered) and open it under the
/// configured deadline.
async fn open_attempt(
    discovery: Arc<dyn PortDiscovery>,
    factory: Arc<dyn ChannelFactory>,
    config: Arc<ConnectionConfig>,
    target: Option<String>,
) -> (Option<String>, Result<OpenChannel, OpenFailure>) {
    let port = match target {
        Some(port) => port,
        None => match discovery.list().await {
            Ok(candidates) => match pick_best(&candidates) {
                Ok(best) => best.path.clone(),
                Err(e) => return (None, Err(OpenFailure::Discovery(e))),
            },
            Err(e) => return (None, Err(OpenFailure::Discovery(e))),
        },
    };

    // The deadline is a hard cancellation: on expiry the open future is
    // dropped and any partially opened handle closes with it.
    let result = match tokio::time::timeout(
        config.connection_timeout(),
        factory.open(&port, config.baud_rate, config.line_delimiter.as_bytes()),
    )
    .await
    {
        Ok(Ok(channel)) => Ok(channel),
        Ok(Err(e)) => Err(OpenFailure::Channel(e)),
        Err(_) => Err(OpenFailure::Channel(ChannelError::timeout(
            config.connection_timeout(),
        ))),
    };
    (Some(port), result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::MockChannelFactory;
    use crate::events::RecordingSink;
    use crate::persistence::MemoryGateway;

    struct ScriptedDiscovery(Vec<PortCandidate>);

    #[async_trait::async_trait]
    impl PortDiscovery for ScriptedDiscovery {
        async fn list(&self) -> Result<Vec<PortCandidate>, DiscoveryError> {
            Ok(self.0.clone())
        }
    }

    fn supervisor_with(
        config: ConnectionConfig,
    ) -> (ConnectionSupervisor, MockChannelFactory, RecordingSink) {
        let factory = MockChannelFactory::new();
        let sink = RecordingSink::new();
        let discovery = ScriptedDiscovery(vec![PortCandidate::new(
            "/dev/ttyACM0",
            Some("Arduino".into()),
            Some(0x2341),
            None,
        )]);
        let supervisor = ConnectionSupervisor::spawn(
            config,
            Arc::new(discovery),
            Arc::new(factory.clone()),
            Arc::new(MemoryGateway::new()),
            Arc::new(sink.clone()),
        );
        (supervisor, factory, sink)
    }

    #[tokio::test]
    async fn test_new_supervisor_is_disconnected() {
        let (supervisor, _factory, _sink) = supervisor_with(ConnectionConfig::default());
        let status = supervisor.status().await.unwrap();
        assert_eq!(status.state, ConnectionState::Disconnected);
        assert!(!status.is_connected);
        assert_eq!(status.reconnect_attempts, 0);
        assert!(status.current_port.is_none());
    }

    #[tokio::test]
    async fn test_send_data_without_channel_fails() {
        let (supervisor, factory, _sink) = supervisor_with(ConnectionConfig::default());
        let result = supervisor.send_data(b"PING".to_vec()).await;
        assert!(matches!(result, Err(BridgeError::NotConnected)));
        assert_eq!(factory.open_count(), 0, "no open, no write");
    }

    #[tokio::test]
    async fn test_close_makes_handle_unusable() {
        let (supervisor, _factory, _sink) = supervisor_with(ConnectionConfig::default());
        supervisor.close().await.unwrap();
        // The actor drains its queue before exiting; give it a beat.
        tokio::task::yield_now().await;
        let result = supervisor.status().await;
        assert!(matches!(result, Err(BridgeError::SupervisorGone)));
    }
}
