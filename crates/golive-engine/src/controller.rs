//! The session controller.
//!
//! Owns the state machine, the transport, the timers, the wake lock and
//! the network monitor, and runs the single loop on which every input is
//! serialized. Timer and monitor threads never touch session state
//! directly; they post [`LoopEvent`]s back onto this loop.

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, info, instrument, warn};

use golive_ipc::{
    EngineCommand, EngineEvent, Notice, NoticeStyle, SessionConfig, StreamStats, VideoOrientation,
};
use golive_transport::{
    ingest_url, SessionEvent, SessionTransport, TransportFactory, INGEST_PORT,
    SESSION_EVENT_CAPACITY,
};

use crate::machine::{Effect, Input, Machine};
use crate::netmon::{NetworkMonitor, PROBE_INTERVAL};
use crate::orientation::OrientationStore;
use crate::timer::OneShotTimer;
use crate::wake::{DisplaySleepInhibitor, WakeLock};

/// Channel capacity for loop events posted back by timer threads.
const LOOP_EVENT_CAPACITY: usize = 16;

/// Events re-dispatched onto the controller loop by helper threads.
///
/// Timer events carry the generation the timer was armed with; the
/// controller re-validates it on receipt, so a fire that raced a cancel
/// over the channel is dropped even though the timer thread already
/// passed its own generation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopEvent {
    ConnectTimerFired { generation: u64 },
    RetryElapsed { generation: u64 },
    RestartElapsed { generation: u64 },
    StopSettled { generation: u64 },
    Network { available: bool },
}

/// The session controller.
pub struct Controller {
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    session_tx: Sender<SessionEvent>,
    session_rx: Receiver<SessionEvent>,
    loop_tx: Sender<LoopEvent>,
    loop_rx: Receiver<LoopEvent>,
    machine: Machine,
    factory: Box<dyn TransportFactory>,
    transport: Box<dyn SessionTransport>,
    connect_timer: OneShotTimer,
    pending: OneShotTimer,
    wake_lock: WakeLock,
    netmon: Option<NetworkMonitor>,
    monitor_network: bool,
    orientation_store: OrientationStore,
    video_orientation: VideoOrientation,
    config: Option<SessionConfig>,
}

impl Controller {
    /// Create a controller wired to the given command/event channels.
    pub fn new(
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        factory: Box<dyn TransportFactory>,
        inhibitor: Box<dyn DisplaySleepInhibitor>,
        orientation_store: OrientationStore,
    ) -> Self {
        let (session_tx, session_rx) = bounded(SESSION_EVENT_CAPACITY);
        let (loop_tx, loop_rx) = bounded(LOOP_EVENT_CAPACITY);
        let transport = factory.provision(session_tx.clone());

        let video_orientation = orientation_store
            .load()
            .map(|o| o.video_orientation())
            .unwrap_or(VideoOrientation::LandscapeRight);

        Self {
            command_rx,
            event_tx,
            session_tx,
            session_rx,
            loop_tx,
            loop_rx,
            machine: Machine::new(),
            factory,
            transport,
            connect_timer: OneShotTimer::new(),
            pending: OneShotTimer::new(),
            wake_lock: WakeLock::new(inhibitor),
            netmon: None,
            monitor_network: true,
            orientation_store,
            video_orientation,
            config: None,
        }
    }

    /// Run the controller loop until a shutdown command arrives or the
    /// command channel disconnects.
    #[instrument(skip(self))]
    pub fn run(&mut self) {
        info!("Controller started");
        self.emit(EngineEvent::Ready);

        loop {
            crossbeam_channel::select! {
                recv(self.command_rx) -> cmd => match cmd {
                    Ok(cmd) => {
                        if !self.handle_command(cmd) {
                            break;
                        }
                    }
                    Err(_) => {
                        debug!("Command channel disconnected");
                        self.apply(Input::Teardown);
                        break;
                    }
                },
                recv(self.session_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_session_event(event);
                    }
                },
                recv(self.loop_rx) -> event => {
                    if let Ok(event) = event {
                        self.handle_loop_event(event);
                    }
                },
            }
        }

        if let Some(mut netmon) = self.netmon.take() {
            netmon.stop();
        }
        info!("Controller stopped");
    }

    /// Returns false when the controller should exit its loop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Engine command");
        match command {
            EngineCommand::Start { config } => self.handle_start(config),
            EngineCommand::Stop => self.apply(Input::Stop),
            EngineCommand::Cancel => self.apply(Input::Cancel),
            EngineCommand::RetryNow => self.apply(Input::RetryNow),
            EngineCommand::OrientationChanged(orientation) => {
                self.handle_orientation(orientation);
            }
            EngineCommand::GetState => {
                let state = self.machine.state();
                self.emit(EngineEvent::StateChanged {
                    previous: state,
                    current: state,
                    presentation: state.presentation(),
                });
            }
            EngineCommand::Shutdown => {
                self.apply(Input::Teardown);
                self.emit(EngineEvent::Shutdown);
                return false;
            }
        }
        true
    }

    fn handle_start(&mut self, config: SessionConfig) {
        if let Err(err) = config.validate() {
            self.emit(EngineEvent::Notice(Notice::new(
                NoticeStyle::Error,
                "Invalid Configuration",
                &err.to_string(),
            )));
            return;
        }

        let profile = config.preset.profile();
        let (width, height) = profile.dimensions(self.video_orientation);
        info!(
            host = %config.ingest_host,
            preset = config.preset.name(),
            width,
            height,
            bitrate = profile.bitrate,
            "Session start requested"
        );

        if self.monitor_network && self.netmon.is_none() {
            let probe_addr = format!("{}:{}", config.ingest_host, INGEST_PORT);
            let tx = self.loop_tx.clone();
            self.netmon = Some(NetworkMonitor::start(
                probe_addr,
                PROBE_INTERVAL,
                move |available| {
                    let _ = tx.send(LoopEvent::Network { available });
                },
            ));
        }

        self.config = Some(config);
        self.apply(Input::Start {
            transport_connected: self.transport.is_connected(),
        });
    }

    fn handle_orientation(&mut self, orientation: golive_ipc::DeviceOrientation) {
        if !orientation.is_determinate() {
            return;
        }
        if let Err(err) = self.orientation_store.save(orientation) {
            warn!(%err, "Failed to persist orientation");
        }
        // The outgoing frame geometry is locked while a session is wanted;
        // rotation takes effect on the next start.
        if !self.machine.live_desired() {
            self.video_orientation = orientation.video_orientation();
        }
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ConnectSuccess => self.apply(Input::ConnectSuccess),
            SessionEvent::ConnectFailed { reason } => {
                warn!(%reason, "Connection attempt failed");
                self.apply(Input::ConnectFailed);
            }
            SessionEvent::ConnectClosed => self.apply(Input::ConnectClosed),
            SessionEvent::PublishStart => self.apply(Input::PublishStart),
            SessionEvent::UnpublishSuccess => self.apply(Input::UnpublishSuccess),
            SessionEvent::IoError { message } => {
                warn!(%message, "Session I/O error");
                self.apply(Input::IoError);
            }
            SessionEvent::Stats {
                fps,
                bytes_out_per_second,
            } => {
                self.emit(EngineEvent::Stats(StreamStats {
                    fps,
                    bitrate_kbps: (bytes_out_per_second / 125) as u32,
                }));
            }
        }
    }

    fn handle_loop_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::ConnectTimerFired { generation } => {
                if generation == self.connect_timer.generation() {
                    self.apply(Input::TimerFired);
                }
            }
            LoopEvent::RetryElapsed { generation } => {
                if generation == self.pending.generation() {
                    self.apply(Input::RetryElapsed);
                }
            }
            LoopEvent::RestartElapsed { generation } => {
                if generation == self.pending.generation() {
                    self.apply(Input::RestartElapsed);
                }
            }
            LoopEvent::StopSettled { generation } => {
                if generation == self.pending.generation() {
                    self.apply(Input::StopSettled);
                }
            }
            LoopEvent::Network { available } => {
                self.apply(Input::NetworkChanged { available });
            }
        }
    }

    /// Feed one input through the machine and execute the effects.
    fn apply(&mut self, input: Input) {
        let previous = self.machine.state();
        let effects = self.machine.handle(input);
        let current = self.machine.state();

        if previous != current {
            info!(from = previous.name(), to = current.name(), "State changed");
            self.emit(EngineEvent::StateChanged {
                previous,
                current,
                presentation: current.presentation(),
            });
        }

        for effect in effects {
            self.execute(effect);
        }
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::Connect => {
                if let Some(config) = &self.config {
                    let url = ingest_url(&config.ingest_host);
                    self.transport.connect(&url);
                } else {
                    warn!("Connect effect without an active configuration");
                }
            }
            Effect::Publish => {
                if let Some(config) = &self.config {
                    let key = config.stream_key.clone();
                    self.transport.publish(&key);
                } else {
                    warn!("Publish effect without an active configuration");
                }
            }
            Effect::CleanupSession => {
                self.transport.close();
                self.transport = self.factory.provision(self.session_tx.clone());
            }
            Effect::ArmConnectTimer(duration) => {
                let tx = self.loop_tx.clone();
                self.connect_timer.arm(duration, move |generation| {
                    let _ = tx.send(LoopEvent::ConnectTimerFired { generation });
                });
            }
            Effect::CancelConnectTimer => self.connect_timer.cancel(),
            Effect::ScheduleRetry(delay) => {
                let tx = self.loop_tx.clone();
                self.pending.arm(delay, move |generation| {
                    let _ = tx.send(LoopEvent::RetryElapsed { generation });
                });
            }
            Effect::ScheduleRestart(delay) => {
                let tx = self.loop_tx.clone();
                self.pending.arm(delay, move |generation| {
                    let _ = tx.send(LoopEvent::RestartElapsed { generation });
                });
            }
            Effect::ScheduleStopSettle(delay) => {
                let tx = self.loop_tx.clone();
                self.pending.arm(delay, move |generation| {
                    let _ = tx.send(LoopEvent::StopSettled { generation });
                });
            }
            Effect::AcquireWakeLock => {
                if !self.wake_lock.is_held() {
                    self.wake_lock.acquire();
                    self.emit(EngineEvent::Notice(Notice::new(
                        NoticeStyle::Info,
                        "Screen Lock Disabled",
                        "Screen will stay awake while streaming",
                    )));
                }
            }
            Effect::ReleaseWakeLock => {
                if self.wake_lock.is_held() {
                    self.wake_lock.release();
                    self.emit(EngineEvent::Notice(Notice::titled(
                        NoticeStyle::Info,
                        "Screen Lock Restored",
                    )));
                }
            }
            Effect::Notify(notice) => self.emit(EngineEvent::Notice(notice)),
            Effect::ResetUi => self.emit(EngineEvent::Stats(StreamStats::default())),
        }
    }

    fn emit(&self, event: EngineEvent) {
        if self.event_tx.send(event).is_err() {
            warn!("Event channel disconnected");
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.connect_timer.cancel();
        self.pending.cancel();
        if let Some(mut netmon) = self.netmon.take() {
            netmon.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use golive_ipc::{DeviceOrientation, Preset, StreamState};

    use super::*;

    #[derive(Default)]
    struct FakeShared {
        calls: Mutex<Vec<String>>,
        connected: AtomicBool,
        provisioned: AtomicBool,
    }

    struct FakeTransport {
        shared: Arc<FakeShared>,
    }

    impl SessionTransport for FakeTransport {
        fn connect(&mut self, url: &str) {
            self.shared.calls.lock().unwrap().push(format!("connect {url}"));
        }

        fn publish(&mut self, stream_key: &str) {
            self.shared
                .calls
                .lock()
                .unwrap()
                .push(format!("publish {stream_key}"));
        }

        fn close(&mut self) {
            self.shared.calls.lock().unwrap().push("close".to_string());
        }

        fn is_connected(&self) -> bool {
            self.shared.connected.load(Ordering::SeqCst)
        }
    }

    struct FakeFactory {
        shared: Arc<FakeShared>,
    }

    impl TransportFactory for FakeFactory {
        fn provision(&self, _events: Sender<SessionEvent>) -> Box<dyn SessionTransport> {
            self.shared.provisioned.store(true, Ordering::SeqCst);
            self.shared
                .calls
                .lock()
                .unwrap()
                .push("provision".to_string());
            Box::new(FakeTransport {
                shared: Arc::clone(&self.shared),
            })
        }
    }

    struct Harness {
        controller: Controller,
        shared: Arc<FakeShared>,
        event_rx: Receiver<EngineEvent>,
        _command_tx: Sender<EngineCommand>,
    }

    fn harness() -> Harness {
        let shared = Arc::new(FakeShared::default());
        let (command_tx, command_rx) = golive_ipc::command_channel();
        let (event_tx, event_rx) = golive_ipc::event_channel();
        let store = OrientationStore::new(
            std::env::temp_dir().join(format!("golive-ctl-{}.json", std::process::id())),
        );

        let mut controller = Controller::new(
            command_rx,
            event_tx,
            Box::new(FakeFactory {
                shared: Arc::clone(&shared),
            }),
            Box::new(crate::wake::NoopInhibitor::default()),
            store,
        );
        controller.monitor_network = false;

        Harness {
            controller,
            shared,
            event_rx,
            _command_tx: command_tx,
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            stream_key: "sk-test".to_string(),
            preset: Preset::Hd720,
            ingest_host: "live.example.app".to_string(),
        }
    }

    fn calls(shared: &FakeShared) -> Vec<String> {
        shared.calls.lock().unwrap().clone()
    }

    fn drain_states(event_rx: &Receiver<EngineEvent>) -> Vec<StreamState> {
        let mut states = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            if let EngineEvent::StateChanged { current, .. } = event {
                states.push(current);
            }
        }
        states
    }

    #[test]
    fn start_connects_to_the_ingest_url() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });

        assert!(calls(&h.shared).contains(&"connect rtmps://live.example.app:443/live".to_string()));
        assert_eq!(
            drain_states(&h.event_rx),
            vec![StreamState::Connecting]
        );
    }

    #[test]
    fn invalid_config_is_rejected_before_the_machine() {
        let mut h = harness();
        let mut bad = config();
        bad.stream_key = "  ".to_string();
        h.controller.handle_command(EngineCommand::Start { config: bad });

        assert!(!calls(&h.shared).iter().any(|c| c.starts_with("connect")));
        assert!(h.event_rx.try_iter().any(|e| matches!(
            e,
            EngineEvent::Notice(n) if n.style == NoticeStyle::Error
        )));
    }

    #[test]
    fn connect_success_publishes_the_stream_key() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });
        h.controller.handle_session_event(SessionEvent::ConnectSuccess);
        h.controller.handle_session_event(SessionEvent::PublishStart);

        assert!(calls(&h.shared).contains(&"publish sk-test".to_string()));
        assert_eq!(
            drain_states(&h.event_rx),
            vec![
                StreamState::Connecting,
                StreamState::Connected,
                StreamState::Publishing
            ]
        );
    }

    #[test]
    fn cancel_discards_and_reprovisions_the_transport() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });
        h.controller.handle_command(EngineCommand::Cancel);

        let calls = calls(&h.shared);
        let closes = calls.iter().filter(|c| *c == "close").count();
        let provisions = calls.iter().filter(|c| *c == "provision").count();
        assert_eq!(closes, 1);
        assert_eq!(provisions, 2, "initial plus post-cancel");
    }

    #[test]
    fn stale_connect_timer_fire_is_dropped() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });
        let armed = h.controller.connect_timer.generation();

        // Success cancels the timer; a fire for the old generation that
        // was already in flight must not count as a timeout.
        h.controller.handle_session_event(SessionEvent::ConnectSuccess);
        h.controller.handle_loop_event(LoopEvent::ConnectTimerFired { generation: armed });

        assert_eq!(h.controller.machine.state(), StreamState::Connected);
    }

    #[test]
    fn stale_retry_after_cancel_is_dropped() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });
        h.controller
            .handle_session_event(SessionEvent::ConnectFailed {
                reason: "refused".to_string(),
            });
        let scheduled = h.controller.pending.generation();

        h.controller.handle_command(EngineCommand::Cancel);
        let before = calls(&h.shared).len();
        h.controller
            .handle_loop_event(LoopEvent::RetryElapsed { generation: scheduled });

        assert_eq!(h.controller.machine.state(), StreamState::Idle);
        assert_eq!(calls(&h.shared).len(), before, "no further transport calls");
    }

    #[test]
    fn stats_are_converted_to_kbps() {
        let mut h = harness();
        h.controller.handle_session_event(SessionEvent::Stats {
            fps: 0.0,
            bytes_out_per_second: 250_000,
        });

        let stats = h.event_rx.try_iter().find_map(|e| match e {
            EngineEvent::Stats(s) => Some(s),
            _ => None,
        });
        assert_eq!(stats, Some(StreamStats { fps: 0.0, bitrate_kbps: 2000 }));
    }

    #[test]
    fn get_state_reports_without_transitioning() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::GetState);

        let reported = h.event_rx.try_iter().find_map(|e| match e {
            EngineEvent::StateChanged { previous, current, .. } => Some((previous, current)),
            _ => None,
        });
        assert_eq!(reported, Some((StreamState::Idle, StreamState::Idle)));
    }

    #[test]
    fn orientation_is_frozen_while_live_is_desired() {
        let mut h = harness();
        h.controller
            .handle_command(EngineCommand::OrientationChanged(DeviceOrientation::Portrait));
        assert_eq!(h.controller.video_orientation, VideoOrientation::Portrait);

        h.controller.handle_command(EngineCommand::Start { config: config() });
        h.controller.handle_command(EngineCommand::OrientationChanged(
            DeviceOrientation::LandscapeLeft,
        ));
        assert_eq!(h.controller.video_orientation, VideoOrientation::Portrait);
    }

    #[test]
    fn shutdown_tears_down_and_exits() {
        let mut h = harness();
        h.controller.handle_command(EngineCommand::Start { config: config() });
        let keep_running = h.controller.handle_command(EngineCommand::Shutdown);

        assert!(!keep_running);
        assert_eq!(h.controller.machine.state(), StreamState::Idle);
        assert!(h
            .event_rx
            .try_iter()
            .any(|e| matches!(e, EngineEvent::Shutdown)));
    }
}
