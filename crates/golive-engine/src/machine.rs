//! The session state machine.
//!
//! One transition function owns `state`, `live_desired` and the reconnect
//! attempt counter; every input produces a list of effects for the
//! controller to execute. Nothing in here performs I/O or sleeps, which
//! keeps every transition exhaustively testable.

use std::time::Duration;

use tracing::debug;

use golive_ipc::{Notice, NoticeStyle, StreamState};

use crate::backoff;

/// Base connect timeout while the network is available.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Settle delay between a user stop and the return to idle.
pub const STOP_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Delay before restarting when a stale transport had to be torn down.
pub const RESTART_DELAY: Duration = Duration::from_secs(1);

/// Everything that can happen to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Input {
    /// User asked to go live. Carries whether the previous transport is
    /// still holding a connection that must be torn down first.
    Start { transport_connected: bool },

    /// User asked to stop a live stream.
    Stop,

    /// User cancelled a pending connection attempt.
    Cancel,

    /// User asked to retry immediately instead of waiting out the backoff.
    RetryNow,

    /// Transport reports the server accepted the connection.
    ConnectSuccess,

    /// Transport reports the connection attempt failed.
    ConnectFailed,

    /// Transport reports an established connection closed.
    ConnectClosed,

    /// Transport reports publishing started.
    PublishStart,

    /// Transport reports publishing ended cleanly.
    UnpublishSuccess,

    /// Transport reports a non-fatal I/O error.
    IoError,

    /// The connection timer expired.
    TimerFired,

    /// A scheduled reconnect delay elapsed.
    RetryElapsed,

    /// The post-cleanup restart delay elapsed.
    RestartElapsed,

    /// The post-stop settle delay elapsed.
    StopSettled,

    /// The network monitor reported a transition.
    NetworkChanged { available: bool },

    /// The owner is going away; release everything.
    Teardown,
}

/// Commands the controller executes on behalf of the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Issue a transport connect.
    Connect,

    /// Issue a transport publish.
    Publish,

    /// Close, discard and re-provision the transport.
    CleanupSession,

    /// Arm the connection timer for the given duration.
    ArmConnectTimer(Duration),

    /// Cancel the connection timer.
    CancelConnectTimer,

    /// Schedule a reconnect after the given backoff delay.
    ScheduleRetry(Duration),

    /// Schedule a restart after tearing down a stale transport.
    ScheduleRestart(Duration),

    /// Schedule the stop settle step.
    ScheduleStopSettle(Duration),

    /// Keep the screen awake.
    AcquireWakeLock,

    /// Restore the screen sleep setting.
    ReleaseWakeLock,

    /// Emit a user-facing notice.
    Notify(Notice),

    /// Reset stats and widgets for the next session.
    ResetUi,
}

/// The session state machine.
#[derive(Debug)]
pub struct Machine {
    state: StreamState,
    live_desired: bool,
    attempt: u32,
    network_available: bool,
}

impl Machine {
    /// A fresh machine: idle, no intent, network assumed available.
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            live_desired: false,
            attempt: 0,
            network_available: true,
        }
    }

    /// Current authoritative state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Whether the user wants a stream running.
    pub fn live_desired(&self) -> bool {
        self.live_desired
    }

    /// Failure-triggered reconnect attempts so far, in `[0, 5]`.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Last-known network availability.
    pub fn network_available(&self) -> bool {
        self.network_available
    }

    /// Apply one input, returning the effects to execute.
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        debug!(state = %self.state.name(), ?input, "Machine input");
        match input {
            Input::Start {
                transport_connected,
            } => self.on_start(transport_connected),
            Input::Stop => self.on_stop(),
            Input::Cancel => self.on_cancel(),
            Input::RetryNow => self.on_retry_now(),
            Input::ConnectSuccess => self.on_connect_success(),
            Input::ConnectFailed => self.on_connect_failed(),
            Input::ConnectClosed => self.on_connect_closed(),
            Input::PublishStart => self.on_publish_start(),
            Input::UnpublishSuccess => self.on_unpublish_success(),
            Input::IoError => vec![Effect::Notify(Notice::new(
                NoticeStyle::Error,
                "Streaming Error",
                "An error occurred while streaming",
            ))],
            Input::TimerFired => self.on_timer_fired(),
            Input::RetryElapsed => self.on_retry_elapsed(),
            Input::RestartElapsed => self.on_restart_elapsed(),
            Input::StopSettled => self.on_stop_settled(),
            Input::NetworkChanged { available } => self.on_network_changed(available),
            Input::Teardown => self.on_teardown(),
        }
    }

    /// Connect timeout to use right now: doubled while the network is
    /// flagged unavailable, to ride out marginal connectivity.
    fn connect_timeout(&self) -> Duration {
        if self.network_available {
            CONNECT_TIMEOUT
        } else {
            CONNECT_TIMEOUT * 2
        }
    }

    fn on_start(&mut self, transport_connected: bool) -> Vec<Effect> {
        if self.state != StreamState::Idle {
            return Vec::new();
        }

        if !self.network_available {
            return vec![Effect::Notify(Notice::new(
                NoticeStyle::Error,
                "No Network Connection",
                "Please check your internet connection and try again",
            ))];
        }

        if transport_connected {
            // A previous session left the transport connected; start over
            // from a clean slate after a short delay.
            return vec![
                Effect::CleanupSession,
                Effect::ScheduleRestart(RESTART_DELAY),
            ];
        }

        self.begin_connecting()
    }

    fn begin_connecting(&mut self) -> Vec<Effect> {
        self.live_desired = true;
        self.state = StreamState::Connecting;
        vec![
            Effect::AcquireWakeLock,
            Effect::ArmConnectTimer(self.connect_timeout()),
            Effect::Connect,
            Effect::Notify(Notice::new(
                NoticeStyle::Info,
                "Starting Stream",
                "Connecting to server...",
            )),
        ]
    }

    fn on_restart_elapsed(&mut self) -> Vec<Effect> {
        if self.state != StreamState::Idle {
            return Vec::new();
        }

        if !self.network_available {
            return vec![Effect::Notify(Notice::new(
                NoticeStyle::Error,
                "No Network Connection",
                "Please check your internet connection and try again",
            ))];
        }

        self.begin_connecting()
    }

    fn on_connect_success(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            StreamState::Connecting | StreamState::Reconnecting
        ) {
            return Vec::new();
        }

        self.attempt = 0;
        self.state = StreamState::Connected;

        let mut effects = vec![Effect::CancelConnectTimer];
        if self.live_desired {
            effects.push(Effect::Publish);
        }
        effects.push(Effect::Notify(Notice::new(
            NoticeStyle::Success,
            "Connected Successfully",
            "Ready to start streaming",
        )));
        effects
    }

    fn on_publish_start(&mut self) -> Vec<Effect> {
        if self.state != StreamState::Connected {
            return Vec::new();
        }

        self.attempt = 0;
        self.state = StreamState::Publishing;
        vec![
            Effect::AcquireWakeLock,
            Effect::Notify(Notice::new(
                NoticeStyle::Success,
                "Live Streaming Started",
                "Stream is now live!",
            )),
        ]
    }

    fn on_connect_failed(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            StreamState::Connecting | StreamState::Reconnecting
        ) {
            return Vec::new();
        }
        self.failure_path()
    }

    fn on_connect_closed(&mut self) -> Vec<Effect> {
        match self.state {
            StreamState::Publishing | StreamState::Connecting | StreamState::Connected
                if self.live_desired =>
            {
                self.state = StreamState::Reconnecting;
                self.failure_path()
            }
            _ => Vec::new(),
        }
    }

    /// Shared failure handling: timeout-while-available, explicit connect
    /// failure, or mid-stream loss. The spent transport is always
    /// discarded so the next connect starts on a fresh one.
    fn failure_path(&mut self) -> Vec<Effect> {
        let mut effects = vec![Effect::CancelConnectTimer, Effect::CleanupSession];

        if self.live_desired && backoff::should_retry(self.attempt) {
            self.attempt += 1;
            self.state = StreamState::Reconnecting;
            effects.push(Effect::ScheduleRetry(backoff::delay_for_attempt(
                self.attempt,
            )));
        } else {
            self.live_desired = false;
            self.attempt = 0;
            self.state = StreamState::Idle;
            effects.push(Effect::ReleaseWakeLock);
            effects.push(Effect::Notify(Notice::new(
                NoticeStyle::Error,
                "Connection Failed",
                "Unable to establish connection after multiple attempts",
            )));
        }
        effects
    }

    fn on_timer_fired(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            StreamState::Connecting | StreamState::Reconnecting
        ) {
            return Vec::new();
        }

        // Availability is consulted fresh at fire time, not at arm time.
        if !self.network_available {
            self.state = StreamState::WaitingForNetwork;
            return vec![
                Effect::CleanupSession,
                Effect::Notify(Notice::new(
                    NoticeStyle::Warning,
                    "Poor Network Connection",
                    "Waiting for better network connection...",
                )),
            ];
        }

        self.failure_path()
    }

    fn on_retry_elapsed(&mut self) -> Vec<Effect> {
        // A cancelled or stopped session leaves a stale scheduled retry
        // behind; intent is re-checked here before anything happens.
        if self.state != StreamState::Reconnecting || !self.live_desired {
            return Vec::new();
        }

        if self.network_available {
            vec![
                Effect::ArmConnectTimer(self.connect_timeout()),
                Effect::Connect,
            ]
        } else {
            self.state = StreamState::WaitingForNetwork;
            Vec::new()
        }
    }

    fn on_network_changed(&mut self, available: bool) -> Vec<Effect> {
        let was_available = self.network_available;
        self.network_available = available;

        if !was_available && available {
            if self.state == StreamState::WaitingForNetwork && self.live_desired {
                self.state = StreamState::Connecting;
                return vec![
                    Effect::ArmConnectTimer(self.connect_timeout()),
                    Effect::Connect,
                ];
            }
        } else if was_available && !available {
            if matches!(
                self.state,
                StreamState::Connecting | StreamState::Reconnecting
            ) {
                self.state = StreamState::WaitingForNetwork;
                return vec![Effect::CancelConnectTimer, Effect::CleanupSession];
            }
        }
        Vec::new()
    }

    fn on_stop(&mut self) -> Vec<Effect> {
        // A stop while still connecting is a cancel.
        if self.state.is_in_progress() {
            return self.on_cancel();
        }

        if self.state != StreamState::Publishing {
            return Vec::new();
        }

        self.live_desired = false;
        self.state = StreamState::Stopping;
        vec![
            Effect::ReleaseWakeLock,
            Effect::CancelConnectTimer,
            Effect::CleanupSession,
            Effect::ScheduleStopSettle(STOP_SETTLE_DELAY),
            Effect::Notify(Notice::new(
                NoticeStyle::Info,
                "Stream Ended",
                "Ready to start new stream",
            )),
        ]
    }

    fn on_stop_settled(&mut self) -> Vec<Effect> {
        if self.state != StreamState::Stopping {
            return Vec::new();
        }

        self.attempt = 0;
        self.state = StreamState::Idle;
        vec![Effect::ResetUi]
    }

    fn on_cancel(&mut self) -> Vec<Effect> {
        if !self.state.is_in_progress() {
            return Vec::new();
        }

        self.live_desired = false;
        self.attempt = 0;
        self.state = StreamState::Idle;
        vec![
            Effect::CancelConnectTimer,
            Effect::CleanupSession,
            Effect::ReleaseWakeLock,
            Effect::ResetUi,
            Effect::Notify(Notice::new(
                NoticeStyle::Warning,
                "Connection Cancelled",
                "Stream connection attempt has been cancelled",
            )),
        ]
    }

    fn on_retry_now(&mut self) -> Vec<Effect> {
        if !matches!(
            self.state,
            StreamState::Connecting | StreamState::Reconnecting
        ) || !self.network_available
        {
            return Vec::new();
        }

        self.state = StreamState::Connecting;
        vec![
            Effect::CancelConnectTimer,
            Effect::CleanupSession,
            Effect::ArmConnectTimer(self.connect_timeout()),
            Effect::Connect,
            Effect::Notify(Notice::new(
                NoticeStyle::Info,
                "Retrying Connection",
                "Attempting to reconnect to streaming server...",
            )),
        ]
    }

    fn on_unpublish_success(&mut self) -> Vec<Effect> {
        match self.state {
            StreamState::Publishing => {
                self.state = StreamState::Idle;
                vec![
                    Effect::ReleaseWakeLock,
                    Effect::Notify(Notice::new(
                        NoticeStyle::Info,
                        "Stream Ended Successfully",
                        "Ready for next stream",
                    )),
                ]
            }
            _ => Vec::new(),
        }
    }

    fn on_teardown(&mut self) -> Vec<Effect> {
        self.live_desired = false;
        self.attempt = 0;
        self.state = StreamState::Idle;
        vec![
            Effect::CancelConnectTimer,
            Effect::CleanupSession,
            Effect::ReleaseWakeLock,
        ]
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
