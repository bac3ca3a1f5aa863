//! RTMP client session.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use parking_lot::RwLock;
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ClientSession, ClientSessionConfig, ClientSessionEvent, ClientSessionResult,
    PublishRequestType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::Runtime;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, instrument, trace, warn};
use url::Url;

use crate::error::TransportError;
use crate::{SessionEvent, SessionTransport, TransportFactory, TransportResult};

/// Interval between stats reports while a session is up.
const STATS_INTERVAL: Duration = Duration::from_secs(1);

/// Grace period for the runtime to drain on close.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Commands the owning handle forwards to the connection task.
enum LinkCommand {
    Publish(String),
    Close,
}

/// Connection progress as observed from the owning handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Disconnected,
    Connecting,
    Connected,
    Publishing,
}

/// Factory for [`RtmpSession`] transports.
#[derive(Debug, Default)]
pub struct RtmpTransportFactory;

impl TransportFactory for RtmpTransportFactory {
    fn provision(&self, events: Sender<SessionEvent>) -> Box<dyn SessionTransport> {
        Box::new(RtmpSession::new(events))
    }
}

/// One RTMP session: a tokio runtime driving the socket, commanded over
/// an internal channel, reporting outcomes on the event channel.
pub struct RtmpSession {
    events: Sender<SessionEvent>,
    state: Arc<RwLock<LinkState>>,
    runtime: Option<Runtime>,
    cmd_tx: Option<UnboundedSender<LinkCommand>>,
}

impl RtmpSession {
    /// Create a fresh, disconnected session.
    pub fn new(events: Sender<SessionEvent>) -> Self {
        Self {
            events,
            state: Arc::new(RwLock::new(LinkState::Disconnected)),
            runtime: None,
            cmd_tx: None,
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(e) = self.events.try_send(event) {
            warn!("Failed to emit session event: {}", e);
        }
    }
}

impl SessionTransport for RtmpSession {
    #[instrument(name = "rtmp_connect", skip(self))]
    fn connect(&mut self, url: &str) {
        if self.runtime.is_some() {
            warn!("Connect issued on a session that is already in use");
            return;
        }

        let endpoint = match Endpoint::parse(url) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                self.emit(SessionEvent::ConnectFailed {
                    reason: e.to_string(),
                });
                return;
            }
        };

        let runtime = match Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.emit(SessionEvent::ConnectFailed {
                    reason: format!("Runtime creation failed: {e}"),
                });
                return;
            }
        };

        info!(host = %endpoint.host, port = endpoint.port, app = %endpoint.app, "Connecting");
        *self.state.write() = LinkState::Connecting;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let events = self.events.clone();
        let state = Arc::clone(&self.state);

        runtime.spawn(async move {
            run_link(endpoint, cmd_rx, events, state).await;
        });

        self.runtime = Some(runtime);
        self.cmd_tx = Some(cmd_tx);
    }

    fn publish(&mut self, stream_key: &str) {
        match &self.cmd_tx {
            Some(tx) => {
                if tx.send(LinkCommand::Publish(stream_key.to_string())).is_err() {
                    warn!("Publish issued after the connection task exited");
                }
            }
            None => warn!("Publish issued on a disconnected session"),
        }
    }

    #[instrument(name = "rtmp_close", skip(self))]
    fn close(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(LinkCommand::Close);
        }

        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);
        }

        *self.state.write() = LinkState::Disconnected;
    }

    fn is_connected(&self) -> bool {
        matches!(
            *self.state.read(),
            LinkState::Connected | LinkState::Publishing
        )
    }
}

impl Drop for RtmpSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Parsed ingest endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    host: String,
    port: u16,
    app: String,
}

impl Endpoint {
    fn parse(url: &str) -> TransportResult<Self> {
        if !url.starts_with("rtmp://") && !url.starts_with("rtmps://") {
            return Err(TransportError::InvalidUrl(
                "URL must start with rtmp:// or rtmps://".to_string(),
            ));
        }

        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;

        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl("Missing host".to_string()))?
            .to_string();
        let default_port = if parsed.scheme() == "rtmps" { 443 } else { 1935 };
        let port = parsed.port().unwrap_or(default_port);
        let app = parsed.path().trim_start_matches('/').to_string();

        if app.is_empty() {
            return Err(TransportError::InvalidUrl(
                "Missing application name in URL path".to_string(),
            ));
        }

        Ok(Self { host, port, app })
    }
}

/// Where the session is in its lifecycle, as seen by the connection task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitConnect,
    Ready,
    AwaitPublish,
    Publishing,
}

async fn run_link(
    endpoint: Endpoint,
    cmd_rx: UnboundedReceiver<LinkCommand>,
    events: Sender<SessionEvent>,
    state: Arc<RwLock<LinkState>>,
) {
    match establish(&endpoint).await {
        Ok((stream, session)) => {
            drive(stream, session, cmd_rx, &events, &state).await;
        }
        Err(e) => {
            debug!("Connect failed: {}", e);
            emit(&events, SessionEvent::ConnectFailed {
                reason: e.to_string(),
            });
        }
    }

    *state.write() = LinkState::Disconnected;
}

/// TCP connect, RTMP handshake, session creation, connection request.
///
/// Returns once the connection request is on the wire; acceptance is
/// observed later by [`drive`].
async fn establish(endpoint: &Endpoint) -> TransportResult<(TcpStream, ClientSession)> {
    let addr = format!("{}:{}", endpoint.host, endpoint.port);
    let mut stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| TransportError::Connection(format!("TCP connect failed: {e}")))?;

    debug!("TCP connection established, starting handshake");

    let mut handshake = Handshake::new(PeerType::Client);

    let p0_p1 = handshake
        .generate_outbound_p0_and_p1()
        .map_err(|e| TransportError::Protocol(format!("Handshake generation failed: {e:?}")))?;
    stream.write_all(&p0_p1).await.map_err(TransportError::Io)?;

    let mut buf = vec![0u8; 4096];
    let leftover = loop {
        let n = stream.read(&mut buf).await.map_err(TransportError::Io)?;
        if n == 0 {
            return Err(TransportError::Connection(
                "Connection closed during handshake".to_string(),
            ));
        }

        match handshake.process_bytes(&buf[..n]) {
            Ok(HandshakeProcessResult::InProgress { response_bytes }) => {
                if !response_bytes.is_empty() {
                    stream
                        .write_all(&response_bytes)
                        .await
                        .map_err(TransportError::Io)?;
                }
            }
            Ok(HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            }) => {
                if !response_bytes.is_empty() {
                    stream
                        .write_all(&response_bytes)
                        .await
                        .map_err(TransportError::Io)?;
                }
                break remaining_bytes;
            }
            Err(e) => {
                return Err(TransportError::Protocol(format!("Handshake failed: {e:?}")));
            }
        }
    };

    debug!("Handshake complete, creating RTMP session");

    let config = ClientSessionConfig::new();
    let (mut session, initial_results) = ClientSession::new(config)
        .map_err(|e| TransportError::Protocol(format!("Session creation failed: {e:?}")))?;

    for result in initial_results {
        if let ClientSessionResult::OutboundResponse(packet) = result {
            stream
                .write_all(&packet.bytes)
                .await
                .map_err(TransportError::Io)?;
        }
    }

    if !leftover.is_empty() {
        let results = session
            .handle_input(&leftover)
            .map_err(|e| TransportError::Protocol(format!("Session input error: {e:?}")))?;
        for result in results {
            if let ClientSessionResult::OutboundResponse(packet) = result {
                stream
                    .write_all(&packet.bytes)
                    .await
                    .map_err(TransportError::Io)?;
            }
        }
    }

    debug!(app = %endpoint.app, "Requesting RTMP connection");
    let connect_result = session
        .request_connection(endpoint.app.clone())
        .map_err(|e| TransportError::Protocol(format!("Connection request failed: {e:?}")))?;

    if let ClientSessionResult::OutboundResponse(packet) = connect_result {
        stream
            .write_all(&packet.bytes)
            .await
            .map_err(TransportError::Io)?;
    }

    Ok((stream, session))
}

/// Main session loop: socket input, owner commands, stats ticks.
async fn drive(
    mut stream: TcpStream,
    mut session: ClientSession,
    mut cmd_rx: UnboundedReceiver<LinkCommand>,
    events: &Sender<SessionEvent>,
    state: &Arc<RwLock<LinkState>>,
) {
    let mut phase = Phase::AwaitConnect;
    let mut read_buf = vec![0u8; 4096];
    let mut bytes_out: u64 = 0;
    let mut bytes_at_last_tick: u64 = 0;
    let mut stats_tick = tokio::time::interval(STATS_INTERVAL);

    loop {
        tokio::select! {
            result = stream.read(&mut read_buf) => {
                let n = match result {
                    Ok(0) => {
                        peer_closed(phase, events);
                        return;
                    }
                    Ok(n) => n,
                    Err(e) => {
                        read_failed(phase, events, &e);
                        return;
                    }
                };

                let results = match session.handle_input(&read_buf[..n]) {
                    Ok(results) => results,
                    Err(e) => {
                        emit(events, SessionEvent::IoError {
                            message: format!("Session input error: {e:?}"),
                        });
                        emit(events, SessionEvent::ConnectClosed);
                        return;
                    }
                };

                for result in results {
                    match result {
                        ClientSessionResult::OutboundResponse(packet) => {
                            if stream.write_all(&packet.bytes).await.is_err() {
                                peer_closed(phase, events);
                                return;
                            }
                            bytes_out += packet.bytes.len() as u64;
                        }
                        ClientSessionResult::RaisedEvent(event) => {
                            match event {
                                ClientSessionEvent::ConnectionRequestAccepted => {
                                    info!("Connection accepted by server");
                                    phase = Phase::Ready;
                                    *state.write() = LinkState::Connected;
                                    emit(events, SessionEvent::ConnectSuccess);
                                }
                                ClientSessionEvent::ConnectionRequestRejected { description } => {
                                    emit(events, SessionEvent::ConnectFailed {
                                        reason: format!("Connection rejected: {description}"),
                                    });
                                    return;
                                }
                                ClientSessionEvent::PublishRequestAccepted => {
                                    info!("Publish accepted by server");
                                    phase = Phase::Publishing;
                                    *state.write() = LinkState::Publishing;
                                    emit(events, SessionEvent::PublishStart);
                                }
                                other => {
                                    trace!("Session event: {:?}", other);
                                }
                            }
                        }
                        _ => {}
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(LinkCommand::Publish(stream_key)) => {
                        if phase != Phase::Ready {
                            warn!(?phase, "Publish requested before connection is ready");
                            continue;
                        }

                        debug!("Requesting publish");
                        let result = match session
                            .request_publishing(stream_key, PublishRequestType::Live)
                        {
                            Ok(result) => result,
                            Err(e) => {
                                emit(events, SessionEvent::IoError {
                                    message: format!("Publish request failed: {e:?}"),
                                });
                                continue;
                            }
                        };

                        if let ClientSessionResult::OutboundResponse(packet) = result {
                            if stream.write_all(&packet.bytes).await.is_err() {
                                peer_closed(phase, events);
                                return;
                            }
                            bytes_out += packet.bytes.len() as u64;
                        }
                        phase = Phase::AwaitPublish;
                    }
                    Some(LinkCommand::Close) | None => {
                        debug!("Session closing");
                        if phase == Phase::Publishing {
                            emit(events, SessionEvent::UnpublishSuccess);
                        }
                        return;
                    }
                }
            }

            _ = stats_tick.tick() => {
                if phase == Phase::Publishing || phase == Phase::Ready {
                    let delta = bytes_out - bytes_at_last_tick;
                    bytes_at_last_tick = bytes_out;
                    emit(events, SessionEvent::Stats {
                        fps: 0.0,
                        bytes_out_per_second: delta,
                    });
                }
            }
        }
    }
}

fn peer_closed(phase: Phase, events: &Sender<SessionEvent>) {
    if phase == Phase::AwaitConnect {
        emit(events, SessionEvent::ConnectFailed {
            reason: "Connection closed by server".to_string(),
        });
    } else {
        emit(events, SessionEvent::ConnectClosed);
    }
}

fn read_failed(phase: Phase, events: &Sender<SessionEvent>, error: &std::io::Error) {
    if phase == Phase::AwaitConnect {
        emit(events, SessionEvent::ConnectFailed {
            reason: format!("Read failed: {error}"),
        });
    } else {
        emit(events, SessionEvent::IoError {
            message: format!("Read failed: {error}"),
        });
        emit(events, SessionEvent::ConnectClosed);
    }
}

fn emit(events: &Sender<SessionEvent>, event: SessionEvent) {
    if let Err(e) = events.try_send(event) {
        warn!("Failed to emit session event: {}", e);
    }
}
