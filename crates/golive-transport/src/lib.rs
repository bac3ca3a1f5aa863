//! RTMP session transport.
//!
//! The transport is a disposable per-session resource: the engine
//! provisions a fresh instance through a [`TransportFactory`], issues
//! fire-and-forget `connect`/`publish`/`close` calls against it, and
//! receives outcomes later as [`SessionEvent`]s. It never retries on its
//! own; reconnection policy lives with the caller.

mod error;
mod rtmp;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};

pub use error::TransportError;
pub use rtmp::{RtmpSession, RtmpTransportFactory};

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Channel capacity for session events.
pub const SESSION_EVENT_CAPACITY: usize = 64;

/// Ingest port for the RTMPS endpoint template.
pub const INGEST_PORT: u16 = 443;

/// Build the ingest URL for a host: `rtmps://<host>:443/live`.
pub fn ingest_url(host: &str) -> String {
    format!("rtmps://{host}:{INGEST_PORT}/live")
}

/// Asynchronous status events emitted by a session transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// The server accepted the connection request.
    ConnectSuccess,

    /// The connection attempt failed.
    ConnectFailed {
        /// Human-readable failure reason.
        reason: String,
    },

    /// An established connection was closed by the peer.
    ConnectClosed,

    /// The server accepted the publish request.
    PublishStart,

    /// Publishing ended cleanly.
    UnpublishSuccess,

    /// A non-fatal I/O error occurred on an established session.
    IoError {
        /// Human-readable error description.
        message: String,
    },

    /// Periodic throughput report while the session is up.
    Stats {
        /// Frames per second, zero when no media pipeline is attached.
        fps: f32,

        /// Outgoing bytes per second on the wire.
        bytes_out_per_second: u64,
    },
}

/// A live-session transport: connect, publish, close.
///
/// All calls are fire-and-forget; outcomes arrive on the event channel
/// supplied at provisioning time.
pub trait SessionTransport: Send {
    /// Begin connecting to the given RTMP(S) URL.
    fn connect(&mut self, url: &str);

    /// Request publishing under the given stream key.
    fn publish(&mut self, stream_key: &str);

    /// Tear the session down. Idempotent.
    fn close(&mut self);

    /// Whether a connection is currently established.
    fn is_connected(&self) -> bool;
}

/// Provisions fresh [`SessionTransport`] instances.
///
/// Discard-and-recreate is deliberate: a transport carries per-session
/// protocol state that must not leak into the next session.
pub trait TransportFactory: Send {
    /// Create a new transport wired to the given event sender.
    fn provision(&self, events: Sender<SessionEvent>) -> Box<dyn SessionTransport>;
}
