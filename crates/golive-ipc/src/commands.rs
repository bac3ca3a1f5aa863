//! Commands sent from the UI to the engine.

use serde::{Deserialize, Serialize};

use crate::types::{DeviceOrientation, SessionConfig};

/// Commands that the UI can send to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineCommand {
    /// Start a session with the given configuration.
    Start { config: SessionConfig },

    /// Stop the current session.
    Stop,

    /// Cancel a pending connection or reconnection attempt.
    Cancel,

    /// Retry the connection immediately, skipping the pending backoff.
    RetryNow,

    /// Device orientation changed; updates the outgoing frame dimensions.
    OrientationChanged(DeviceOrientation),

    /// Request the current session state.
    GetState,

    /// Shut down the engine completely.
    Shutdown,
}
