//! Events sent from the engine to the UI.

use serde::{Deserialize, Serialize};

use crate::state::{StatePresentation, StreamState};
use crate::types::{Notice, StreamStats};

/// Events that the engine can send to the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// Session state has changed.
    StateChanged {
        /// Previous state.
        previous: StreamState,

        /// Current state.
        current: StreamState,

        /// Widget-facing projection of the current state.
        presentation: StatePresentation,
    },

    /// A banner for the user.
    Notice(Notice),

    /// Updated throughput figures.
    Stats(StreamStats),

    /// Engine is ready to accept commands.
    Ready,

    /// Engine has shut down.
    Shutdown,
}
