//! Session state machine types.

use serde::{Deserialize, Serialize};

/// The current state of a streaming session.
///
/// Exactly one value is authoritative per session; everything a frontend
/// shows is derived from it via [`StreamState::presentation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamState {
    /// No session in progress.
    #[default]
    Idle,

    /// A connect has been issued and its outcome is pending.
    Connecting,

    /// Connected to the server, publish not yet confirmed.
    Connected,

    /// Live and publishing.
    Publishing,

    /// Connection lost or failed; a delayed retry is pending.
    Reconnecting,

    /// User stopped the stream; waiting for cleanup to settle.
    Stopping,

    /// Network is down; the session resumes when it recovers.
    WaitingForNetwork,
}

impl StreamState {
    /// Returns true if no session is in progress.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the session is live.
    pub fn is_publishing(&self) -> bool {
        matches!(self, Self::Publishing)
    }

    /// Returns true while a connect outcome is pending or scheduled.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Reconnecting | Self::WaitingForNetwork
        )
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::Publishing => "Publishing",
            Self::Reconnecting => "Reconnecting",
            Self::Stopping => "Stopping",
            Self::WaitingForNetwork => "WaitingForNetwork",
        }
    }

    /// Derive the UI projection for this state.
    pub fn presentation(&self) -> StatePresentation {
        StatePresentation {
            button_label: self.button_label().to_string(),
            button_color: self.button_color(),
            interactive: self.interactive(),
            show_progress: self.is_in_progress(),
            show_cancel_option: self.is_in_progress(),
        }
    }

    fn button_label(&self) -> &'static str {
        match self {
            Self::Idle => "Go Live!",
            Self::Connecting => "Connecting...",
            Self::Connected => "Starting Stream...",
            Self::Publishing => "Stop Streaming!",
            Self::Reconnecting => "Reconnecting...",
            Self::Stopping => "Stopping...",
            Self::WaitingForNetwork => "Waiting for Network...",
        }
    }

    fn button_color(&self) -> ButtonColor {
        match self {
            Self::Idle => ButtonColor::Green,
            Self::Connecting | Self::Connected => ButtonColor::Orange,
            Self::Publishing => ButtonColor::Red,
            Self::Reconnecting | Self::WaitingForNetwork => ButtonColor::Blue,
            Self::Stopping => ButtonColor::Gray,
        }
    }

    fn interactive(&self) -> bool {
        // In-progress states stay interactive so the user can cancel.
        !matches!(self, Self::Connected | Self::Stopping)
    }
}

/// Accent color for the primary action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ButtonColor {
    Green,
    Orange,
    Red,
    Blue,
    Gray,
}

/// Pure projection of a [`StreamState`] into widget-facing data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatePresentation {
    /// Label for the primary action button.
    pub button_label: String,

    /// Accent color for the button.
    pub button_color: ButtonColor,

    /// Whether the button accepts input.
    pub interactive: bool,

    /// Whether to show a progress spinner.
    pub show_progress: bool,

    /// Whether a cancel affordance should be offered.
    pub show_cancel_option: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_presentation_is_ready_to_start() {
        let p = StreamState::Idle.presentation();
        assert_eq!(p.button_label, "Go Live!");
        assert_eq!(p.button_color, ButtonColor::Green);
        assert!(p.interactive);
        assert!(!p.show_progress);
        assert!(!p.show_cancel_option);
    }

    #[test]
    fn in_progress_states_offer_cancel() {
        for state in [
            StreamState::Connecting,
            StreamState::Reconnecting,
            StreamState::WaitingForNetwork,
        ] {
            let p = state.presentation();
            assert!(p.show_progress, "{} should show progress", state.name());
            assert!(p.show_cancel_option, "{} should allow cancel", state.name());
            assert!(p.interactive, "{} should stay interactive", state.name());
        }
    }

    #[test]
    fn transitional_states_block_input() {
        assert!(!StreamState::Connected.presentation().interactive);
        assert!(!StreamState::Stopping.presentation().interactive);
    }

    #[test]
    fn publishing_presents_stop() {
        let p = StreamState::Publishing.presentation();
        assert_eq!(p.button_color, ButtonColor::Red);
        assert!(p.interactive);
        assert!(!p.show_progress);
    }
}
