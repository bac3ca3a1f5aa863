//! Common types used across IPC messages.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed quality tiers a session can be started with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Preset {
    /// 1920x1080 @ 30 fps, 5 Mbps.
    Hd1080,

    /// 1280x720 @ 30 fps, 3 Mbps.
    Hd720,

    /// 960x540 @ 30 fps, 2 Mbps.
    Sd540,

    /// 640x360 @ 30 fps, 1 Mbps.
    Sd360,
}

impl Preset {
    /// Resolve the preset to its encoding profile.
    pub fn profile(self) -> StreamProfile {
        match self {
            Self::Hd1080 => StreamProfile::new(1920, 1080, 30, 5_000_000),
            Self::Hd720 => StreamProfile::new(1280, 720, 30, 3_000_000),
            Self::Sd540 => StreamProfile::new(960, 540, 30, 2_000_000),
            Self::Sd360 => StreamProfile::new(640, 360, 30, 1_000_000),
        }
    }

    /// Display name for a preset picker.
    pub fn name(self) -> &'static str {
        match self {
            Self::Hd1080 => "1080p",
            Self::Hd720 => "720p",
            Self::Sd540 => "540p",
            Self::Sd360 => "360p",
        }
    }

    /// All presets, highest quality first.
    pub fn all() -> [Preset; 4] {
        [Self::Hd1080, Self::Hd720, Self::Sd540, Self::Sd360]
    }
}

/// Immutable per-session encoding parameters.
///
/// Fixed at session start; only the width/height pair swaps when the video
/// orientation flips between landscape and portrait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    /// Frame width in pixels (landscape).
    pub width: u32,

    /// Frame height in pixels (landscape).
    pub height: u32,

    /// Frames per second.
    pub frame_rate: u32,

    /// Video bitrate in bits per second.
    pub bitrate: u32,
}

impl StreamProfile {
    /// Create a profile from raw parameters.
    pub fn new(width: u32, height: u32, frame_rate: u32, bitrate: u32) -> Self {
        Self {
            width,
            height,
            frame_rate,
            bitrate,
        }
    }

    /// Frame dimensions for the given video orientation.
    pub fn dimensions(&self, orientation: VideoOrientation) -> (u32, u32) {
        if orientation.is_portrait() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }
}

/// Raw physical device orientation, as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
    /// Face-up, face-down or undetermined; carries no usable heading.
    Unknown,
}

impl DeviceOrientation {
    /// Map to the capture orientation.
    ///
    /// Landscape is mirrored: a device rotated left presents a
    /// landscape-right picture.
    pub fn video_orientation(self) -> VideoOrientation {
        match self {
            Self::Portrait | Self::Unknown => VideoOrientation::Portrait,
            Self::PortraitUpsideDown => VideoOrientation::PortraitUpsideDown,
            Self::LandscapeLeft => VideoOrientation::LandscapeRight,
            Self::LandscapeRight => VideoOrientation::LandscapeLeft,
        }
    }

    /// Whether this reading is usable as a last-known orientation.
    pub fn is_determinate(self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Orientation of the outgoing video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoOrientation {
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl VideoOrientation {
    /// Returns true for either portrait orientation.
    pub fn is_portrait(self) -> bool {
        matches!(self, Self::Portrait | Self::PortraitUpsideDown)
    }
}

/// Configuration for starting a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Stream key for authentication.
    pub stream_key: String,

    /// Quality tier for this session.
    pub preset: Preset,

    /// Ingest host, e.g. "live.example.app".
    pub ingest_host: String,
}

impl SessionConfig {
    /// Validate the configuration before a session starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream_key.trim().is_empty() {
            return Err(ConfigError::MissingStreamKey);
        }
        if self.ingest_host.trim().is_empty() {
            return Err(ConfigError::MissingIngestHost);
        }
        Ok(())
    }
}

/// Errors in a session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Stream key is empty.
    #[error("Stream key must not be empty")]
    MissingStreamKey,

    /// Ingest host is empty.
    #[error("Ingest host must not be empty")]
    MissingIngestHost,
}

/// Real-time session throughput figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamStats {
    /// Current video frames per second.
    pub fps: f32,

    /// Current outgoing bitrate in kbps.
    pub bitrate_kbps: u32,
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeStyle {
    Success,
    Error,
    Warning,
    Info,
}

/// A fire-and-forget banner for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity, drives color and icon.
    pub style: NoticeStyle,

    /// Short headline.
    pub title: String,

    /// Optional secondary line.
    pub message: Option<String>,
}

impl Notice {
    /// Build a notice with a secondary line.
    pub fn new(style: NoticeStyle, title: &str, message: &str) -> Self {
        Self {
            style,
            title: title.to_string(),
            message: Some(message.to_string()),
        }
    }

    /// Build a title-only notice.
    pub fn titled(style: NoticeStyle, title: &str) -> Self {
        Self {
            style,
            title: title.to_string(),
            message: None,
        }
    }
}
