//! Last-known-orientation persistence.

use std::fs;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use golive_ipc::DeviceOrientation;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredOrientation {
    last_device_orientation: Option<DeviceOrientation>,
}

/// Tiny key/value store for the last usable device orientation.
///
/// Indeterminate readings (face up/down, unknown) are never persisted so
/// a session resumed from the background can fall back to something that
/// actually carries a heading.
pub struct OrientationStore {
    path: PathBuf,
}

impl OrientationStore {
    /// Create a store backed by the given JSON file.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Persist an orientation reading. Indeterminate readings are dropped.
    pub fn save(&self, orientation: DeviceOrientation) -> io::Result<()> {
        if !orientation.is_determinate() {
            return Ok(());
        }

        let stored = StoredOrientation {
            last_device_orientation: Some(orientation),
        };
        let json = serde_json::to_string(&stored)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, json)?;
        debug!(?orientation, "Persisted device orientation");
        Ok(())
    }

    /// Load the last persisted orientation, if any.
    pub fn load(&self) -> Option<DeviceOrientation> {
        let json = fs::read_to_string(&self.path).ok()?;
        let stored: StoredOrientation = serde_json::from_str(&json).ok()?;
        stored.last_device_orientation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> OrientationStore {
        let path = std::env::temp_dir().join(format!(
            "golive-orientation-{}-{}.json",
            tag,
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        OrientationStore::new(path)
    }

    #[test]
    fn round_trips_a_determinate_orientation() {
        let store = temp_store("roundtrip");
        store.save(DeviceOrientation::LandscapeLeft).unwrap();
        assert_eq!(store.load(), Some(DeviceOrientation::LandscapeLeft));
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn indeterminate_readings_are_not_persisted() {
        let store = temp_store("indeterminate");
        store.save(DeviceOrientation::Portrait).unwrap();
        store.save(DeviceOrientation::Unknown).unwrap();
        assert_eq!(store.load(), Some(DeviceOrientation::Portrait));
        let _ = fs::remove_file(&store.path);
    }

    #[test]
    fn missing_file_loads_nothing() {
        let store = temp_store("missing");
        assert_eq!(store.load(), None);
    }
}
