//! Stream lifecycle engine.
//!
//! This crate owns the session state machine and everything around it:
//! reconnect backoff, the connection timer, network monitoring, the
//! screen wake lock and orientation persistence. The transport is a
//! pluggable resource provisioned per session.

pub mod backoff;
mod controller;
pub mod machine;
mod netmon;
mod orientation;
mod timer;
mod wake;

pub use controller::Controller;
pub use machine::{Effect, Input, Machine};
pub use netmon::NetworkMonitor;
pub use orientation::OrientationStore;
pub use timer::OneShotTimer;
pub use wake::{DisplaySleepInhibitor, NoopInhibitor, WakeLock};

use crossbeam_channel::{Receiver, Sender};
use golive_ipc::{EngineCommand, EngineEvent};
use golive_transport::TransportFactory;

/// Create a controller instance with IPC channels and platform hooks.
pub fn create_controller(
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    factory: Box<dyn TransportFactory>,
    inhibitor: Box<dyn DisplaySleepInhibitor>,
    orientation_store: OrientationStore,
) -> Controller {
    Controller::new(command_rx, event_tx, factory, inhibitor, orientation_store)
}
